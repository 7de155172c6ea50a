pub mod clock;
pub mod market;
pub mod rest;

pub use clock::ClockSync;
pub use rest::{sign, BinanceClient, Params, STALE_TIMESTAMP};
