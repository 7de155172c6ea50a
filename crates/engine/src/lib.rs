pub mod binance;
pub mod lifecycle;
pub mod report;

pub use binance::{BinanceClient, ClockSync};
pub use lifecycle::{Engine, EngineHandle};
pub use report::LogSink;
