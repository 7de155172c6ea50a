pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{BinanceEnv, Config, Credentials, ExchangeSettings};
pub use error::{Error, Result};
pub use exchange::{MarketData, ReportSink, MAX_CANDLES_PER_FETCH};
pub use types::*;
