pub mod config;
pub mod indicators;
pub mod params;
pub mod registry;
pub mod runner;
pub mod strategies;

pub use config::{AlertsConfig, BotConfig, ClockGuard, InstrumentConfig, TradingConfig};
pub use params::{ParamSpec, ParamValue, StrategyParams};
pub use registry::{RegistryBuilder, StrategyRegistry};
pub use runner::{Instrument, StrategyRunner};
pub use strategies::{BollingerBreakout, MaRsi};

use std::collections::HashMap;

use common::{CandleSeries, Result, Signal};

/// All strategy implementations must satisfy this trait.
///
/// A strategy is stateless: everything it needs for one decision comes from
/// the annotated series and its validated parameters.
pub trait Strategy: Send + Sync {
    /// Unique identifier used in configuration (e.g. "ma_rsi").
    fn identifier(&self) -> &'static str;

    /// Accepted parameters and their defaults.
    fn schema(&self) -> &'static [ParamSpec];

    /// Cross-parameter checks run after schema validation.
    fn check(&self, _params: &StrategyParams) -> Result<()> {
        Ok(())
    }

    /// Number of candles the strategy needs before it can emit a signal.
    fn minimum_history(&self, params: &StrategyParams) -> usize;

    /// Return a copy of `series` with this strategy's indicator columns.
    fn compute_indicators(&self, series: &CandleSeries, params: &StrategyParams) -> CandleSeries;

    /// Decide on the newest row, looking back at most one row.
    ///
    /// Returns `Signal::Wait` for series shorter than `minimum_history`.
    fn generate_signal(&self, series: &CandleSeries, params: &StrategyParams) -> Signal;

    /// Validate raw config values against `schema` and `check`.
    fn validate_params(&self, raw: &HashMap<String, toml::Value>) -> Result<StrategyParams> {
        let params = StrategyParams::validate(self.identifier(), self.schema(), raw)?;
        self.check(&params)?;
        Ok(params)
    }
}
