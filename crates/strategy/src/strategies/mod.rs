pub mod bb_breakout;
pub mod ma_rsi;

pub use bb_breakout::BollingerBreakout;
pub use ma_rsi::MaRsi;
