use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use common::{interval_to_ms, Error, ExchangeSettings, Result};

/// Bot settings file (TOML).
///
/// Example `config/bot.toml`:
/// ```toml
/// [trading]
/// interval = "1m"
/// lookback = 300
///
/// [[trading.symbols]]
/// symbol = "BTCUSDT"
/// strategy = "ma_rsi"
///
/// [trading.symbols.params]
/// short_window = 7
/// long_window = 25
///
/// [exchange]
/// recv_window_ms = "${RECV_WINDOW_MS:-5000}"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    pub trading: TradingConfig,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub clock_guard: ClockGuard,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingConfig {
    /// Bar interval, e.g. "1m" or "4h".
    pub interval: String,
    /// Candles requested per fetch. Raised to a strategy's minimum history
    /// when that is larger.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Append a synthetic candle from the latest trade price before evaluating.
    #[serde(default)]
    pub live_snapshot: bool,
    /// Seconds between cycles. Defaults to the bar interval.
    #[serde(default)]
    pub cycle_secs: Option<u64>,
    #[serde(default)]
    pub symbols: Vec<InstrumentConfig>,
}

/// One traded instrument.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Exchange symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Strategy identifier, e.g. "bb_breakout".
    pub strategy: String,
    /// Strategy-specific parameters, validated against the strategy schema.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockGuard {
    /// Offsets larger than this are logged as a warning after each sync.
    pub max_offset_ms: i64,
}

impl Default for ClockGuard {
    fn default() -> Self {
        Self { max_offset_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    /// Also send WAIT reports to alert channels.
    pub notify_wait: bool,
}

fn default_lookback() -> usize {
    300
}

impl BotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_overlays(path, &[] as &[&str])
    }

    /// Load `base`, deep-merge each overlay over it in order, then validate.
    ///
    /// `${VAR}` and `${VAR:-default}` in string values are expanded from the
    /// process environment before merging.
    pub fn load_with_overlays<P: AsRef<Path>>(base: impl AsRef<Path>, overlays: &[P]) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let mut merged = read_table(base.as_ref(), &env)?;
        for overlay in overlays {
            let layer = read_table(overlay.as_ref(), &env)?;
            merged = deep_merge(merged, layer);
        }
        Self::from_value(merged)
    }

    /// Parse a single TOML document, expanding variables through `lookup`.
    pub fn from_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = parse_table(content, "<inline>", &lookup)?;
        Self::from_value(value)
    }

    fn from_value(value: toml::Value) -> Result<Self> {
        let cfg: Self = value
            .try_into()
            .map_err(|e| Error::Config(format!("invalid bot config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks serde cannot express: interval names and window bounds.
    pub fn validate(&self) -> Result<()> {
        if interval_to_ms(&self.trading.interval).is_none() {
            return Err(Error::Config(format!(
                "unsupported interval '{}'",
                self.trading.interval
            )));
        }
        if self.trading.lookback == 0 {
            return Err(Error::Config("trading.lookback must be positive".into()));
        }
        if self.trading.cycle_secs == Some(0) {
            return Err(Error::Config("trading.cycle_secs must be positive".into()));
        }
        let ex = &self.exchange;
        if ex.recv_window_ms == 0 || ex.recv_window_max_ms < ex.recv_window_ms {
            return Err(Error::Config(format!(
                "exchange.recv_window_ms ({}) must be positive and not above recv_window_max_ms ({})",
                ex.recv_window_ms, ex.recv_window_max_ms
            )));
        }
        if ex.clock_samples == 0 {
            return Err(Error::Config("exchange.clock_samples must be positive".into()));
        }
        Ok(())
    }
}

impl TradingConfig {
    /// Bar interval in milliseconds. Only valid after `BotConfig::validate`.
    pub fn interval_ms(&self) -> i64 {
        interval_to_ms(&self.interval).unwrap_or(60_000)
    }

    /// Time between cycles.
    pub fn cycle_interval(&self) -> Duration {
        match self.cycle_secs {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_millis(self.interval_ms().unsigned_abs()),
        }
    }
}

fn read_table<F>(path: &Path, lookup: &F) -> Result<toml::Value>
where
    F: Fn(&str) -> Option<String>,
{
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read '{}': {e}", path.display())))?;
    parse_table(&content, &path.display().to_string(), lookup)
}

fn parse_table<F>(content: &str, origin: &str, lookup: &F) -> Result<toml::Value>
where
    F: Fn(&str) -> Option<String>,
{
    let value: toml::Value = toml::from_str(content)
        .map_err(|e| Error::Config(format!("cannot parse '{origin}': {e}")))?;
    Ok(expand_value(value, lookup))
}

/// Overlay `top` onto `base`. Tables merge key by key; anything else in
/// `top` replaces the base value.
pub fn deep_merge(base: toml::Value, top: toml::Value) -> toml::Value {
    match (base, top) {
        (toml::Value::Table(mut base), toml::Value::Table(top)) => {
            for (key, value) in top {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            toml::Value::Table(base)
        }
        (_, top) => top,
    }
}

fn expand_value<F>(value: toml::Value, lookup: &F) -> toml::Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        toml::Value::String(s) => expand_string(&s, lookup),
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(|v| expand_value(v, lookup)).collect())
        }
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (k, expand_value(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

/// Expand variables in one string. A string that consists of nothing but a
/// single reference is re-typed when the result parses as a TOML scalar, so
/// `"${RECV_WINDOW_MS:-5000}"` becomes an integer.
fn expand_string<F>(s: &str, lookup: &F) -> toml::Value
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_vars(s, lookup);
    if expanded == s || !is_single_reference(s) {
        return toml::Value::String(expanded);
    }
    if let Ok(v) = expanded.parse::<i64>() {
        return toml::Value::Integer(v);
    }
    if let Ok(v) = expanded.parse::<f64>() {
        if v.is_finite() {
            return toml::Value::Float(v);
        }
    }
    match expanded.as_str() {
        "true" => toml::Value::Boolean(true),
        "false" => toml::Value::Boolean(false),
        _ => toml::Value::String(expanded),
    }
}

fn is_single_reference(s: &str) -> bool {
    s.starts_with("${") && s.ends_with('}') && s.matches("${").count() == 1
}

/// Replace `${VAR}` and `${VAR:-default}`. Unset variables without a
/// default expand to an empty string; empty values count as unset when a
/// default is given.
pub fn expand_vars<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            out.push_str(&rest[start..start + 2 + end + 1]);
        } else {
            let value = lookup(name).filter(|v| default.is_none() || !v.is_empty());
            out.push_str(&value.unwrap_or_else(|| default.unwrap_or_default().to_string()));
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const MINIMAL: &str = r#"
        [trading]
        interval = "5m"

        [[trading.symbols]]
        symbol = "BTCUSDT"
        strategy = "ma_rsi"
    "#;

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = BotConfig::from_str_with(MINIMAL, no_env).unwrap();
        assert_eq!(cfg.trading.lookback, 300);
        assert!(!cfg.trading.live_snapshot);
        assert_eq!(cfg.trading.cycle_interval(), Duration::from_secs(300));
        assert_eq!(cfg.exchange.recv_window_ms, 5_000);
        assert_eq!(cfg.clock_guard.max_offset_ms, 1_000);
        assert!(!cfg.alerts.notify_wait);
        assert!(cfg.trading.symbols[0].params.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let doc = format!("{MINIMAL}\n[clock_guard]\nmax_offset = 5\n");
        assert!(matches!(BotConfig::from_str_with(&doc, no_env), Err(Error::Config(_))));
        let top = format!("version = 1\n{MINIMAL}");
        assert!(matches!(BotConfig::from_str_with(&top, no_env), Err(Error::Config(_))));
    }

    #[test]
    fn unsupported_interval_is_rejected() {
        let doc = MINIMAL.replace("5m", "7m");
        let err = BotConfig::from_str_with(&doc, no_env).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("7m")));
    }

    #[test]
    fn env_references_expand_and_retype() {
        let doc = format!(
            "{MINIMAL}\n[exchange]\nrecv_window_ms = \"${{RECV:-7000}}\"\nauto_expand_recv_window = \"${{EXPAND}}\"\n"
        );
        let lookup = |key: &str| (key == "EXPAND").then(|| "true".to_string());
        let cfg = BotConfig::from_str_with(&doc, lookup).unwrap();
        assert_eq!(cfg.exchange.recv_window_ms, 7_000);
        assert!(cfg.exchange.auto_expand_recv_window);
    }

    #[test]
    fn expand_vars_handles_embedded_and_missing_references() {
        let lookup = |key: &str| match key {
            "HOST" => Some("example.org".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        };
        assert_eq!(expand_vars("https://${HOST}/x", &lookup), "https://example.org/x");
        assert_eq!(expand_vars("${MISSING}", &lookup), "");
        assert_eq!(expand_vars("${EMPTY:-fallback}", &lookup), "fallback");
        assert_eq!(expand_vars("${unterminated", &lookup), "${unterminated");
        assert_eq!(expand_vars("${bad name}", &lookup), "${bad name}");
    }

    #[test]
    fn overlay_merges_tables_and_replaces_arrays() {
        let base: toml::Value = toml::from_str(
            "[exchange]\nrecv_window_ms = 5000\ntimeout_secs = 10\n[trading]\ninterval = \"1m\"\nsymbols = []\n",
        )
        .unwrap();
        let top: toml::Value =
            toml::from_str("[exchange]\ntimeout_secs = 3\n[trading]\nsymbols = [{ symbol = \"ETHUSDT\", strategy = \"bb_breakout\" }]\n")
                .unwrap();
        let merged = deep_merge(base, top);
        assert_eq!(merged["exchange"]["recv_window_ms"].as_integer(), Some(5000));
        assert_eq!(merged["exchange"]["timeout_secs"].as_integer(), Some(3));
        assert_eq!(merged["trading"]["interval"].as_str(), Some("1m"));
        assert_eq!(merged["trading"]["symbols"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn load_with_overlays_reads_files_in_order() {
        let dir = std::env::temp_dir().join(format!("signalbot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("bot.toml");
        let overlay = dir.join("mainnet.toml");
        std::fs::write(&base, MINIMAL).unwrap();
        std::fs::write(&overlay, "[trading]\nlookback = 500\nlive_snapshot = true\n").unwrap();

        let cfg = BotConfig::load_with_overlays(&base, &[&overlay]).unwrap();
        assert_eq!(cfg.trading.interval, "5m");
        assert_eq!(cfg.trading.lookback, 500);
        assert!(cfg.trading.live_snapshot);
        assert_eq!(cfg.trading.symbols.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn shipped_config_loads_and_validates() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/bot.toml");
        let cfg = BotConfig::load(path).unwrap();
        let registry = crate::StrategyRegistry::builtin().unwrap();
        for instrument in &cfg.trading.symbols {
            let strategy = registry.get(&instrument.strategy).unwrap();
            strategy.validate_params(&instrument.params).unwrap();
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = BotConfig::load("/nonexistent/bot.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
