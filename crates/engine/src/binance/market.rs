use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Method;
use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use common::{Candle, CandleSeries, Error, MarketData, Result, MAX_CANDLES_PER_FETCH};

use super::rest::{BinanceClient, Params};

#[async_trait]
impl MarketData for BinanceClient {
    async fn get_ohlcv(&self, symbol: &str, interval: &str, limit: usize) -> Result<CandleSeries> {
        let limit = limit.clamp(1, MAX_CANDLES_PER_FETCH);
        let params = Params::new()
            .with("symbol", symbol)
            .with("interval", interval)
            .with("limit", limit);
        let body = self.public(Method::GET, "/api/v3/klines", params).await?;

        let rows: Vec<Vec<Value>> = serde_json::from_value(body)?;
        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()?;
        debug!(symbol, interval, rows = candles.len(), "Fetched klines");

        let mut series = CandleSeries::new(candles);
        if series.len() > limit {
            let keep = series.candles()[series.len() - limit..].to_vec();
            series = CandleSeries::new(keep);
        }
        Ok(series)
    }

    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public(Method::GET, "/api/v3/ticker/price", Params::new().with("symbol", symbol))
            .await?;
        let ticker: PriceTicker = serde_json::from_value(body)?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| malformed(format!("price '{}': {e}", ticker.price)))
    }
}

/// `[open_time, open, high, low, close, volume, close_time, ...]`
fn parse_kline(row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(malformed(format!("kline row has {} fields, expected at least 6", row.len())));
    }
    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| malformed(format!("kline open time is not an integer: {}", row[0])))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| malformed(format!("kline open time out of range: {open_ms}")))?;

    Ok(Candle {
        open_time,
        open: number(&row[1])?,
        high: number(&row[2])?,
        low: number(&row[3])?,
        close: number(&row[4])?,
        volume: number(&row[5])?,
    })
}

/// Binance sends decimals as strings; accept plain numbers too.
fn number(value: &Value) -> Result<f64> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| malformed(format!("'{s}' is not a number: {e}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| malformed(format!("{n} is not representable as f64"))),
        other => Err(malformed(format!("expected a number, got {other}"))),
    }
}

fn malformed(msg: String) -> Error {
    Error::Json(serde_json::Error::custom(msg))
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}
