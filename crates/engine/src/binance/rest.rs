use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use common::{Credentials, Error, ExchangeSettings, OrderSide, Result};

use super::clock::ClockSync;

/// Exchange error code for a timestamp outside the receive window.
pub const STALE_TIMESTAMP: i64 = -1021;

/// Request parameters. Keys are kept sorted, so the encoded query string is
/// the same no matter in which order parameters were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// URL-encoded `k=v&k=v` string in key order.
    pub fn canonical_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// HMAC-SHA256 of `payload` under `secret`, hex encoded.
pub fn sign(secret: &str, payload: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// REST client for Binance spot. Signs private requests and owns the clock
/// synchronizer used to timestamp them.
pub struct BinanceClient {
    credentials: Credentials,
    base_url: String,
    http: Client,
    clock: Arc<ClockSync>,
    recv_window_ms: AtomicU64,
    recv_window_max_ms: u64,
    auto_expand: bool,
}

impl BinanceClient {
    pub fn new(
        credentials: Credentials,
        base_url: impl Into<String>,
        settings: &ExchangeSettings,
        max_offset_ms: i64,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        let clock = Arc::new(ClockSync::new(
            http.clone(),
            base_url.clone(),
            settings.clock_samples,
            max_offset_ms,
        ));

        Ok(Self {
            credentials,
            base_url,
            http,
            clock,
            recv_window_ms: AtomicU64::new(settings.recv_window_ms),
            recv_window_max_ms: settings.recv_window_max_ms.max(settings.recv_window_ms),
            auto_expand: settings.auto_expand_recv_window,
        })
    }

    pub fn clock(&self) -> Arc<ClockSync> {
        self.clock.clone()
    }

    /// Receive window attached to the next signed request.
    pub fn recv_window_ms(&self) -> u64 {
        self.recv_window_ms.load(Ordering::Relaxed)
    }

    /// Send a signed request.
    ///
    /// A stale-timestamp rejection triggers one clock resync and exactly one
    /// retry with a fresh timestamp. A second stale rejection becomes
    /// `Error::ClockDrift`. Every other failure is returned as-is.
    pub async fn send(&self, method: Method, path: &str, params: Params) -> Result<Value> {
        match self.send_signed(&method, path, &params).await {
            Err(Error::RequestFailed {
                code: STALE_TIMESTAMP,
                message,
            }) => {
                warn!(path, offset_ms = self.clock.offset_ms(), %message, "Stale timestamp, resyncing clock");
                if self.auto_expand && message.contains("recvWindow") {
                    self.widen_recv_window();
                }
                self.clock.sync().await?;

                match self.send_signed(&method, path, &params).await {
                    Err(Error::RequestFailed {
                        code: STALE_TIMESTAMP,
                        message,
                    }) => Err(Error::ClockDrift(message)),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Send an unsigned request through the same HTTP client and error mapping.
    pub async fn public(&self, method: Method, path: &str, params: Params) -> Result<Value> {
        let query = params.canonical_query();
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        let resp = self
            .http
            .request(method, &url)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(e.to_string()))?;
        read_json(resp).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.public(Method::GET, "/api/v3/ping", Params::new()).await?;
        Ok(())
    }

    pub async fn server_time(&self) -> Result<i64> {
        let body = self.public(Method::GET, "/api/v3/time", Params::new()).await?;
        body.get("serverTime")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::RequestFailed {
                code: 0,
                message: format!("serverTime missing from response: {body}"),
            })
    }

    pub async fn account(&self) -> Result<Value> {
        self.send(Method::GET, "/api/v3/account", Params::new()).await
    }

    /// Validate a market order against the connectivity-test endpoint.
    ///
    /// The endpoint never places an order; a successful response only means
    /// the request was accepted, so nothing is returned that could be taken
    /// for a fill.
    pub async fn test_order(&self, symbol: &str, side: OrderSide, quantity: f64) -> Result<()> {
        let params = Params::new()
            .with("symbol", symbol)
            .with("side", side)
            .with("type", "MARKET")
            .with("quantity", quantity);
        self.send(Method::POST, "/api/v3/order/test", params).await?;
        debug!(symbol, side = %side, quantity, "Test order accepted");
        Ok(())
    }

    fn widen_recv_window(&self) {
        let current = self.recv_window_ms();
        let widened = current.saturating_mul(2).min(self.recv_window_max_ms);
        if widened > current {
            self.recv_window_ms.store(widened, Ordering::Relaxed);
            warn!(from_ms = current, to_ms = widened, "Widened receive window");
        }
    }

    async fn send_signed(&self, method: &Method, path: &str, params: &Params) -> Result<Value> {
        let mut stamped = params.clone();
        stamped.insert("timestamp", self.clock.now());
        stamped.insert("recvWindow", self.recv_window_ms());
        let query = stamped.canonical_query();
        let signature = sign(&self.credentials.api_secret, &query);
        let signed = format!("{query}&signature={signature}");

        let request = if *method == Method::GET || *method == Method::DELETE {
            self.http
                .request(method.clone(), format!("{}{path}?{signed}", self.base_url))
        } else {
            self.http
                .request(method.clone(), format!("{}{path}", self.base_url))
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(signed)
        };

        let resp = request
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(e.to_string()))?;
        read_json(resp).await
    }
}

/// Read a response body as JSON, mapping non-2xx statuses to
/// `Error::RequestFailed`. An empty 2xx body reads as `{}`.
pub(crate) async fn read_json(resp: Response) -> Result<Value> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::TransientNetwork(e.to_string()))?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<ApiError>(&body) {
            Ok(api) => Error::RequestFailed {
                code: api.code,
                message: api.msg,
            },
            Err(_) => Error::RequestFailed {
                code: i64::from(status.as_u16()),
                message: body,
            },
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(&body)?)
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}
