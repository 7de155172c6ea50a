use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use common::{Error, Result};

use super::rest::read_json;

/// Tracks the offset between the local clock and the exchange clock.
///
/// `sync` is the only writer of the offset. Request signing reads it through
/// `now`, which takes one snapshot per call.
pub struct ClockSync {
    http: Client,
    base_url: String,
    samples: usize,
    max_offset_ms: i64,
    offset_ms: AtomicI64,
    syncs: AtomicU64,
    last_sync: Mutex<Option<Instant>>,
}

impl ClockSync {
    pub fn new(http: Client, base_url: impl Into<String>, samples: usize, max_offset_ms: i64) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            samples: samples.max(1),
            max_offset_ms,
            offset_ms: AtomicI64::new(0),
            syncs: AtomicU64::new(0),
            last_sync: Mutex::new(None),
        }
    }

    /// Local wall clock in epoch milliseconds.
    pub fn local_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Current offset snapshot (server − local), in milliseconds.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    /// Local time corrected by the last measured offset. Used as the request
    /// timestamp.
    pub fn now(&self) -> i64 {
        Self::local_ms() + self.offset_ms()
    }

    /// Number of completed syncs since startup.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// True when no sync has happened yet or the last one is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let last = self.last_sync.lock().map(|guard| *guard).unwrap_or(None);
        last.map_or(true, |at| at.elapsed() >= max_age)
    }

    /// Measure the offset against the exchange time endpoint and store it.
    ///
    /// Each sample estimates server time at the midpoint of its round trip
    /// (`server_time + rtt / 2`). The median over all samples is kept so a
    /// single slow round trip cannot skew the result.
    pub async fn sync(&self) -> Result<i64> {
        let mut estimates = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            let sent = Instant::now();
            let server_ms = self.server_time().await?;
            let rtt_ms = sent.elapsed().as_millis() as i64;
            let local = Self::local_ms();
            estimates.push(server_ms + rtt_ms / 2 - local);
        }

        let offset = median(&mut estimates);
        self.offset_ms.store(offset, Ordering::Release);
        self.syncs.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_sync.lock() {
            *last = Some(Instant::now());
        }

        if offset.abs() > self.max_offset_ms {
            warn!(offset_ms = offset, max_offset_ms = self.max_offset_ms, "Clock drift exceeds guard (applied)");
        } else {
            debug!(offset_ms = offset, samples = self.samples, "Clock synchronized");
        }
        Ok(offset)
    }

    async fn server_time(&self) -> Result<i64> {
        let url = format!("{}/api/v3/time", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(e.to_string()))?;
        let body: ServerTime = serde_json::from_value(read_json(resp).await?)?;
        Ok(body.server_time)
    }
}

/// Median of the samples; the mean of the two middle values for even counts.
fn median(values: &mut [i64]) -> i64 {
    values.sort_unstable();
    let n = values.len();
    if n == 0 {
        return 0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: i64,
}
