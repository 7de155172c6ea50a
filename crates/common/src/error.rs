use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Connectivity failure or timeout. Retried at the next scheduled cycle.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Stale-timestamp rejection that survived one resync-and-retry.
    #[error("Clock drift persisted after resync: {0}")]
    ClockDrift(String),

    /// Any other rejection reported by the exchange or the HTTP layer.
    #[error("Request failed ({code}): {message}")]
    RequestFailed { code: i64, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Alert delivery failed: {0}")]
    Alert(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the failure may clear up on its own by the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork(_) | Error::ClockDrift(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_displays_code_and_message() {
        let e = Error::RequestFailed {
            code: -2010,
            message: "Account has insufficient balance".into(),
        };
        assert_eq!(
            e.to_string(),
            "Request failed (-2010): Account has insufficient balance"
        );
        assert!(!e.is_transient());
    }

    #[test]
    fn network_and_drift_are_transient() {
        assert!(Error::TransientNetwork("timeout".into()).is_transient());
        assert!(Error::ClockDrift("-1021".into()).is_transient());
        assert!(!Error::Config("bad".into()).is_transient());
    }
}
