use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAINNET_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";

/// Which Binance deployment the bot talks to. Selects both the credential
/// pair and the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinanceEnv {
    Testnet,
    Mainnet,
}

impl BinanceEnv {
    pub fn base_url(&self) -> &'static str {
        match self {
            BinanceEnv::Testnet => TESTNET_URL,
            BinanceEnv::Mainnet => MAINNET_URL,
        }
    }
}

impl std::fmt::Display for BinanceEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinanceEnv::Testnet => write!(f, "testnet"),
            BinanceEnv::Mainnet => write!(f, "mainnet"),
        }
    }
}

/// API key pair. `Debug` never prints the secret.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Process configuration loaded from environment variables at startup.
#[derive(Clone)]
pub struct Config {
    pub binance_env: BinanceEnv,
    pub credentials: Credentials,
    pub base_url: String,

    /// Bot config file (instruments, exchange settings).
    pub bot_config_path: String,
    /// Files deep-merged over the base config, in order.
    pub bot_config_overlays: Vec<String>,

    // Telegram (optional)
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("binance_env", &self.binance_env)
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .field("bot_config_path", &self.bot_config_path)
            .field("bot_config_overlays", &self.bot_config_overlays)
            .field("telegram_token", &self.telegram_token.as_ref().map(|_| "<redacted>"))
            .field("telegram_allowed_user_ids", &self.telegram_allowed_user_ids)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| {
                Error::Config(format!(
                    "Required environment variable '{key}' is not set. Check your .env file."
                ))
            })
        };

        let binance_env = match optional("BINANCE_ENV")
            .unwrap_or_else(|| "testnet".to_string())
            .to_lowercase()
            .as_str()
        {
            "testnet" => BinanceEnv::Testnet,
            "mainnet" => BinanceEnv::Mainnet,
            other => {
                return Err(Error::Config(format!(
                    "BINANCE_ENV must be 'testnet' or 'mainnet', got: '{other}'"
                )))
            }
        };

        let prefix = match binance_env {
            BinanceEnv::Testnet => "BINANCE_TESTNET",
            BinanceEnv::Mainnet => "BINANCE_MAINNET",
        };
        let credentials = Credentials {
            api_key: required(&format!("{prefix}_API_KEY"))?,
            api_secret: required(&format!("{prefix}_API_SECRET"))?,
        };

        let telegram_allowed_user_ids = match optional("TELEGRAM_ALLOWED_USER_IDS") {
            Some(raw) => raw
                .split(',')
                .map(|s| {
                    s.trim().parse::<i64>().map_err(|_| {
                        Error::Config(format!(
                            "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                            s.trim()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Config {
            binance_env,
            credentials,
            base_url: optional("BINANCE_BASE_URL")
                .unwrap_or_else(|| binance_env.base_url().to_string()),
            bot_config_path: optional("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
            bot_config_overlays: optional("BOT_CONFIG_OVERLAYS")
                .map(|v| {
                    v.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            telegram_token: optional("TELEGRAM_TOKEN"),
            telegram_allowed_user_ids,
        })
    }
}

/// Exchange connectivity settings (the `[exchange]` table of the bot config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeSettings {
    /// Receive window attached to every signed request.
    pub recv_window_ms: u64,
    /// Upper bound when widening the receive window.
    pub recv_window_max_ms: u64,
    /// Widen the receive window on drift rejections before retrying.
    pub auto_expand_recv_window: bool,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// Round trips taken per clock sync; the median estimate is kept.
    pub clock_samples: usize,
    /// Resync the clock before a cycle once the last sync is this old.
    pub resync_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            recv_window_ms: 5_000,
            recv_window_max_ms: 60_000,
            auto_expand_recv_window: false,
            timeout_secs: 10,
            clock_samples: 3,
            resync_secs: 1_800,
        }
    }
}
