/// Configuration management
use crate::error::{ChatError, Result};
use crate::models::UserId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ENDPOINT_PATH: &str = "/ChatApp/chat";
const DEFAULT_DATA_DIR: &str = ".chatsync";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat server host (and optional port), e.g. `chat.example.com` or `localhost:8080`
    pub ws_host: Option<String>,

    /// Use `wss://` (true) or plain `ws://` (false)
    pub secure: bool,

    /// Socket endpoint path on the host
    pub endpoint_path: String,

    /// Keepalive interval while connected
    pub keepalive_interval: Duration,

    /// Socket open timeout
    pub connect_timeout: Duration,

    /// How long the CLI waits for a snapshot after issuing a query
    pub request_timeout: Duration,

    /// Local data directory (identity store)
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_host: None,
            secure: true,
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            keepalive_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Config {
    /// Create config from command line flags; positional arguments are returned untouched
    pub fn from_args(args: &[String]) -> Result<(Self, Vec<String>)> {
        let mut config = Config::default();
        let mut rest = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--host" => {
                    let host = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--host requires a host argument".to_string())
                    })?;
                    config.ws_host = Some(host.clone());
                    i += 2;
                }
                "--insecure" => {
                    config.secure = false;
                    i += 1;
                }
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    config.data_dir = PathBuf::from(path);
                    i += 2;
                }
                "--keepalive" => {
                    let secs = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--keepalive requires a number of seconds".to_string())
                    })?;
                    let secs = secs.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                        ChatError::Config("--keepalive must be a positive number".to_string())
                    })?;
                    config.keepalive_interval = Duration::from_secs(secs);
                    i += 2;
                }
                other => {
                    rest.push(other.to_string());
                    i += 1;
                }
            }
        }

        // Env overrides
        if config.ws_host.is_none() {
            config.ws_host = std::env::var("CHATSYNC_WS_URL").ok();
        }
        if let Ok(dir) = std::env::var("CHATSYNC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if std::env::var("CHATSYNC_INSECURE").is_ok() {
            config.secure = false;
        }

        Ok((config, rest))
    }

    /// Socket URL for a user; fails when no host is configured
    pub fn endpoint_url(&self, user_id: UserId) -> Result<String> {
        let host = self
            .ws_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ChatError::Config("chat server host is not configured".to_string()))?;

        // Tolerate hosts given with a scheme or trailing slash
        let host = host
            .trim_start_matches("wss://")
            .trim_start_matches("ws://")
            .trim_end_matches('/');
        let scheme = if self.secure { "wss" } else { "ws" };

        Ok(format!(
            "{}://{}{}?userId={}",
            scheme, host, self.endpoint_path, user_id
        ))
    }
}
