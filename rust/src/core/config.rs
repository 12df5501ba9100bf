use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_API_BASE_URL: &str = "https://farmlink-backend.onrender.com/api";
const DEFAULT_SOCKET_URL: &str = "wss://farmlink-backend.onrender.com/chat";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) disable_network: Option<bool>,
    pub(super) api_base_url: Option<String>,
    pub(super) socket_url: Option<String>,
    pub(super) poll_interval_ms: Option<u64>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("farmlink_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

/// Default `farmlink_config.json` payload used when no config file exists.
pub(crate) fn default_app_config_json() -> String {
    serde_json::json!({
        "disable_network": false,
        "api_base_url": DEFAULT_API_BASE_URL,
        "socket_url": DEFAULT_SOCKET_URL,
        "poll_interval_ms": DEFAULT_POLL_INTERVAL_MS,
    })
    .to_string()
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("FARMLINK_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(super) fn api_base_url(&self) -> String {
        self.config
            .api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub(super) fn socket_url(&self) -> String {
        self.config
            .socket_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string())
    }

    pub(super) fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.config
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}
