//! Appview configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for the appview process.
#[derive(Debug, Clone)]
pub struct AppviewConfig {
    /// RocksDB data directory
    pub data_dir: PathBuf,
    /// HTTP API listen address
    pub api_addr: SocketAddr,
}

impl Default for AppviewConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppviewConfig {
    /// Load configuration from environment variables, with defaults.
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(
            std::env::var("SKIFF_APPVIEW_DATA_DIR").unwrap_or_else(|_| "./appview-data".to_string()),
        );

        let api_addr = std::env::var("SKIFF_APPVIEW_API_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| "127.0.0.1:8700".parse().expect("static addr"));

        Self { data_dir, api_addr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_and_defaults() {
        std::env::remove_var("SKIFF_APPVIEW_DATA_DIR");
        std::env::remove_var("SKIFF_APPVIEW_API_ADDR");
        let config = AppviewConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("./appview-data"));
        assert_eq!(config.api_addr, "127.0.0.1:8700".parse::<SocketAddr>().unwrap());

        std::env::set_var("SKIFF_APPVIEW_API_ADDR", "0.0.0.0:9000");
        let config = AppviewConfig::from_env();
        assert_eq!(config.api_addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        std::env::remove_var("SKIFF_APPVIEW_API_ADDR");
    }
}
