// CLI configuration file: `~/.config/uplink/config.toml`.
//
// Only holds defaults the user would otherwise repeat on every command;
// flags and the `UPLINK_SERVER` environment variable take precedence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Path to the config file: `~/.config/uplink/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("uplink").join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CliConfig {
    /// Upload server base URL (e.g. `http://uploads.example.com:8080`).
    pub server_url: Option<String>,
}

impl CliConfig {
    /// Load from the default path. Returns defaults if the file doesn't
    /// exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Server URL resolution: `--server` flag, then `UPLINK_SERVER`, then the
/// config file, then the local development default.
pub fn resolve_server_url(flag: Option<&str>) -> String {
    resolve_server_url_from(flag, std::env::var("UPLINK_SERVER").ok(), &CliConfig::load())
}

fn resolve_server_url_from(
    flag: Option<&str>,
    env: Option<String>,
    config: &CliConfig,
) -> String {
    flag.map(str::to_string)
        .or(env)
        .or_else(|| config.server_url.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_env_and_config() {
        let config = CliConfig { server_url: Some("http://from-config:1".into()) };
        let url = resolve_server_url_from(
            Some("http://from-flag:2"),
            Some("http://from-env:3".into()),
            &config,
        );
        assert_eq!(url, "http://from-flag:2");
    }

    #[test]
    fn env_wins_over_config() {
        let config = CliConfig { server_url: Some("http://from-config:1".into()) };
        let url = resolve_server_url_from(None, Some("http://from-env:3".into()), &config);
        assert_eq!(url, "http://from-env:3");
    }

    #[test]
    fn config_wins_over_default() {
        let config = CliConfig { server_url: Some("http://from-config:1".into()) };
        assert_eq!(resolve_server_url_from(None, None, &config), "http://from-config:1");
    }

    #[test]
    fn default_when_nothing_is_set() {
        assert_eq!(resolve_server_url_from(None, None, &CliConfig::default()), DEFAULT_SERVER_URL);
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"http://persisted:9000\"\n").expect("file writes");

        let config = CliConfig::load_from(&path).expect("config parses");
        assert_eq!(config.server_url.as_deref(), Some("http://persisted:9000"));
    }

    #[test]
    fn empty_config_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").expect("file writes");

        let config = CliConfig::load_from(&path).expect("config parses");
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn missing_config_file_is_an_error_from_load_from() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(CliConfig::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
