//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-tunable defaults.
///
/// ```toml
/// default_name = "alice"
/// default_port = 8555
/// server_command = "covim-server"
/// settle_delay_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name used when `connect` is given none.
    pub default_name: Option<String>,
    /// Port used when `connect` is given none.
    pub default_port: Option<u16>,
    /// Address used when `connect` is given none.
    pub default_addr: String,
    /// Companion server launched by `start`. Split on whitespace; `--port N`
    /// is appended.
    pub server_command: String,
    /// Fixed wait between launching the companion server and connecting.
    pub settle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_name: None,
            default_port: None,
            default_addr: "localhost".to_string(),
            server_command: "covim-server".to_string(),
            settle_delay_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_addr, "localhost");
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_config() {
        let config = Config::from_toml("default_name = \"alice\"\ndefault_port = 8555\n").unwrap();
        assert_eq!(config.default_name.as_deref(), Some("alice"));
        assert_eq!(config.default_port, Some(8555));
        assert_eq!(config.server_command, "covim-server");
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(matches!(
            Config::from_toml("default_port = 99999"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_command = \"relay --quiet\"").unwrap();
        writeln!(file, "settle_delay_ms = 50").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server_command, "relay --quiet");
        assert_eq!(config.settle_delay(), Duration::from_millis(50));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
