//! orbital.toml configuration.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8480"
//! data_dir = "/var/lib/orbital"
//! log_format = "json"
//!
//! [autoscale]
//! interval = "30s"
//! down_cooldown = "5m"
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use orbital_autoscale::AutoscaleConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub autoscale: AutoscaleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8480)),
            data_dir: PathBuf::from("/var/lib/orbital"),
            log_level: "info,orbitald=debug,orbital=debug".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: DaemonConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given and present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Replace the evaluation interval, shrinking the cycle and call
    /// timeouts to fit inside it when needed.
    pub fn set_interval(&mut self, interval: Duration) {
        let a = &mut self.autoscale;
        a.interval = interval;
        if a.cycle_timeout >= interval {
            a.cycle_timeout = interval * 2 / 3;
        }
        a.call_timeout = a.call_timeout.min(a.cycle_timeout);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.autoscale.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8480);
        assert_eq!(config.server.log_format, LogFormat::Text);
        assert_eq!(config.autoscale.interval, Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn parse_full_file() {
        let config: DaemonConfig = toml::from_str(
            r#"
[server]
listen = "127.0.0.1:9000"
data_dir = "/tmp/orbital"
log_format = "json"

[autoscale]
interval = "1m"
cycle_timeout = "45s"
up_cooldown = "10s"
workers = 2

[autoscale.retry]
base_backoff = "100ms"
"#,
        )
        .unwrap();

        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.server.data_dir, PathBuf::from("/tmp/orbital"));
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.autoscale.interval, Duration::from_secs(60));
        assert_eq!(config.autoscale.workers, 2);
        assert_eq!(config.autoscale.retry.base_backoff, Duration::from_millis(100));
        config.validate().unwrap();
    }

    #[test]
    fn invalid_autoscale_section_fails_validation() {
        let config: DaemonConfig = toml::from_str(
            r#"
[autoscale]
interval = "10s"
cycle_timeout = "20s"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = DaemonConfig::load(Some(Path::new("/nonexistent/orbital.toml"))).unwrap();
        assert_eq!(config.server.listen.port(), 8480);
    }

    #[test]
    fn shorter_interval_shrinks_timeouts() {
        let mut config = DaemonConfig::default();
        config.set_interval(Duration::from_secs(6));

        assert_eq!(config.autoscale.interval, Duration::from_secs(6));
        assert_eq!(config.autoscale.cycle_timeout, Duration::from_secs(4));
        assert_eq!(config.autoscale.call_timeout, Duration::from_secs(4));
        config.validate().unwrap();
    }

    #[test]
    fn longer_interval_keeps_timeouts() {
        let mut config = DaemonConfig::default();
        config.set_interval(Duration::from_secs(120));
        assert_eq!(config.autoscale.cycle_timeout, Duration::from_secs(20));
        assert_eq!(config.autoscale.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let result: Result<DaemonConfig, _> = toml::from_str(
            r#"
[autoscale]
interval = "soon"
"#,
        );
        assert!(result.is_err());
    }
}
