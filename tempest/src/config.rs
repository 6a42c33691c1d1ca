//! Runtime configuration: defaults, optional TOML file, then command-line overrides.

use crate::relay::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_UDP_PORT: u16 = 50222;
pub const DEFAULT_HTTP_PORT: u16 = 39501;
pub const DEFAULT_HTTP_PATH: &str = "/data";
pub const MIN_INTERVAL_SECS: u64 = 60;
pub const MAX_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Forward every datagram verbatim.
    #[default]
    Json,
    /// One serde document per sensor.
    Rest,
    /// Ecowitt form fields per sensor channel.
    Ecowitt,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Json | OutputFormat::Rest => "application/json",
            OutputFormat::Ecowitt => "application/x-www-form-urlencoded",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "rest" => Ok(OutputFormat::Rest),
            "ecowitt" => Ok(OutputFormat::Ecowitt),
            other => Err(format!(
                "unknown format '{}' (expected json, rest or ecowitt)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Rest => "rest",
            OutputFormat::Ecowitt => "ecowitt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Collector endpoint. `None` prints payloads to stdout instead.
    pub url: Option<String>,
    pub format: OutputFormat,
    pub interval_secs: u64,
    /// UDP port the hub broadcasts on.
    pub port: u16,
    pub buffer_max: usize,
    pub queue_max: usize,
    pub io_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// 1 = debug, 2 = info, 3 = warnings, 4 = errors only.
    pub log_level: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            format: OutputFormat::Json,
            interval_secs: MIN_INTERVAL_SECS,
            port: DEFAULT_UDP_PORT,
            buffer_max: 1024,
            queue_max: 128,
            io_timeout_secs: 1,
            http_timeout_secs: 30,
            log_level: 2,
        }
    }
}

impl RelayConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&text)
            .map_err(|e| RelayError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(RelayError::Config(format!(
                "interval must be between {} and {} seconds, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, self.interval_secs
            )));
        }
        if !(1..=4).contains(&self.log_level) {
            return Err(RelayError::Config(format!(
                "log level must be between 1 and 4, got {}",
                self.log_level
            )));
        }
        if self.buffer_max < 2 {
            return Err(RelayError::Config("buffer_max must be at least 2".into()));
        }
        if self.queue_max == 0 {
            return Err(RelayError::Config("queue_max must be positive".into()));
        }
        if self.io_timeout_secs == 0 {
            return Err(RelayError::Config("io_timeout_secs must be positive".into()));
        }
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RelayError::Config(format!("unsupported collector URL '{}'", url)));
            }
        }
        Ok(())
    }

    /// No collector configured: payloads or datagrams go to stdout.
    pub fn is_trace(&self) -> bool {
        self.url.is_none()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Build the collector URL from its parts, e.g. `http://192.168.1.2:39501/data`.
pub fn collector_url(address: &str, port: u16, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("http://{}:{}{}", address, port, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_trace());
        assert_eq!(config.port, DEFAULT_UDP_PORT);
    }

    #[test]
    fn interval_range_is_enforced() {
        let mut config = RelayConfig::default();
        config.interval_secs = 59;
        assert!(config.validate().is_err());
        config.interval_secs = 3600;
        assert!(config.validate().is_ok());
        config.interval_secs = 3601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_range_is_enforced() {
        let mut config = RelayConfig::default();
        config.log_level = 0;
        assert!(config.validate().is_err());
        config.log_level = 5;
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("ECOWITT".parse::<OutputFormat>(), Ok(OutputFormat::Ecowitt));
        assert_eq!("rest".parse::<OutputFormat>(), Ok(OutputFormat::Rest));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn url_assembly() {
        assert_eq!(
            collector_url("10.0.0.5", DEFAULT_HTTP_PORT, DEFAULT_HTTP_PATH),
            "http://10.0.0.5:39501/data"
        );
        assert_eq!(collector_url("host", 80, "ingest"), "http://host:80/ingest");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "url = \"http://127.0.0.1:39501/data\"\nformat = \"ecowitt\"\ninterval_secs = 300"
        )
        .unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.format, OutputFormat::Ecowitt);
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.queue_max, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let result = RelayConfig::from_file(Path::new("/nonexistent/tempest.toml"));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
