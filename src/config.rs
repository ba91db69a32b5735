//! Configuration for vescread
//!
//! Loaded once from a TOML file (or defaults), validated, and then only read.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Address value meaning "discover a device instead of connecting to a fixed one"
pub const SCAN_ADDRESS: &str = "scan";

/// Unit system used for the speed reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    Kmh,
    Mph,
}

impl SpeedUnit {
    /// Factor from m/s to this unit
    pub fn factor(self) -> f64 {
        match self {
            SpeedUnit::Kmh => 3.6,
            SpeedUnit::Mph => 2.237,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::Kmh => "km/h",
            SpeedUnit::Mph => "mph",
        }
    }
}

impl std::str::FromStr for SpeedUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kmh" => Ok(SpeedUnit::Kmh),
            "mph" => Ok(SpeedUnit::Mph),
            other => Err(Error::Config(format!("Unsupported unit '{other}', expected kmh or mph"))),
        }
    }
}

/// What to do when a discovery window finds no device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoDevicePolicy {
    /// Back off and scan again
    Retry,
    /// Stop the session with `Error::NoDeviceFound`
    Exit,
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device id or advertised name to connect to, or `scan`
    pub address: String,
    /// Number of cells in series in the battery pack
    pub cell_series: u32,
    /// Cell voltage reported as 0%
    pub cell_min: f64,
    /// Cell voltage reported as 100%
    pub cell_max: f64,
    /// Unit of the speed reading
    pub unit: SpeedUnit,
    pub session: SessionConfig,
}

/// Timings and policies of the connection loop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period between telemetry requests
    pub request_interval_ms: u64,
    /// Length of a discovery window
    pub scan_window_ms: u64,
    /// Pause after a failure before scanning again
    pub retry_delay_ms: u64,
    pub on_no_device: NoDevicePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: SCAN_ADDRESS.to_string(),
            cell_series: 15,
            cell_min: 2.7,
            cell_max: 4.2,
            unit: SpeedUnit::Kmh,
            session: SessionConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: 200,
            scan_window_ms: 5000,
            retry_delay_ms: 1000,
            on_no_device: NoDevicePolicy::Retry,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use vescread::Config;
    ///
    /// let config = Config::load("vescread.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the decoder or session cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.cell_series == 0 {
            return Err(Error::Config("cell_series must be at least 1".to_string()));
        }
        if !self.cell_min.is_finite() || !self.cell_max.is_finite() {
            return Err(Error::Config("cell_min and cell_max must be finite numbers".to_string()));
        }
        if self.cell_min <= 0.0 {
            return Err(Error::Config(format!("cell_min must be positive, got {}", self.cell_min)));
        }
        if self.cell_min >= self.cell_max {
            return Err(Error::Config(format!(
                "cell_min ({}) must be below cell_max ({})",
                self.cell_min, self.cell_max
            )));
        }
        if self.session.request_interval_ms == 0 {
            return Err(Error::Config("request_interval_ms must be non-zero".to_string()));
        }
        if self.fixed_address().is_none() && self.session.scan_window_ms == 0 {
            return Err(Error::Config("scan_window_ms must be non-zero when scanning".to_string()));
        }
        Ok(())
    }

    /// The configured device, unless the address asks for a scan.
    ///
    /// `none` and an empty string are accepted as scan sentinels too.
    pub fn fixed_address(&self) -> Option<&str> {
        let address = self.address.trim();
        if address.is_empty()
            || address.eq_ignore_ascii_case(SCAN_ADDRESS)
            || address.eq_ignore_ascii_case("none")
        {
            None
        } else {
            Some(address)
        }
    }
}

impl SessionConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.address, "scan");
        assert_eq!(config.fixed_address(), None);
        assert_eq!(config.cell_series, 15);
        assert_eq!(config.cell_min, 2.7);
        assert_eq!(config.cell_max, 4.2);
        assert_eq!(config.unit, SpeedUnit::Kmh);
        assert_eq!(config.session.request_interval(), Duration::from_millis(200));
        assert_eq!(config.session.scan_window(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
address = "D4:8A:FC:11:22:33"
cell_series = 12
cell_min = 3.0
cell_max = 4.15
unit = "mph"

[session]
request_interval_ms = 500
on_no_device = "exit"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.fixed_address(), Some("D4:8A:FC:11:22:33"));
        assert_eq!(config.cell_series, 12);
        assert_eq!(config.unit, SpeedUnit::Mph);
        assert_eq!(config.session.request_interval_ms, 500);
        assert_eq!(config.session.retry_delay_ms, 1000);
        assert_eq!(config.session.on_no_device, NoDevicePolicy::Exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("unit = \"kmh\"").unwrap();
        assert_eq!(config.cell_series, 15);
        assert_eq!(config.session.retry_delay_ms, 1000);
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("unit = \"knots\"");
        assert!(result.is_err());
        assert!("knots".parse::<SpeedUnit>().is_err());
        assert_eq!("MPH".parse::<SpeedUnit>().unwrap(), SpeedUnit::Mph);
    }

    #[test]
    fn test_non_numeric_bounds_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("cell_min = \"low\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_bounds() {
        let mut config = Config::default();
        config.cell_min = 4.2;
        config.cell_max = 2.7;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.cell_max = 4.2;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.cell_min = f64::NAN;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_counts() {
        let mut config = Config::default();
        config.cell_series = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.request_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.scan_window_ms = 0;
        assert!(config.validate().is_err());
        config.address = "vesc".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_sentinels() {
        let mut config = Config::default();
        for sentinel in ["scan", "SCAN", "None", ""] {
            config.address = sentinel.to_string();
            assert_eq!(config.fixed_address(), None);
        }
    }
}
