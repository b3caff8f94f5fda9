//! Node configuration.
//!
//! Two file formats are accepted. YAML files (`.yaml`/`.yml`) deserialize
//! straight into [`Config`]. Anything else is read as the flat `NAME = value`
//! format handled by [`Settings`], with prefixed keys such as `WEBSRV_PORT`
//! or `SENSOR1_HOST`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::device::DeviceKind;
use crate::http::template::DEFAULT_TEMPLATE;
use crate::server::routes::{RouteMap, default_routes};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown device kind `{0}`")]
    UnknownDevice(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error(transparent)]
    Client(#[from] crate::client::ClientError),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Flat name/value settings.
///
/// `#` starts a comment, blank lines are skipped, names and values are
/// trimmed and a later line overrides an earlier one.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let (name, value) = line.split_once('=').unwrap_or((line, ""));
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            values.insert(name.to_string(), value.trim().to_string());
        }

        Self { values }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_str(&self, name: &str, default: &str) -> String {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Parses the value in `radix`. Missing or unparsable values give `default`.
    pub fn get_int(&self, name: &str, radix: u32, default: i64) -> i64 {
        self.values
            .get(name)
            .and_then(|v| {
                let v = match radix {
                    16 => v.trim_start_matches("0x").trim_start_matches("0X"),
                    _ => v.as_str(),
                };
                i64::from_str_radix(v, radix).ok()
            })
            .unwrap_or(default)
    }

    /// `true`, `yes` and `y` (any case) are true, any other present value is false.
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "y"))
            .unwrap_or(default)
    }

    fn get_num<T: TryFrom<i64>>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        if !self.contains(name) {
            return Ok(default);
        }

        let raw = self.get_int(name, 10, -1);
        T::try_from(raw).map_err(|_| {
            ConfigError::invalid(name, format!("`{}` out of range", self.get_str(name, "")))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds between ticks.
    pub tick_period_ms: u64,
    pub server: ServerConfig,
    pub sensors: Vec<SensorConfig>,
    pub display: Option<DisplayConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            server: ServerConfig::default(),
            sensors: Vec::new(),
            display: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub backlog: u32,
    /// Hard per-connection lifetime in ms. 0 disables expiry.
    pub timeout_ms: u64,
    /// Response template, see [`crate::http::template`].
    pub template: String,
    /// Initial route map.
    pub routes: RouteMap,
    /// Where sensor readings are published.
    pub path: String,
    /// Body published at `path`, with reading placeholders. Nothing is
    /// published when unset.
    pub content: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            backlog: 2,
            timeout_ms: 30_000,
            template: DEFAULT_TEMPLATE.to_string(),
            routes: default_routes(),
            path: "/".to_string(),
            content: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Placeholder prefix, e.g. `S1` for `%S1_TEMP%`.
    pub name: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds between reads. 0 reads every tick.
    #[serde(default = "default_interval")]
    pub interval_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub kind: DeviceKind,
    /// One template per display line.
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default = "default_interval")]
    pub interval_s: u64,
}

fn default_http_port() -> u16 {
    80
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval() -> u64 {
    1
}

impl Config {
    /// Loads and validates a config file, picking the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );

        let config: Self = if is_yaml {
            serde_yaml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Self::from_settings(&Settings::load(path)?)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Builds a config from prefixed flat settings.
    pub fn from_settings(s: &Settings) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        let server = ServerConfig {
            port: s.get_num("WEBSRV_PORT", defaults.port)?,
            backlog: s.get_num("WEBSRV_BACKLOG", defaults.backlog)?,
            timeout_ms: s.get_num("WEBSRV_TIMEOUT", defaults.timeout_ms)?,
            path: s.get_str("WEBSRV_PATH", &defaults.path),
            content: s.contains("WEBSRV_TEMPLATE").then(|| {
                s.get_str("WEBSRV_TEMPLATE", "")
            }),
            ..defaults
        };

        let mut sensors = Vec::new();
        for n in 1.. {
            let prefix = format!("SENSOR{n}");
            let module = format!("{prefix}_MODULE");
            if !s.contains(&module) {
                break;
            }

            sensors.push(SensorConfig {
                name: format!("S{n}"),
                kind: s.get_str(&module, "").parse()?,
                host: s.get_str(&format!("{prefix}_HOST"), ""),
                port: s.get_num(&format!("{prefix}_PORT"), default_http_port())?,
                path: s.get_str(&format!("{prefix}_PATH"), "/"),
                interval_s: s.get_num(&format!("{prefix}_INTERVAL"), default_interval())?,
            });
        }

        let display = if s.contains("DISPLAY_MODULE") {
            Some(DisplayConfig {
                kind: s.get_str("DISPLAY_MODULE", "").parse()?,
                lines: s
                    .get_str("DISPLAY_TEMPLATE", "")
                    .split(':')
                    .map(|l| l.replace("%NBSP%", " ").replace("%COLON%", ":"))
                    .collect(),
                interval_s: s.get_num("DISPLAY_INTERVAL", default_interval())?,
            })
        } else {
            None
        };

        Ok(Self {
            tick_period_ms: s.get_num("TICK_PERIOD", 1000)?,
            server,
            sensors,
            display,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::invalid("tick_period_ms", "must be positive"));
        }

        for sensor in &self.sensors {
            if !sensor.kind.is_sensor() {
                return Err(ConfigError::invalid(
                    &sensor.name,
                    format!("`{}` is not a sensor", sensor.kind),
                ));
            }
            if sensor.kind == DeviceKind::Http && (sensor.host.is_empty() || sensor.port == 0) {
                return Err(ConfigError::invalid(&sensor.name, "http sensor needs host and port"));
            }
        }

        if let Some(display) = &self.display {
            if !display.kind.is_display() {
                return Err(ConfigError::invalid(
                    "display",
                    format!("`{}` is not a display", display.kind),
                ));
            }
        }

        Ok(())
    }
}
