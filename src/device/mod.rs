//! Devices wired to the tick loop.
//!
//! Device backends are a closed set, [`DeviceKind`], resolved when the
//! config is loaded. Register-level I2C drivers live outside this crate; on a
//! host build only the kinds with a backend here can be instantiated.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::config::{ConfigError, SensorConfig};
use crate::transport::tcp::TcpDialer;

pub mod display;
pub mod remote;

pub use display::LogDisplay;
pub use remote::RemoteSensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DeviceKind {
    /// A reading fetched from another node over HTTP.
    Http,
    /// A display that writes its lines to the log.
    Log,
    Bme280,
    Sht30,
    Hd44780,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Http => "http",
            DeviceKind::Log => "log",
            DeviceKind::Bme280 => "bme280",
            DeviceKind::Sht30 => "sht30",
            DeviceKind::Hd44780 => "hd44780",
        }
    }

    pub fn is_sensor(&self) -> bool {
        matches!(self, DeviceKind::Http | DeviceKind::Bme280 | DeviceKind::Sht30)
    }

    pub fn is_display(&self) -> bool {
        matches!(self, DeviceKind::Log | DeviceKind::Hd44780)
    }

    /// Kinds that need an I2C bus driver.
    pub fn needs_i2c(&self) -> bool {
        matches!(self, DeviceKind::Bme280 | DeviceKind::Sht30 | DeviceKind::Hd44780)
    }
}

impl FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(DeviceKind::Http),
            "log" => Ok(DeviceKind::Log),
            "bme280" => Ok(DeviceKind::Bme280),
            "sht30" => Ok(DeviceKind::Sht30),
            "hd44780" => Ok(DeviceKind::Hd44780),
            _ => Err(ConfigError::UnknownDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceKind {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Humidity (%), temperature (°C) and pressure (hPa).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub humidity: f64,
    pub temperature: f64,
    pub pressure: f64,
}

impl Reading {
    pub const ZERO: Reading = Reading {
        humidity: 0.0,
        temperature: 0.0,
        pressure: 0.0,
    };

    /// The line a node serves for one reading: timestamp in seconds
    /// followed by the three values.
    pub fn to_line(&self, ts: u64) -> String {
        format!(
            "{ts:16} {:7.3} {:7.3} {:8.3}\r\n",
            self.humidity, self.temperature, self.pressure
        )
    }

    /// Parses a line produced by [`Reading::to_line`].
    pub fn parse_line(line: &str) -> Option<(u64, Reading)> {
        let mut fields = line.split_whitespace();
        let ts = fields.next()?.parse().ok()?;

        let mut value = || -> Option<f64> {
            let f = fields.next()?;
            // fixed-point only, as emitted by to_line
            let (int, frac) = f.split_once('.')?;
            let int = int.strip_prefix('-').unwrap_or(int);
            let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
            if !digits(int) || !digits(frac) {
                return None;
            }
            f.parse().ok()
        };

        let reading = Reading {
            humidity: value()?,
            temperature: value()?,
            pressure: value()?,
        };

        if fields.next().is_some() {
            return None;
        }

        Some((ts, reading))
    }
}

/// A source of readings.
pub trait Sensor {
    /// Returns a reading, or `None` when none is ready this tick.
    fn get(&mut self) -> Option<Reading>;
}

/// A line-oriented text display. Lines are numbered from 1.
pub trait Display {
    fn show(&mut self, text: &str, line: usize);
    fn clear(&mut self);
}

/// Builds the sensor backend for a config entry.
pub fn build_sensor(cfg: &SensorConfig) -> Result<Box<dyn Sensor>, ConfigError> {
    match cfg.kind {
        DeviceKind::Http => Ok(Box::new(RemoteSensor::new(
            TcpDialer,
            &cfg.host,
            &cfg.path,
            cfg.port,
        )?)),
        kind => Err(unsupported(&cfg.name, kind)),
    }
}

/// Builds the display backend for a kind.
pub fn build_display(kind: DeviceKind) -> Result<Box<dyn Display>, ConfigError> {
    match kind {
        DeviceKind::Log => Ok(Box::new(LogDisplay::default())),
        kind => Err(unsupported("display", kind)),
    }
}

fn unsupported(key: &str, kind: DeviceKind) -> ConfigError {
    let reason = if kind.needs_i2c() {
        format!("`{kind}` needs an I2C bus, which this build does not have")
    } else {
        format!("`{kind}` is not valid here")
    };
    ConfigError::Invalid {
        key: key.to_string(),
        reason,
    }
}

/// Which number formats placeholders expand to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Fixed-width machine-readable values, as served over HTTP.
    Web,
    /// Short values with units, for a character display.
    Display,
}

/// Expands `%TS%` and `%<NAME>_HUMI%`, `%<NAME>_TEMP%`, `%<NAME>_PRES%` for
/// each named reading.
pub fn fill(template: &str, ts: u64, readings: &[(&str, Reading)], style: Style) -> String {
    let mut out = template.replace("%TS%", &format!("{ts:16}"));

    for (name, r) in readings {
        let (h, t, p) = match style {
            Style::Web => (
                format!("{:7.3}", r.humidity),
                format!("{:7.3}", r.temperature),
                format!("{:8.3}", r.pressure),
            ),
            Style::Display => (
                format!("{:5.1}%", r.humidity),
                format!("{:5.1}C", r.temperature),
                format!("{:6.1}hPa", r.pressure),
            ),
        };
        out = out
            .replace(&format!("%{name}_HUMI%"), &h)
            .replace(&format!("%{name}_TEMP%"), &t)
            .replace(&format!("%{name}_PRES%"), &p);
    }

    out
}
