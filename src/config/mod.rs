use crate::{app::LogLevel, Error, Result};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

pub mod loader;

pub const DEFAULT_TOPIC_ROOT: &str = crate::shadow::topic::DEFAULT_TOPIC_ROOT;
pub const DEFAULT_CLIENT_ID: &str = "Thing_00";
pub const DEFAULT_BRIDGE_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BRIDGE_BAUD: u32 = 115_200;
pub const DEFAULT_I2C_BUS: u8 = 1;
pub const DEFAULT_SHIELD_ADDR: u8 = crate::app::sensor::SHIELD_ADDR;
pub const DEFAULT_LCD_ADDR: u8 = crate::lcd_driver::DEFAULT_I2C_ADDR;
pub const DEFAULT_COLS: u8 = 20;
pub const DEFAULT_ROWS: u8 = 4;
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SENSOR_PERIOD: Duration = crate::app::sensor::DEFAULT_SENSOR_PERIOD;
pub const DEFAULT_TOUCH_PERIOD: Duration = crate::app::touch::DEFAULT_TOUCH_PERIOD;
pub const DEFAULT_PUBLISH_GAP: Duration = crate::shadow::engine::DEFAULT_PUBLISH_GAP;
const CONFIG_DIR_NAME: &str = ".shadowstation";
const CONFIG_FILE_NAME: &str = "config.toml";

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub topic_root: String,
    pub client_id: String,
    pub bridge_device: String,
    pub bridge_baud: u32,
    pub i2c_bus: u8,
    pub shield_addr: u8,
    pub lcd_addr: u8,
    pub lcd_cols: u8,
    pub lcd_rows: u8,
    pub alert_button_gpio: Option<u8>,
    pub publish_button_gpio: Option<u8>,
    pub publish_interval: Duration,
    pub sensor_period: Duration,
    pub touch_period: Duration,
    pub publish_gap: Duration,
    pub ip_address: Option<String>,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic_root: DEFAULT_TOPIC_ROOT.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            bridge_device: DEFAULT_BRIDGE_DEVICE.to_string(),
            bridge_baud: DEFAULT_BRIDGE_BAUD,
            i2c_bus: DEFAULT_I2C_BUS,
            shield_addr: DEFAULT_SHIELD_ADDR,
            lcd_addr: DEFAULT_LCD_ADDR,
            lcd_cols: DEFAULT_COLS,
            lcd_rows: DEFAULT_ROWS,
            alert_button_gpio: None,
            publish_button_gpio: None,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            sensor_period: DEFAULT_SENSOR_PERIOD,
            touch_period: DEFAULT_TOUCH_PERIOD,
            publish_gap: DEFAULT_PUBLISH_GAP,
            ip_address: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }
}

pub(crate) fn validate(cfg: &Config) -> Result<()> {
    if cfg.topic_root.trim().is_empty() {
        return Err(Error::InvalidArgs("topic_root must not be empty".into()));
    }
    if cfg.client_id.trim().is_empty() {
        return Err(Error::InvalidArgs("client_id must not be empty".into()));
    }
    if cfg.bridge_baud == 0 {
        return Err(Error::InvalidArgs("bridge_baud must be positive".into()));
    }
    if !(1..=40).contains(&cfg.lcd_cols) {
        return Err(Error::InvalidArgs("lcd_cols must be between 1 and 40".into()));
    }
    if !(1..=4).contains(&cfg.lcd_rows) {
        return Err(Error::InvalidArgs("lcd_rows must be between 1 and 4".into()));
    }
    for (name, period) in [
        ("publish_interval", cfg.publish_interval),
        ("sensor_period", cfg.sensor_period),
        ("touch_period", cfg.touch_period),
    ] {
        if period.is_zero() {
            return Err(Error::InvalidArgs(format!("{name} must be greater than zero")));
        }
    }
    if let Some(ip) = &cfg.ip_address {
        validate_ip(ip)?;
    }
    Ok(())
}

pub(crate) fn validate_ip(ip: &str) -> Result<()> {
    ip.parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| Error::InvalidArgs(format!("'{ip}' is not a dotted-quad IPv4 address")))
}

/// Accepts `0x`-prefixed hex or plain decimal.
pub(crate) fn parse_addr(raw: &str) -> std::result::Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|_| "expected a hex or decimal bus address (e.g., 0x27)".to_string())
}

pub(crate) fn format_addr(addr: u8) -> String {
    format!("{addr:#04x}")
}

pub(crate) fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

pub(crate) fn format_duration(value: Duration) -> String {
    humantime::format_duration(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_node_profile() {
        let cfg = Config::default();
        assert_eq!(cfg.topic_root, "$aws/things");
        assert_eq!(cfg.shield_addr, 0x42);
        assert_eq!(cfg.lcd_addr, 0x27);
        assert_eq!(cfg.sensor_period, Duration::from_millis(500));
        assert_eq!(cfg.touch_period, Duration::from_millis(100));
        assert_eq!(cfg.publish_gap, Duration::from_millis(100));
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn addresses_parse_hex_or_decimal() {
        assert_eq!(parse_addr("0x42"), Ok(0x42));
        assert_eq!(parse_addr("39"), Ok(39));
        assert!(parse_addr("0x1ff").is_err());
        assert_eq!(format_addr(0x27), "0x27");
    }

    #[test]
    fn durations_use_humantime() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("soon").is_err());
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
    }

    #[test]
    fn rejects_bad_ip_override() {
        let cfg = Config {
            ip_address: Some("10.0.0".into()),
            ..Config::default()
        };
        let err = validate(&cfg).unwrap_err();
        assert!(format!("{err}").contains("IPv4"));
    }
}
