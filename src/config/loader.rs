use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{app::LogLevel, Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

pub fn load_or_default() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = Config::default();
        cfg.save_to_path(&path)?;
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = format!(
        "# shadowstation config\n\
topic_root = \"{}\"\n\
client_id = \"{}\"\n\
bridge_device = \"{}\"\n\
bridge_baud = {}\n\
i2c_bus = {}\n\
shield_addr = {}\n\
lcd_addr = {}\n\
lcd_cols = {}\n\
lcd_rows = {}\n\
alert_button_gpio = {}\n\
publish_button_gpio = {}\n\
publish_interval = \"{}\"\n\
sensor_period = \"{}\"\n\
touch_period = \"{}\"\n\
publish_gap = \"{}\"\n\
ip_address = {}\n\
log_level = \"{}\"\n",
        config.topic_root,
        config.client_id,
        config.bridge_device,
        config.bridge_baud,
        config.i2c_bus,
        super::format_addr(config.shield_addr),
        super::format_addr(config.lcd_addr),
        config.lcd_cols,
        config.lcd_rows,
        format_optional_pin(config.alert_button_gpio),
        format_optional_pin(config.publish_button_gpio),
        super::format_duration(config.publish_interval),
        super::format_duration(config.sensor_period),
        super::format_duration(config.touch_period),
        super::format_duration(config.publish_gap),
        config
            .ip_address
            .as_ref()
            .map(|ip| format!("\"{ip}\""))
            .unwrap_or_else(|| "null".into()),
        config.log_level.as_str(),
    );
    fs::write(path, contents)?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let mut cfg = Config::default();

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = trimmed.split_once('=').ok_or_else(|| {
            Error::InvalidArgs(format!("invalid config line {}: '{}'", idx + 1, line))
        })?;

        let key = key.trim();
        let value = value.trim().trim_matches('"');
        let line_no = idx + 1;
        match key {
            "topic_root" => cfg.topic_root = value.to_string(),
            "client_id" => cfg.client_id = value.to_string(),
            "bridge_device" => cfg.bridge_device = value.to_string(),
            "bridge_baud" => cfg.bridge_baud = parse_number(key, value, line_no)?,
            "i2c_bus" => cfg.i2c_bus = parse_number(key, value, line_no)?,
            "lcd_cols" => cfg.lcd_cols = parse_number(key, value, line_no)?,
            "lcd_rows" => cfg.lcd_rows = parse_number(key, value, line_no)?,
            "shield_addr" | "lcd_addr" => {
                let addr = super::parse_addr(value).map_err(|e| {
                    Error::InvalidArgs(format!("invalid {key} on line {line_no}: {e}"))
                })?;
                if key == "shield_addr" {
                    cfg.shield_addr = addr;
                } else {
                    cfg.lcd_addr = addr;
                }
            }
            "alert_button_gpio" => cfg.alert_button_gpio = parse_optional_pin(key, value, line_no)?,
            "publish_button_gpio" => {
                cfg.publish_button_gpio = parse_optional_pin(key, value, line_no)?
            }
            "publish_interval" => cfg.publish_interval = parse_period(key, value, line_no)?,
            "sensor_period" => cfg.sensor_period = parse_period(key, value, line_no)?,
            "touch_period" => cfg.touch_period = parse_period(key, value, line_no)?,
            "publish_gap" => cfg.publish_gap = parse_period(key, value, line_no)?,
            "ip_address" => {
                cfg.ip_address = if value == "null" || value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "log_level" => {
                cfg.log_level = LogLevel::from_str(value).map_err(|_| {
                    Error::InvalidArgs(format!("invalid log_level on line {line_no}"))
                })?;
            }
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown config key '{}' on line {}",
                    other, line_no
                )));
            }
        }
    }

    super::validate(&cfg)?;
    Ok(cfg)
}

fn parse_number<T: FromStr>(key: &str, value: &str, line_no: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgs(format!("invalid {key} value on line {line_no}")))
}

fn parse_optional_pin(key: &str, value: &str, line_no: usize) -> Result<Option<u8>> {
    if value == "null" {
        return Ok(None);
    }
    parse_number(key, value, line_no).map(Some)
}

fn parse_period(key: &str, value: &str, line_no: usize) -> Result<std::time::Duration> {
    super::parse_duration(value)
        .map_err(|e| Error::InvalidArgs(format!("invalid {key} on line {line_no}: {e}")))
}

fn format_optional_pin(pin: Option<u8>) -> String {
    pin.map(|p| p.to_string()).unwrap_or_else(|| "null".into())
}

fn config_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| Error::InvalidArgs("HOME not set; cannot locate config directory".into()))?;
    Ok(dirs.home_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    #[test]
    fn loads_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parses_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let contents = r#"
            # lab node
            topic_root = "lab/things"
            client_id = "Thing_00"
            bridge_device = "/dev/ttyAMA0"
            bridge_baud = 57600
            i2c_bus = 3
            shield_addr = 0x43
            lcd_addr = 0x3f
            lcd_cols = 16
            lcd_rows = 2
            alert_button_gpio = 17
            publish_button_gpio = null
            publish_interval = "1m"
            sensor_period = "250ms"
            touch_period = "50ms"
            publish_gap = "0s"
            ip_address = "10.1.2.3"
            log_level = "debug"
        "#;
        fs::write(&path, contents).unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.topic_root, "lab/things");
        assert_eq!(cfg.bridge_device, "/dev/ttyAMA0");
        assert_eq!(cfg.bridge_baud, 57_600);
        assert_eq!(cfg.i2c_bus, 3);
        assert_eq!(cfg.shield_addr, 0x43);
        assert_eq!(cfg.lcd_addr, 0x3f);
        assert_eq!((cfg.lcd_cols, cfg.lcd_rows), (16, 2));
        assert_eq!(cfg.alert_button_gpio, Some(17));
        assert_eq!(cfg.publish_button_gpio, None);
        assert_eq!(cfg.publish_interval, Duration::from_secs(60));
        assert_eq!(cfg.sensor_period, Duration::from_millis(250));
        assert_eq!(cfg.touch_period, Duration::from_millis(50));
        assert_eq!(cfg.publish_gap, Duration::ZERO);
        assert_eq!(cfg.ip_address.as_deref(), Some("10.1.2.3"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_unknown_key_with_line_number() {
        let err = parse("lcd_cols = 20\nnope = 1").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("unknown config key 'nope'"));
        assert!(msg.contains("line 2"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(format!("{}", parse("sensor_period = \"fast\"").unwrap_err())
            .contains("sensor_period"));
        assert!(format!("{}", parse("touch_period = \"0ms\"").unwrap_err())
            .contains("touch_period"));
        assert!(format!("{}", parse("lcd_rows = 9").unwrap_err()).contains("lcd_rows must"));
        assert!(format!("{}", parse("shield_addr = zz").unwrap_err()).contains("shield_addr"));
        assert!(format!("{}", parse("no equals sign").unwrap_err()).contains("line 1"));
    }

    #[test]
    fn saves_and_loads_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            topic_root: "lab/things".into(),
            bridge_baud: 9_600,
            lcd_addr: 0x3f,
            alert_button_gpio: Some(5),
            publish_button_gpio: Some(6),
            publish_interval: Duration::from_secs(45),
            sensor_period: Duration::from_millis(750),
            ip_address: Some("192.168.0.9".into()),
            log_level: LogLevel::Warn,
            ..Config::default()
        };
        save_to_path(&cfg, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_temp_home<F: FnOnce(&Path)>(f: F) {
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let original_home = std::env::var_os("HOME");
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        f(home.path());
        if let Some(val) = original_home {
            std::env::set_var("HOME", val);
        } else {
            std::env::remove_var("HOME");
        }
    }

    #[test]
    fn load_or_default_creates_file_with_defaults() {
        with_temp_home(|home| {
            let cfg_path = home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

            let cfg = load_or_default().unwrap();
            assert_eq!(cfg, Config::default());
            assert!(cfg_path.exists(), "expected config file to be created");

            let contents = fs::read_to_string(&cfg_path).unwrap();
            assert!(contents.contains("topic_root = \"$aws/things\""));
            assert!(contents.contains("sensor_period = \"500ms\""));
        });
    }
}
