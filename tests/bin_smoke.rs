use shadowstation::{
    app::{App, AppConfig, LogLevel},
    cli::{Command, RunOptions},
    config::Config,
};
use std::{
    env, fs,
    path::Path,
    process,
    sync::{Mutex, OnceLock},
    time::Duration,
};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn with_temp_home<F: FnOnce(&Path)>(f: F) {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let original_home = env::var_os("HOME");
    let home = tempfile::tempdir().expect("failed to create temp HOME");
    env::set_var("HOME", home.path());
    f(home.path());
    if let Some(val) = original_home {
        env::set_var("HOME", val);
    } else {
        env::remove_var("HOME");
    }
}

fn write_config(home: &Path, contents: &str) {
    let cfg_dir = home.join(".shadowstation");
    fs::create_dir_all(&cfg_dir).expect("failed to create config dir");
    fs::write(cfg_dir.join("config.toml"), contents).expect("failed to write config");
}

#[test]
fn binary_prints_version() {
    let output = process::Command::new(env!("CARGO_BIN_EXE_shadowstation"))
        .arg("--version")
        .output()
        .expect("failed to spawn binary");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn binary_rejects_unknown_flag() {
    let output = process::Command::new(env!("CARGO_BIN_EXE_shadowstation"))
        .arg("--frobnicate")
        .output()
        .expect("failed to spawn binary");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown flag"), "stderr: {stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("USAGE"), "help not printed: {stdout}");
}

#[test]
fn help_lists_core_flags() {
    let help = Command::help();
    for flag in [
        "--bridge-device",
        "--bridge-baud",
        "--topic-root",
        "--ip",
        "--log-level",
        "--offline",
        "--no-hardware",
    ] {
        assert!(help.contains(flag), "help output missing flag {flag}: {help}");
    }
}

#[test]
fn config_file_values_reach_app_config() {
    with_temp_home(|home| {
        write_config(
            home,
            r#"
bridge_device = "/dev/ttyAMA0"
bridge_baud = 9600
publish_interval = "10s"
log_level = "warn"
        "#,
        );
        let cfg = Config::load_or_default().expect("config load failed");
        let merged = AppConfig::from_sources(cfg, RunOptions::default());
        assert_eq!(merged.bridge_device, "/dev/ttyAMA0");
        assert_eq!(merged.bridge_baud, 9_600);
        assert_eq!(merged.publish_interval, Duration::from_secs(10));
        assert_eq!(merged.log_level, LogLevel::Warn);
    });
}

#[test]
fn cli_overrides_config_bridge_settings() {
    with_temp_home(|home| {
        write_config(
            home,
            r#"
bridge_device = "/dev/ttyAMA0"
bridge_baud = 9600
        "#,
        );
        let opts = RunOptions {
            bridge_device: Some("/dev/ttyS1".into()),
            bridge_baud: Some(19_200),
            log_level: Some(LogLevel::Error),
            ..RunOptions::default()
        };
        let app = App::from_options(opts).expect("app build failed");
        assert_eq!(app.config().bridge_device, "/dev/ttyS1");
        assert_eq!(app.config().bridge_baud, 19_200);
        assert_eq!(app.config().log_level, LogLevel::Error);
    });
}

#[test]
fn bad_config_surfaces_line_number() {
    with_temp_home(|home| {
        write_config(home, "lcd_cols = 20\nlcd_rows = many\n");
        let err = App::from_options(RunOptions::default())
            .err()
            .expect("expected bad config to be rejected");
        assert!(format!("{err}").contains("line 2"), "error: {err}");
    });
}
