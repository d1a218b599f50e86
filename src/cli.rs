use std::str::FromStr;

use crate::{app::LogLevel, Error, Result};

/// Options for the `run` command; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub bridge_device: Option<String>,
    pub bridge_baud: Option<u32>,
    pub topic_root: Option<String>,
    pub ip_address: Option<String>,
    pub log_level: Option<LogLevel>,
    pub log_file: Option<String>,
    /// Use the in-memory transport instead of the serial bridge.
    pub offline: bool,
    /// Skip I2C and GPIO; display output goes to memory.
    pub no_hardware: bool,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        if args.is_empty() {
            return Ok(Command::Run(RunOptions::default()));
        }

        let mut iter = args.iter();
        match iter.next().map(|s| s.as_str()) {
            Some("run") => Ok(Command::Run(parse_run_options(&mut iter)?)),
            Some("--help") | Some("-h") => Ok(Command::ShowHelp),
            Some("--version") | Some("-V") => Ok(Command::ShowVersion),
            Some(flag) if flag.starts_with('-') => {
                // `run` may be omitted; re-parse from the first flag.
                let mut iter = args.iter();
                Ok(Command::Run(parse_run_options(&mut iter)?))
            }
            Some(cmd) => Err(Error::InvalidArgs(format!(
                "unknown command '{cmd}', try --help"
            ))),
            None => Ok(Command::Run(RunOptions::default())),
        }
    }

    pub fn help() -> &'static str {
        concat!(
            "shadowstation - weather-station node mirroring peer device shadows\n",
            "\n",
            "USAGE:\n",
            "  shadowstation run [OPTIONS]\n",
            "  shadowstation --help\n",
            "  shadowstation --version\n",
            "\n",
            "OPTIONS:\n",
            "  --bridge-device <path>  Serial device of the MQTT bridge (default: /dev/ttyUSB0)\n",
            "  --bridge-baud <number>  Bridge baud rate (default: 115200)\n",
            "  --topic-root <prefix>   Shadow topic root (default: $aws/things)\n",
            "  --ip <a.b.c.d>          Announce this IP instead of the discovered one\n",
            "  --log-level <level>     error|warn|info|debug|trace (default: info)\n",
            "  --log-file <path>       Also append log lines to this file\n",
            "  --offline               Run without the bridge (in-memory transport)\n",
            "  --no-hardware           Run without I2C/GPIO (display kept in memory)\n",
            "  -h, --help              Show this help\n",
            "  -V, --version           Show version\n",
            "\n",
            "Config file: ~/.shadowstation/config.toml (created with defaults on first run)\n",
        )
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}

fn parse_run_options(iter: &mut std::slice::Iter<String>) -> Result<RunOptions> {
    let mut opts = RunOptions::default();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--bridge-device" => {
                opts.bridge_device = Some(take_value(flag, iter)?);
            }
            "--bridge-baud" => {
                let raw = take_value(flag, iter)?;
                let baud: u32 = raw.parse().map_err(|_| {
                    Error::InvalidArgs("bridge baud must be a positive integer".to_string())
                })?;
                if baud == 0 {
                    return Err(Error::InvalidArgs(
                        "bridge baud must be a positive integer".to_string(),
                    ));
                }
                opts.bridge_baud = Some(baud);
            }
            "--topic-root" => {
                opts.topic_root = Some(take_value(flag, iter)?);
            }
            "--ip" => {
                let raw = take_value(flag, iter)?;
                crate::config::validate_ip(&raw)?;
                opts.ip_address = Some(raw);
            }
            "--log-level" => {
                let raw = take_value(flag, iter)?;
                opts.log_level = Some(LogLevel::from_str(&raw).map_err(|_| {
                    Error::InvalidArgs(format!(
                        "log level must be one of error|warn|info|debug|trace, got '{raw}'"
                    ))
                })?);
            }
            "--log-file" => {
                opts.log_file = Some(take_value(flag, iter)?);
            }
            "--offline" => opts.offline = true,
            "--no-hardware" => opts.no_hardware = true,
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown flag '{other}', try --help"
                )));
            }
        }
    }

    Ok(opts)
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::InvalidArgs(format!("expected a value after {flag}")))
}
