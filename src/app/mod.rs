use crate::{
    bus::{BusArbiter, DetachedBus, I2cBus, RppalBus},
    cli::RunOptions,
    config::Config,
    dispatch::PublishQueue,
    directory::FieldValue,
    lcd_driver::{Hd44780, MemorySurface, TextSurface},
    shadow::{
        engine::spawn_dispatcher, CloudSync, ConnectInfo, LoopbackTransport, SerialBridge,
        TopicScheme, Transport,
    },
    state::{ConsoleSink, NodeState},
    Result, MY_THING,
};
use std::io::{BufRead, BufReader};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

pub mod buttons;
pub mod console;
pub mod lifecycle;
pub mod logger;
pub mod render;
pub mod sensor;
pub mod timer;
pub mod touch;

use buttons::{ButtonEdges, ButtonPins};
use console::Console;
pub use logger::LogLevel;
use render::Renderer;
use sensor::SensorPoller;
use touch::TouchPoller;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Effective settings for one run: CLI flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub topic_root: String,
    pub client_id: String,
    pub bridge_device: String,
    pub bridge_baud: u32,
    pub i2c_bus: u8,
    pub shield_addr: u8,
    pub lcd_addr: u8,
    pub cols: u8,
    pub rows: u8,
    pub alert_button_gpio: Option<u8>,
    pub publish_button_gpio: Option<u8>,
    pub publish_interval: Duration,
    pub sensor_period: Duration,
    pub touch_period: Duration,
    pub publish_gap: Duration,
    pub ip_address: Option<String>,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
    pub offline: bool,
    pub no_hardware: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_sources(Config::default(), RunOptions::default())
    }
}

impl AppConfig {
    pub fn from_sources(config: Config, opts: RunOptions) -> Self {
        Self {
            topic_root: opts.topic_root.unwrap_or(config.topic_root),
            client_id: config.client_id,
            bridge_device: opts.bridge_device.unwrap_or(config.bridge_device),
            bridge_baud: opts.bridge_baud.unwrap_or(config.bridge_baud),
            i2c_bus: config.i2c_bus,
            shield_addr: config.shield_addr,
            lcd_addr: config.lcd_addr,
            cols: config.lcd_cols,
            rows: config.lcd_rows,
            alert_button_gpio: config.alert_button_gpio,
            publish_button_gpio: config.publish_button_gpio,
            publish_interval: config.publish_interval,
            sensor_period: config.sensor_period,
            touch_period: config.touch_period,
            publish_gap: config.publish_gap,
            ip_address: opts.ip_address.or(config.ip_address),
            log_level: opts.log_level.unwrap_or(config.log_level),
            log_file: opts.log_file,
            offline: opts.offline,
            no_hardware: opts.no_hardware,
        }
    }

    pub fn connect_info(&self) -> ConnectInfo {
        ConnectInfo {
            client_id: self.client_id.clone(),
            server: if self.offline {
                "loopback".to_string()
            } else {
                self.bridge_device.clone()
            },
            keep_alive: KEEP_ALIVE,
        }
    }
}

pub struct App {
    config: AppConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        match logger::install(config.log_level, config.log_file.clone()) {
            Ok(level) => log::debug!("logging at {}", level.as_str()),
            Err(err) => log::debug!("keeping existing logger: {err}"),
        }
        Ok(Self {
            config,
            transport: None,
        })
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = Config::load_or_default()?;
        let merged = AppConfig::from_sources(cfg_file, opts);
        Self::new(merged)
    }

    /// Use `transport` instead of opening the bridge.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Entry point for the node: stdin console, stdout output, Ctrl-C stops.
    pub fn run(&self) -> Result<()> {
        let running = lifecycle::create_shutdown_flag()?;
        self.run_with(
            running,
            ConsoleSink::stdout(),
            BufReader::new(std::io::stdin()),
        )
    }

    /// Start every task and block until `running` clears.
    pub fn run_with<R>(&self, running: Arc<AtomicBool>, console: ConsoleSink, input: R) -> Result<()>
    where
        R: BufRead + Send + 'static,
    {
        let config = &self.config;
        let state = NodeState::new(console);
        let ip = config
            .ip_address
            .clone()
            .unwrap_or_else(lifecycle::discover_local_ip);
        state.directory.write_field(MY_THING, FieldValue::Ip(ip.clone()))?;
        log::info!(
            "node start (client={}, ip={ip}, topics={})",
            config.client_id,
            config.topic_root
        );

        let queue = PublishQueue::new();
        let engine = Arc::new(
            CloudSync::new(
                state.clone(),
                TopicScheme::new(&config.topic_root),
                self.open_transport(),
            )
            .with_publish_gap(config.publish_gap),
        );
        if let Err(err) = engine.connect_and_subscribe(&config.connect_info()) {
            log::warn!("continuing without a confirmed session: {err}");
        }
        // Queued before any producer starts so the bootstrap always fits.
        engine.bootstrap(&queue);

        let mut handles = vec![
            spawn_dispatcher(engine, queue.clone(), running.clone())?,
            timer::spawn_publish_timer(queue.clone(), config.publish_interval, running.clone())?,
        ];
        // Not joined: it may be parked in a blocking read.
        Console::new(state.clone(), queue.clone()).spawn(input, running.clone())?;

        let hardware = if config.no_hardware {
            None
        } else {
            match open_hardware(config) {
                Ok(hardware) => Some(hardware),
                Err(err) => {
                    log::warn!(
                        "i2c bus {} unavailable ({err}); running without sensors or display",
                        config.i2c_bus
                    );
                    None
                }
            }
        };
        let device_tasks = match hardware {
            Some((bus, lcd)) => self.spawn_device_tasks(bus, lcd, &state, &running),
            None => {
                let surface = MemorySurface::new(config.cols, config.rows);
                self.spawn_device_tasks(DetachedBus, surface, &state, &running)
            }
        };
        match device_tasks {
            Ok(tasks) => handles.extend(tasks),
            Err(err) => {
                running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        }

        let _buttons = if config.no_hardware {
            None
        } else {
            let edges = ButtonEdges::new(state.clone(), queue.clone());
            match ButtonPins::attach(edges, config.publish_button_gpio, config.alert_button_gpio) {
                Ok(pins) => Some(pins),
                Err(err) => {
                    log::warn!("buttons unavailable: {err}");
                    None
                }
            }
        };

        while running.load(Ordering::SeqCst) {
            thread::sleep(SHUTDOWN_POLL);
        }
        log::info!("shutting down");
        for handle in handles {
            let name = handle.thread().name().unwrap_or("task").to_string();
            if handle.join().is_err() {
                log::error!("{name} panicked");
            }
        }
        Ok(())
    }

    fn open_transport(&self) -> Arc<dyn Transport> {
        if let Some(transport) = &self.transport {
            return transport.clone();
        }
        if self.config.offline {
            log::info!("offline: publishes stay in memory");
            return Arc::new(LoopbackTransport::new());
        }
        match SerialBridge::open(&self.config.bridge_device, self.config.bridge_baud) {
            Ok(bridge) => Arc::new(bridge),
            Err(err) => {
                log::warn!(
                    "bridge {} unavailable ({err}); publishes stay in memory",
                    self.config.bridge_device
                );
                Arc::new(LoopbackTransport::new())
            }
        }
    }

    /// Renderer and the two pollers, sharing one arbitrated bus.
    fn spawn_device_tasks<B, S>(
        &self,
        bus: B,
        surface: S,
        state: &NodeState,
        running: &Arc<AtomicBool>,
    ) -> Result<Vec<thread::JoinHandle<()>>>
    where
        B: I2cBus + 'static,
        S: TextSurface<B> + Send + 'static,
    {
        let config = &self.config;
        let arbiter = Arc::new(BusArbiter::new(bus));
        Ok(vec![
            Renderer::new(
                arbiter.clone(),
                surface,
                state.clone(),
                config.cols,
                config.rows,
            )
            .spawn(running.clone())?,
            SensorPoller::new(arbiter.clone(), state.clone(), config.shield_addr)
                .spawn(config.sensor_period, running.clone())?,
            TouchPoller::new(arbiter, state.clone(), config.shield_addr)
                .spawn(config.touch_period, running.clone())?,
        ])
    }
}

fn open_hardware(config: &AppConfig) -> Result<(RppalBus, Hd44780)> {
    let mut bus = RppalBus::open(config.i2c_bus)?;
    let lcd = Hd44780::new(&mut bus, config.lcd_addr, config.cols, config.rows)?;
    Ok((bus, lcd))
}
