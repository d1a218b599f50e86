//! Display renderer: redraws the selected thing whenever the refresh signal
//! fires.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crate::{
    bus::{BusArbiter, I2cBus},
    directory::ThingRecord,
    lcd_driver::TextSurface,
    state::NodeState,
    Result,
};

pub const FRAME_LINES: usize = 4;
const ALERT_SUFFIX: &str = " *ALERT*";
/// Bound on one refresh wait so shutdown is noticed.
const WAIT_SLICE: Duration = Duration::from_millis(200);

/// The four display rows for one record, each padded or cut to `cols`
/// characters so a redraw fully overwrites the previous frame.
pub fn format_frame(record: &ThingRecord, cols: u8) -> [String; FRAME_LINES] {
    let identity = if record.alert {
        format!("{}{ALERT_SUFFIX}", record.name())
    } else {
        record.name()
    };
    [
        identity,
        record.ip_str.clone(),
        format!("T:{:.1}°C H:{:.1}%", record.temp, record.humidity),
        format!("Light: {:.0} lx", record.light),
    ]
    .map(|line| fit(&line, cols))
}

fn fit(line: &str, cols: u8) -> String {
    let cols = usize::from(cols);
    let mut out: String = line.chars().take(cols).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(cols - len));
    out
}

pub struct Renderer<B, S> {
    arbiter: Arc<BusArbiter<B>>,
    surface: S,
    state: NodeState,
    cols: u8,
    rows: u8,
}

impl<B, S> Renderer<B, S>
where
    B: I2cBus + 'static,
    S: TextSurface<B> + Send + 'static,
{
    pub fn new(arbiter: Arc<BusArbiter<B>>, surface: S, state: NodeState, cols: u8, rows: u8) -> Self {
        Self {
            arbiter,
            surface,
            state,
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn clear(&mut self) -> Result<()> {
        let surface = &mut self.surface;
        self.arbiter.with_bus(|bus| surface.clear(bus))
    }

    /// Draw `lines` from the top row down inside one bus acquisition.
    pub fn draw_lines(&mut self, lines: &[String]) -> Result<()> {
        let rows = usize::from(self.rows);
        let surface = &mut self.surface;
        self.arbiter.with_bus(|bus| {
            for (y, line) in lines.iter().take(rows).enumerate() {
                surface.goto(bus, 0, y as u8)?;
                surface.draw_string(bus, line)?;
            }
            Ok(())
        })
    }

    /// Snapshot and draw the currently selected record.
    pub fn render_selected(&mut self) -> Result<ThingRecord> {
        let index = self.state.selected.get();
        let record = self
            .state
            .directory
            .read(index)
            .unwrap_or_else(|| self.state.directory.mine());
        let frame = format_frame(&record, self.cols);
        self.draw_lines(&frame)?;
        Ok(record)
    }

    pub fn render_offline(&mut self) -> Result<()> {
        self.clear()?;
        self.draw_lines(&[fit("offline", self.cols)])
    }

    /// Clear once, draw the initial frame, then redraw on each refresh
    /// signal until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) {
        if let Err(err) = self.clear() {
            log::warn!("display clear failed: {err}");
        }
        self.state.refresh.signal();
        let mut failing = false;
        while running.load(Ordering::SeqCst) {
            if !self.state.refresh.wait_timeout(WAIT_SLICE) {
                continue;
            }
            match self.render_selected() {
                Ok(record) => {
                    failing = false;
                    log::trace!("drew {}", record.name());
                }
                Err(err) if !failing => {
                    log::warn!("display write failed: {err}");
                    failing = true;
                }
                Err(_) => {}
            }
        }
    }

    pub fn spawn(mut self, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("display-renderer".into())
            .spawn(move || {
                self.run(&running);
                if let Err(err) = self.render_offline() {
                    log::debug!("offline screen not shown: {err}");
                }
            })?;
        Ok(handle)
    }
}
