//! Operator console: single-character commands read from a line-buffered
//! terminal.

use std::io::BufRead;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crate::{
    directory::FieldValue,
    dispatch::{PublishIntent, PublishQueue},
    state::NodeState,
    Result, MAX_THING, MY_THING,
};

/// Pause between records of the `x` listing.
pub const DEFAULT_PRINT_DELAY: Duration = Duration::from_millis(20);

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const BANNER: [&str; 3] = [
    "******************************************",
    "Enter '?' for a list of available commands",
    "******************************************",
];
const HELP: [&str; 11] = [
    "Commands:",
    "\tt - Print temperature and publish",
    "\th - Print humidity and publish",
    "\tl - Print light value and publish",
    "\tA - Publish weather alert ON",
    "\ta - Publish weather alert OFF",
    "\tP - Turn printing of messages from all things ON",
    "\tp - Turn printing of messages from all things OFF",
    "\tx - Print the current known state of the data from all things",
    "\tc - Clear the terminal and set the cursor to the upper left corner",
    "\t? - Print the list of commands",
];

/// Which command a character mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Temperature,
    Humidity,
    Light,
    AlertOn,
    AlertOff,
    UpdatesOn,
    UpdatesOff,
    ListAll,
    Clear,
    Help,
}

impl ConsoleCommand {
    pub fn from_char(ch: char) -> Option<Self> {
        Some(match ch {
            't' => ConsoleCommand::Temperature,
            'h' => ConsoleCommand::Humidity,
            'l' => ConsoleCommand::Light,
            'A' => ConsoleCommand::AlertOn,
            'a' => ConsoleCommand::AlertOff,
            'P' => ConsoleCommand::UpdatesOn,
            'p' => ConsoleCommand::UpdatesOff,
            'x' => ConsoleCommand::ListAll,
            'c' => ConsoleCommand::Clear,
            '?' => ConsoleCommand::Help,
            _ => return None,
        })
    }
}

pub struct Console {
    state: NodeState,
    queue: PublishQueue,
    print_delay: Duration,
}

impl Console {
    pub fn new(state: NodeState, queue: PublishQueue) -> Self {
        Self {
            state,
            queue,
            print_delay: DEFAULT_PRINT_DELAY,
        }
    }

    pub fn with_print_delay(mut self, delay: Duration) -> Self {
        self.print_delay = delay;
        self
    }

    pub fn print_banner(&self) {
        self.state.console.raw(CLEAR_SCREEN);
        for line in BANNER {
            self.state.console.line(line);
        }
    }

    /// Run one command character. Unknown characters are ignored.
    pub fn handle(&self, ch: char) -> Option<ConsoleCommand> {
        let command = ConsoleCommand::from_char(ch)?;
        let out = &self.state.console;
        let directory = &self.state.directory;
        match command {
            ConsoleCommand::Temperature => {
                out.line(format!("Temperature: {:.1}", directory.mine().temp));
                self.queue.send(PublishIntent::Temperature);
            }
            ConsoleCommand::Humidity => {
                out.line(format!("Humidity: {:.1}", directory.mine().humidity));
                self.queue.send(PublishIntent::Humidity);
            }
            ConsoleCommand::Light => {
                out.line(format!("Light: {:.1}", directory.mine().light));
                self.queue.send(PublishIntent::Light);
            }
            ConsoleCommand::AlertOn | ConsoleCommand::AlertOff => {
                let on = command == ConsoleCommand::AlertOn;
                out.line(if on { "Weather Alert ON" } else { "Weather Alert OFF" });
                if let Err(err) = directory.write_field(MY_THING, FieldValue::Alert(on)) {
                    log::warn!("alert write failed: {err}");
                }
                self.state.refresh.signal();
                self.queue.send(PublishIntent::Alert);
            }
            ConsoleCommand::UpdatesOn => {
                out.line("Thing Updates ON");
                self.state.set_print_all(true);
            }
            ConsoleCommand::UpdatesOff => {
                out.line("Thing Updates OFF");
                self.state.set_print_all(false);
            }
            ConsoleCommand::ListAll => {
                for thing in 0..=MAX_THING {
                    if let Some(record) = directory.read(thing) {
                        out.line(record.summary_line());
                    }
                    if !self.print_delay.is_zero() {
                        thread::sleep(self.print_delay);
                    }
                }
            }
            ConsoleCommand::Clear => self.print_banner(),
            ConsoleCommand::Help => {
                for line in HELP {
                    out.line(line);
                }
            }
        }
        Some(command)
    }

    /// Feed every character of every input line to `handle` until EOF or
    /// until `running` clears.
    pub fn run<R: BufRead>(&self, mut input: R, running: &AtomicBool) -> Result<()> {
        let mut line = String::new();
        while running.load(Ordering::SeqCst) {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                log::debug!("console input closed");
                break;
            }
            for ch in line.chars().filter(|c| !c.is_whitespace()) {
                self.handle(ch);
            }
        }
        Ok(())
    }

    /// Serve `input` on its own thread. Callers should not join it on
    /// shutdown: it may be parked in a blocking read.
    pub fn spawn<R>(self, input: R, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>>
    where
        R: BufRead + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("operator-console".into())
            .spawn(move || {
                self.print_banner();
                if let Err(err) = self.run(input, &running) {
                    log::warn!("console stopped: {err}");
                }
            })?;
        Ok(handle)
    }
}
