use std::io::{self, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use crate::directory::{SelectedThing, ThingDirectory};
use crate::refresh::RefreshSignal;

/// Shared line-oriented output for the operator terminal.
#[derive(Clone)]
pub struct ConsoleSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Sink that records everything written, for tests and headless runs.
    pub fn memory() -> (Self, MemoryConsole) {
        let buffer = MemoryConsole::default();
        (Self::new(Box::new(buffer.clone())), buffer)
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", text.as_ref());
        let _ = out.flush();
    }

    pub fn raw(&self, text: impl AsRef<str>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = out.write_all(text.as_ref().as_bytes());
        let _ = out.flush();
    }
}

#[derive(Clone, Default)]
pub struct MemoryConsole {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryConsole {
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for MemoryConsole {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handles to everything the node's tasks share. Cloning is cheap and every
/// clone refers to the same directory, selection, flags and signal.
#[derive(Clone)]
pub struct NodeState {
    pub directory: Arc<ThingDirectory>,
    pub selected: Arc<SelectedThing>,
    pub refresh: Arc<RefreshSignal>,
    pub console: ConsoleSink,
    print_all: Arc<AtomicBool>,
}

impl NodeState {
    pub fn new(console: ConsoleSink) -> Self {
        Self {
            directory: Arc::new(ThingDirectory::new()),
            selected: Arc::new(SelectedThing::new()),
            refresh: Arc::new(RefreshSignal::new()),
            console,
            print_all: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether peer updates are echoed to the console as they arrive.
    pub fn print_all(&self) -> bool {
        self.print_all.load(Ordering::Relaxed)
    }

    pub fn set_print_all(&self, on: bool) {
        self.print_all.store(on, Ordering::Relaxed);
    }
}
