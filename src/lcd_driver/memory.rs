use std::sync::{Arc, Mutex, PoisonError};

use super::TextSurface;
use crate::Result;

/// Character grid kept in memory. Clones share the same grid so a test (or
/// the headless run) can inspect what the renderer drew.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    inner: Arc<Mutex<Grid>>,
}

#[derive(Debug)]
struct Grid {
    cols: usize,
    rows: Vec<Vec<char>>,
    cursor: (usize, usize),
    clears: usize,
}

impl MemorySurface {
    pub fn new(cols: u8, rows: u8) -> Self {
        let cols = usize::from(cols.max(1));
        let rows = usize::from(rows.max(1));
        Self {
            inner: Arc::new(Mutex::new(Grid {
                cols,
                rows: vec![vec![' '; cols]; rows],
                cursor: (0, 0),
                clears: 0,
            })),
        }
    }

    /// Current contents, one string per row with trailing blanks kept.
    pub fn lines(&self) -> Vec<String> {
        let grid = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        grid.rows.iter().map(|row| row.iter().collect()).collect()
    }

    /// Number of clear commands issued so far.
    pub fn clear_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clears
    }
}

impl<B> TextSurface<B> for MemorySurface {
    fn clear(&mut self, _bus: &mut B) -> Result<()> {
        let mut grid = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let cols = grid.cols;
        for row in grid.rows.iter_mut() {
            *row = vec![' '; cols];
        }
        grid.cursor = (0, 0);
        grid.clears += 1;
        Ok(())
    }

    fn goto(&mut self, _bus: &mut B, x: u8, y: u8) -> Result<()> {
        let mut grid = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let y = usize::from(y) % grid.rows.len();
        grid.cursor = (usize::from(x), y);
        Ok(())
    }

    fn draw_string(&mut self, _bus: &mut B, text: &str) -> Result<()> {
        let mut grid = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let row_count = grid.rows.len();
        for ch in text.chars() {
            let (x, y) = grid.cursor;
            if ch == '\n' {
                grid.cursor = (0, (y + 1) % row_count);
                continue;
            }
            if x < grid.cols {
                grid.rows[y][x] = ch;
            }
            grid.cursor = (x + 1, y);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DetachedBus;

    #[test]
    fn draws_at_cursor_and_truncates_long_rows() {
        let mut surface = MemorySurface::new(6, 2);
        let mut bus = DetachedBus;
        surface.goto(&mut bus, 2, 1).unwrap();
        surface.draw_string(&mut bus, "abcdef").unwrap();
        assert_eq!(surface.lines(), vec!["      ".to_string(), "  abcd".to_string()]);
    }

    #[test]
    fn clones_observe_the_same_grid() {
        let surface = MemorySurface::new(4, 1);
        let mut writer = surface.clone();
        let mut bus = DetachedBus;
        writer.draw_string(&mut bus, "hi").unwrap();
        writer.clear(&mut bus).unwrap();
        writer.draw_string(&mut bus, "ok").unwrap();
        assert_eq!(surface.lines(), vec!["ok  ".to_string()]);
        assert_eq!(surface.clear_count(), 1);
    }
}
