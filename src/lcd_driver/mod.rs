//! HD44780 over PCF8574 driver, plus the text-surface abstraction the
//! renderer draws through. The driver keeps only display state; every call
//! borrows the bus so it can run inside a `BusArbiter` scope.

use std::time::Duration;

use crate::{bus::I2cBus, Result};

pub mod memory;

pub use memory::MemorySurface;

/// Character display reachable over the shared bus.
pub trait TextSurface<B> {
    fn clear(&mut self, bus: &mut B) -> Result<()>;
    fn goto(&mut self, bus: &mut B, x: u8, y: u8) -> Result<()>;
    fn draw_string(&mut self, bus: &mut B, text: &str) -> Result<()>;
}

/// Backlight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlight {
    On,
    Off,
}

/// HD44780 driver that targets a PCF8574 backpack in 4-bit mode.
#[derive(Debug)]
pub struct Hd44780 {
    addr: u8,
    cols: u8,
    rows: u8,
    cursor_x: u8,
    cursor_y: u8,
    implied_newline: bool,
    backlight: Backlight,
}

const MASK_RS: u8 = 0x01;
const MASK_E: u8 = 0x04;
const SHIFT_BACKLIGHT: u8 = 3;
const SHIFT_DATA: u8 = 4;

const LCD_CLR: u8 = 0x01;
const LCD_HOME: u8 = 0x02;
const LCD_ENTRY_MODE: u8 = 0x04;
const LCD_ENTRY_INC: u8 = 0x02;
const LCD_ON_CTRL: u8 = 0x08;
const LCD_ON_DISPLAY: u8 = 0x04;
const LCD_FUNCTION: u8 = 0x20;
const LCD_FUNCTION_2LINES: u8 = 0x08;
const LCD_FUNCTION_RESET: u8 = 0x30;
const LCD_DDRAM: u8 = 0x80;

/// Degree sign in the A00 character ROM.
const ROM_DEGREE: u8 = 0xdf;

pub const DEFAULT_I2C_ADDR: u8 = 0x27;

impl Hd44780 {
    /// Run the 4-bit init sequence and return the driver with backlight on.
    pub fn new<B: I2cBus>(bus: &mut B, addr: u8, cols: u8, rows: u8) -> Result<Self> {
        let mut driver = Hd44780 {
            addr,
            cols: cols.clamp(1, 40),
            rows: rows.clamp(1, 4),
            cursor_x: 0,
            cursor_y: 0,
            implied_newline: false,
            backlight: Backlight::On,
        };

        bus.write_bytes(addr, &[0])?;
        sleep_ms(20);
        // Reset sequence: 3x reset nibble, then function nibble.
        driver.write_init_nibble(bus, LCD_FUNCTION_RESET)?;
        sleep_ms(5);
        driver.write_init_nibble(bus, LCD_FUNCTION_RESET)?;
        sleep_ms(1);
        driver.write_init_nibble(bus, LCD_FUNCTION_RESET)?;
        sleep_ms(1);
        driver.write_init_nibble(bus, LCD_FUNCTION)?;
        sleep_ms(1);

        let mut cmd = LCD_FUNCTION;
        if driver.rows > 1 {
            cmd |= LCD_FUNCTION_2LINES;
        }
        driver.write_command(bus, cmd)?;

        driver.write_command(bus, LCD_ON_CTRL)?; // display off
        driver.clear(bus)?;
        driver.write_command(bus, LCD_ENTRY_MODE | LCD_ENTRY_INC)?;
        driver.write_command(bus, LCD_ON_CTRL | LCD_ON_DISPLAY)?;
        Ok(driver)
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    /// Clear display and home cursor.
    pub fn clear<B: I2cBus>(&mut self, bus: &mut B) -> Result<()> {
        self.write_command(bus, LCD_CLR)?;
        self.write_command(bus, LCD_HOME)?;
        self.cursor_x = 0;
        self.cursor_y = 0;
        Ok(())
    }

    pub fn set_backlight<B: I2cBus>(&mut self, bus: &mut B, on: bool) -> Result<()> {
        self.backlight = if on { Backlight::On } else { Backlight::Off };
        bus.write_bytes(self.addr, &[self.backlight_mask()])
    }

    pub fn move_to<B: I2cBus>(&mut self, bus: &mut B, cursor_x: u8, cursor_y: u8) -> Result<()> {
        self.cursor_x = cursor_x;
        self.cursor_y = cursor_y % self.rows;
        let mut addr = cursor_x & 0x3f;
        if self.cursor_y & 1 == 1 {
            addr += 0x40;
        }
        if self.cursor_y & 2 == 2 {
            addr += self.cols;
        }
        self.write_command(bus, LCD_DDRAM | addr)
    }

    pub fn putchar<B: I2cBus>(&mut self, bus: &mut B, ch: char) -> Result<()> {
        if ch == '\n' {
            if self.implied_newline {
                self.implied_newline = false;
            } else {
                self.cursor_x = self.cols;
            }
        } else {
            self.write_data(bus, rom_code(ch))?;
            self.cursor_x += 1;
            self.implied_newline = false;
        }

        if self.cursor_x >= self.cols {
            self.cursor_x = 0;
            self.cursor_y = (self.cursor_y + 1) % self.rows;
            self.implied_newline = ch != '\n';
            self.move_to(bus, self.cursor_x, self.cursor_y)?;
        } else {
            self.implied_newline = false;
        }
        Ok(())
    }

    pub fn putstr<B: I2cBus>(&mut self, bus: &mut B, text: &str) -> Result<()> {
        for ch in text.chars() {
            self.putchar(bus, ch)?;
        }
        Ok(())
    }

    fn write_init_nibble<B: I2cBus>(&mut self, bus: &mut B, nibble: u8) -> Result<()> {
        let byte = ((nibble >> 4) & 0x0f) << SHIFT_DATA;
        bus.write_bytes(self.addr, &[byte | MASK_E, byte])
    }

    fn write_command<B: I2cBus>(&mut self, bus: &mut B, cmd: u8) -> Result<()> {
        self.write_nibble(bus, cmd, false)?;
        self.write_nibble(bus, cmd << 4, false)?;
        if cmd <= 3 {
            // HOME/CLEAR need extra delay.
            sleep_ms(5);
        }
        Ok(())
    }

    fn write_data<B: I2cBus>(&mut self, bus: &mut B, data: u8) -> Result<()> {
        self.write_nibble(bus, data, true)?;
        self.write_nibble(bus, data << 4, true)
    }

    fn write_nibble<B: I2cBus>(&mut self, bus: &mut B, nibble: u8, is_data: bool) -> Result<()> {
        let mut byte = self.backlight_mask();
        if is_data {
            byte |= MASK_RS;
        }
        byte |= (nibble >> 4) << SHIFT_DATA;
        bus.write_bytes(self.addr, &[byte | MASK_E, byte])
    }

    fn backlight_mask(&self) -> u8 {
        match self.backlight {
            Backlight::On => 1 << SHIFT_BACKLIGHT,
            Backlight::Off => 0,
        }
    }
}

impl<B: I2cBus> TextSurface<B> for Hd44780 {
    fn clear(&mut self, bus: &mut B) -> Result<()> {
        Hd44780::clear(self, bus)
    }

    fn goto(&mut self, bus: &mut B, x: u8, y: u8) -> Result<()> {
        self.move_to(bus, x, y)
    }

    fn draw_string(&mut self, bus: &mut B, text: &str) -> Result<()> {
        self.putstr(bus, text)
    }
}

fn rom_code(ch: char) -> u8 {
    match ch {
        '°' => ROM_DEGREE,
        c if c.is_ascii() => c as u8,
        _ => b'?',
    }
}

fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
