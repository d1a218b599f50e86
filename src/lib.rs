pub mod app;
pub mod bus;
pub mod cli;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod lcd_driver;
pub mod refresh;
pub mod shadow;
pub mod state;

/// Index of this node's own record in the directory.
pub const MY_THING: u8 = 0;
/// Highest peer index mirrored from the cloud.
pub const MAX_THING: u8 = 39;
/// Number of records held by the directory (`0..=MAX_THING`).
pub const THING_COUNT: usize = MAX_THING as usize + 1;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("bus error: {0}")]
    Bus(String),
    #[error("transport error: {0}")]
    Transport(String),
}
