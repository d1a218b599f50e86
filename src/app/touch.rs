//! Capacitive touch buttons: press-once navigation of the displayed thing.

use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;

use super::{sensor::TOUCH_OFFSET, timer::run_every};
use crate::{
    bus::{BusArbiter, I2cBus},
    state::NodeState,
    Result,
};

pub const DEFAULT_TOUCH_PERIOD: Duration = Duration::from_millis(100);
const BUTTON_MASK: u8 = 0x0f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchState {
    #[default]
    Idle,
    ButtonHeld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    /// Button 0.
    ShowMine,
    /// Button 1.
    Previous,
    /// Button 2.
    Next,
    /// Button 3.
    SkipTen,
}

impl TouchAction {
    /// Lowest set bit wins.
    fn from_mask(mask: u8) -> Option<Self> {
        const ORDER: [TouchAction; 4] = [
            TouchAction::ShowMine,
            TouchAction::Previous,
            TouchAction::Next,
            TouchAction::SkipTen,
        ];
        ORDER
            .iter()
            .enumerate()
            .find(|&(bit, _)| mask & (1u8 << bit) != 0)
            .map(|(_, action)| *action)
    }
}

/// Edge detector over successive button masks. One action fires per press;
/// nothing fires again until every button is released.
#[derive(Debug, Default)]
pub struct TouchHandler {
    state: TouchState,
}

impl TouchHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TouchState {
        self.state
    }

    pub fn on_mask(&mut self, mask: u8) -> Option<TouchAction> {
        let mask = mask & BUTTON_MASK;
        match self.state {
            TouchState::Idle => {
                let action = TouchAction::from_mask(mask)?;
                self.state = TouchState::ButtonHeld;
                Some(action)
            }
            TouchState::ButtonHeld => {
                if mask == 0 {
                    self.state = TouchState::Idle;
                }
                None
            }
        }
    }
}

/// Move the selection and ask for a redraw. Returns the new index.
pub fn apply_action(state: &NodeState, action: TouchAction) -> u8 {
    let selected = &state.selected;
    let index = match action {
        TouchAction::ShowMine => selected.show_mine(),
        TouchAction::Previous => selected.previous(),
        TouchAction::Next => selected.next(),
        TouchAction::SkipTen => selected.skip_ten(),
    };
    state.refresh.signal();
    index
}

pub fn read_touch_mask<B: I2cBus>(arbiter: &BusArbiter<B>, addr: u8) -> Result<u8> {
    arbiter.with_bus(|bus| {
        bus.select_register(addr, TOUCH_OFFSET)?;
        let mut mask = [0u8; 1];
        bus.read_bytes(addr, &mut mask)?;
        Ok(mask[0])
    })
}

pub struct TouchPoller<B> {
    arbiter: Arc<BusArbiter<B>>,
    state: NodeState,
    addr: u8,
    handler: TouchHandler,
    failing: bool,
}

impl<B: I2cBus + 'static> TouchPoller<B> {
    pub fn new(arbiter: Arc<BusArbiter<B>>, state: NodeState, addr: u8) -> Self {
        Self {
            arbiter,
            state,
            addr,
            handler: TouchHandler::new(),
            failing: false,
        }
    }

    /// Read the mask once and apply any new press. A failed read leaves the
    /// handler state alone.
    pub fn poll_once(&mut self) -> Option<TouchAction> {
        let mask = match read_touch_mask(&self.arbiter, self.addr) {
            Ok(mask) => {
                self.failing = false;
                mask
            }
            Err(err) => {
                if !self.failing {
                    log::warn!("touch read failed: {err}");
                    self.failing = true;
                }
                return None;
            }
        };
        let action = self.handler.on_mask(mask)?;
        let index = apply_action(&self.state, action);
        log::debug!("touch {action:?} -> thing {index}");
        Some(action)
    }

    pub fn spawn(
        mut self,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("touch-handler".into())
            .spawn(move || {
                run_every(period, &running, || {
                    self.poll_once();
                });
            })?;
        Ok(handle)
    }
}
