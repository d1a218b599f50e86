//! Mechanical buttons. Edge callbacks never block: they flip one flag and
//! use the non-blocking enqueue, dropping the intent when the queue is full.

#[cfg(target_os = "linux")]
use std::time::Duration;

use crate::{
    dispatch::{PublishIntent, PublishQueue},
    state::NodeState,
    Error, Result, MY_THING,
};

#[cfg(target_os = "linux")]
const DEBOUNCE: Duration = Duration::from_millis(150);

/// Edge handlers, callable from interrupt callbacks or tests alike.
#[derive(Clone)]
pub struct ButtonEdges {
    state: NodeState,
    queue: PublishQueue,
}

impl ButtonEdges {
    pub fn new(state: NodeState, queue: PublishQueue) -> Self {
        Self { state, queue }
    }

    /// Request a full weather publish. Returns false when dropped.
    pub fn on_publish_edge(&self) -> bool {
        self.queue.try_send(PublishIntent::Weather)
    }

    /// Toggle the local alert, request its publish and a redraw. Returns the
    /// new alert value.
    pub fn on_alert_edge(&self) -> Result<bool> {
        let alert = self.state.directory.toggle_alert(MY_THING)?;
        self.queue.try_send(PublishIntent::Alert);
        self.state.refresh.signal();
        Ok(alert)
    }
}

/// Keeps the interrupt registrations alive; dropping it detaches them.
#[cfg(target_os = "linux")]
pub struct ButtonPins {
    _pins: Vec<rppal::gpio::InputPin>,
}

#[cfg(target_os = "linux")]
impl ButtonPins {
    pub fn attach(edges: ButtonEdges, publish_gpio: Option<u8>, alert_gpio: Option<u8>) -> Result<Self> {
        let mut pins = Vec::new();
        if publish_gpio.is_none() && alert_gpio.is_none() {
            return Ok(Self { _pins: pins });
        }
        let gpio = rppal::gpio::Gpio::new().map_err(map_gpio_err)?;
        if let Some(pin) = publish_gpio {
            let edges = edges.clone();
            pins.push(falling_edge(&gpio, pin, move || {
                if !edges.on_publish_edge() {
                    log::debug!("publish button: queue full, dropped");
                }
            })?);
        }
        if let Some(pin) = alert_gpio {
            pins.push(falling_edge(&gpio, pin, move || {
                if let Err(err) = edges.on_alert_edge() {
                    log::warn!("alert button: {err}");
                }
            })?);
        }
        Ok(Self { _pins: pins })
    }
}

#[cfg(target_os = "linux")]
fn falling_edge(
    gpio: &rppal::gpio::Gpio,
    pin: u8,
    mut on_edge: impl FnMut() + Send + 'static,
) -> Result<rppal::gpio::InputPin> {
    let mut input = gpio.get(pin).map_err(map_gpio_err)?.into_input_pullup();
    input
        .set_async_interrupt(rppal::gpio::Trigger::FallingEdge, Some(DEBOUNCE), move |_event| {
            on_edge()
        })
        .map_err(map_gpio_err)?;
    log::info!("button armed on GPIO {pin}");
    Ok(input)
}

#[cfg(target_os = "linux")]
fn map_gpio_err(err: rppal::gpio::Error) -> Error {
    Error::Io(std::io::Error::other(err))
}

#[cfg(not(target_os = "linux"))]
pub struct ButtonPins;

#[cfg(not(target_os = "linux"))]
impl ButtonPins {
    pub fn attach(_edges: ButtonEdges, publish_gpio: Option<u8>, alert_gpio: Option<u8>) -> Result<Self> {
        if publish_gpio.is_some() || alert_gpio.is_some() {
            return Err(Error::InvalidArgs(
                "GPIO buttons unsupported on this platform".into(),
            ));
        }
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatch::PublishQueue, state::ConsoleSink};

    fn edges(capacity: usize) -> (ButtonEdges, NodeState, PublishQueue) {
        let (console, _mem) = ConsoleSink::memory();
        let state = NodeState::new(console);
        let queue = PublishQueue::with_capacity(capacity);
        (ButtonEdges::new(state.clone(), queue.clone()), state, queue)
    }

    #[test]
    fn alert_edge_toggles_and_requests_publish() {
        let (edges, state, queue) = edges(4);
        assert!(edges.on_alert_edge().unwrap());
        assert!(state.directory.mine().alert);
        assert!(state.refresh.is_pending());
        assert!(!edges.on_alert_edge().unwrap());
        assert_eq!(queue.try_recv(), Some(PublishIntent::Alert));
        assert_eq!(queue.try_recv(), Some(PublishIntent::Alert));
    }

    #[test]
    fn publish_edge_drops_when_full() {
        let (edges, _state, queue) = edges(1);
        assert!(edges.on_publish_edge());
        assert!(!edges.on_publish_edge());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn alert_still_toggles_when_queue_full() {
        let (edges, state, queue) = edges(1);
        queue.send(PublishIntent::Weather);
        assert!(edges.on_alert_edge().unwrap());
        assert!(state.directory.mine().alert);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn no_pins_configured_attaches_nothing() {
        let (edges, _state, _queue) = edges(1);
        assert!(ButtonPins::attach(edges, None, None).is_ok());
    }
}
