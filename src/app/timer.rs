use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    dispatch::{PublishIntent, PublishQueue},
    Result,
};

/// Longest single sleep, so loops notice shutdown promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleep until `period` has passed since `started`, waking early once
/// `running` clears. Returns whether the caller should keep going.
pub fn pace(started: Instant, period: Duration, running: &AtomicBool) -> bool {
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let elapsed = started.elapsed();
        if elapsed >= period {
            return true;
        }
        thread::sleep((period - elapsed).min(SLEEP_SLICE));
    }
}

/// Run `tick` every `period` until `running` clears.
pub fn run_every(period: Duration, running: &AtomicBool, mut tick: impl FnMut()) {
    let period = period.max(Duration::from_millis(1));
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        tick();
        if !pace(started, period, running) {
            break;
        }
    }
}

/// Periodic full-weather publish. Uses the blocking send: the timer is a
/// task, not an interrupt.
pub fn spawn_publish_timer(
    queue: PublishQueue,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("publish-timer".into())
        .spawn(move || {
            // First tick fires after one interval, not at startup.
            if !pace(Instant::now(), interval, &running) {
                return;
            }
            run_every(interval, &running, || queue.send(PublishIntent::Weather));
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pace_returns_false_once_stopped() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        assert!(!pace(started, Duration::from_secs(30), &running));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn timer_enqueues_weather() {
        let queue = PublishQueue::new();
        let running = Arc::new(AtomicBool::new(true));
        let handle =
            spawn_publish_timer(queue.clone(), Duration::from_millis(20), running.clone()).unwrap();
        let first = queue.recv_timeout(Duration::from_secs(2));
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert_eq!(first, Some(PublishIntent::Weather));
    }
}
