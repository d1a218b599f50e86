use shadowstation::{
    app::{
        render::{format_frame, Renderer},
        sensor::{PollOutcome, SensorPoller, WeatherReading, SHIELD_ADDR, TOUCH_OFFSET, WEATHER_DATA_OFFSET},
        touch::{TouchAction, TouchPoller},
    },
    bus::{BusArbiter, FakeBus},
    directory::FieldValue,
    lcd_driver::MemorySurface,
    state::{ConsoleSink, NodeState},
    MAX_THING, MY_THING,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

fn state() -> NodeState {
    let (sink, _mem) = ConsoleSink::memory();
    NodeState::new(sink)
}

fn shield_bus(mask: u8, reading: WeatherReading) -> Arc<BusArbiter<FakeBus>> {
    let mut bus = FakeBus::new();
    bus.set_register(SHIELD_ADDR, TOUCH_OFFSET, &[mask]);
    bus.set_register(SHIELD_ADDR, WEATHER_DATA_OFFSET, &reading.to_le_bytes());
    Arc::new(BusArbiter::new(bus))
}

fn set_mask(arbiter: &BusArbiter<FakeBus>, mask: u8) {
    arbiter.with_bus(|bus| bus.set_register(SHIELD_ADDR, TOUCH_OFFSET, &[mask]));
}

#[test]
fn held_press_moves_selection_once() {
    let state = state();
    state.selected.set(5);
    let arbiter = shield_bus(0, WeatherReading::default());
    let mut poller = TouchPoller::new(arbiter.clone(), state.clone(), SHIELD_ADDR);

    let mut actions = Vec::new();
    for mask in [0x00, 0x02, 0x02, 0x00] {
        set_mask(&arbiter, mask);
        actions.push(poller.poll_once());
    }
    assert_eq!(actions, vec![None, Some(TouchAction::Previous), None, None]);
    assert_eq!(state.selected.get(), 4);
}

#[test]
fn selection_wraps_at_both_ends() {
    let state = state();
    let arbiter = shield_bus(0, WeatherReading::default());
    let mut poller = TouchPoller::new(arbiter.clone(), state.clone(), SHIELD_ADDR);
    let mut press = |mask: u8| {
        set_mask(&arbiter, mask);
        poller.poll_once();
        set_mask(&arbiter, 0);
        poller.poll_once();
    };

    state.selected.set(0);
    press(0x02);
    assert_eq!(state.selected.get(), MAX_THING);

    press(0x04);
    assert_eq!(state.selected.get(), 0);

    state.selected.set(35);
    press(0x08);
    assert_eq!(state.selected.get(), 5);

    press(0x01);
    assert_eq!(state.selected.get(), MY_THING);
}

#[test]
fn failed_reads_skip_the_cycle() {
    let state = state();
    let reading = WeatherReading {
        temp: 19.5,
        humidity: 55.0,
        light: 310.0,
    };
    let arbiter = shield_bus(0x02, reading);
    arbiter.with_bus(|bus| bus.set_failing(true));

    let mut sensor = SensorPoller::new(arbiter.clone(), state.clone(), SHIELD_ADDR);
    let mut touch = TouchPoller::new(arbiter.clone(), state.clone(), SHIELD_ADDR);
    assert_eq!(sensor.poll_once(), PollOutcome::Skipped);
    assert_eq!(touch.poll_once(), None);
    assert_eq!(state.directory.mine().temp, 0.0);
    assert_eq!(state.selected.get(), MY_THING);
    assert!(!state.refresh.is_pending());

    arbiter.with_bus(|bus| bus.set_failing(false));
    assert_eq!(sensor.poll_once(), PollOutcome::Changed);
    assert_eq!(sensor.poll_once(), PollOutcome::Unchanged);
    let mine = state.directory.mine();
    assert_eq!((mine.temp, mine.humidity, mine.light), (19.5, 55.0, 310.0));
    assert_eq!(touch.poll_once(), Some(TouchAction::Previous));
}

#[test]
fn renderer_survives_concurrent_writers() {
    let state = state();
    let arbiter = shield_bus(0, WeatherReading::default());
    let surface = MemorySurface::new(20, 4);
    let running = Arc::new(AtomicBool::new(true));
    let renderer = Renderer::new(arbiter.clone(), surface.clone(), state.clone(), 20, 4)
        .spawn(running.clone())
        .unwrap();

    let writers: Vec<_> = (0..3)
        .map(|n| {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..500u16 {
                    let v = f32::from(i) + f32::from(n as u8) * 0.25;
                    let value = match (i + n) % 4 {
                        0 => FieldValue::Temperature(v - 40.0),
                        1 => FieldValue::Humidity(v / 5.0),
                        2 => FieldValue::Light(v * 100.0),
                        _ => FieldValue::Alert(i % 2 == 0),
                    };
                    state.directory.write_field(MY_THING, value).unwrap();
                    if i % 7 == 0 {
                        state
                            .directory
                            .write_field(MY_THING, FieldValue::Ip(format!("10.0.{n}.{}", i % 250)))
                            .unwrap();
                    }
                    state.refresh.signal();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    state.refresh.signal();
    thread::sleep(Duration::from_millis(300));

    let expected = format_frame(&state.directory.mine(), 20);
    let mut drawn = surface.lines();
    for _ in 0..50 {
        if drawn[..] == expected[..] {
            break;
        }
        thread::sleep(Duration::from_millis(20));
        drawn = surface.lines();
    }
    assert_eq!(drawn, expected.to_vec());

    running.store(false, Ordering::SeqCst);
    renderer.join().unwrap();
    assert_eq!(surface.lines()[0].trim_end(), "offline");
}
