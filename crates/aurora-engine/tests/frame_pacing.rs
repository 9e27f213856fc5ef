use std::time::Duration;

use aurora_engine::EngineError;
use aurora_engine::device::RecordingDevice;
use aurora_engine::paint::Color;
use aurora_engine::render::RenderEngine;
use aurora_engine::scene::{Layer, Mesh, Scene};
use aurora_engine::time::{Clock, FrameScheduler, ManualClock};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn fast_frame_sleeps_remaining_budget() {
    let clock = ManualClock::new();
    let mut scheduler = FrameScheduler::with_clock(10, clock.clone()).unwrap();

    let stats = scheduler
        .step(|| {
            clock.advance(ms(30));
            Ok::<_, ()>(())
        })
        .unwrap();

    assert_eq!(stats.elapsed, ms(30));
    assert_eq!(stats.slept, ms(70));
    assert!(!stats.over_budget);
    assert_eq!(clock.sleeps(), vec![ms(70)]);
}

#[test]
fn slow_frame_does_not_sleep_or_catch_up() {
    let clock = ManualClock::new();
    let mut scheduler = FrameScheduler::with_clock(10, clock.clone()).unwrap();

    let slow = scheduler
        .step(|| {
            clock.advance(ms(150));
            Ok::<_, ()>(())
        })
        .unwrap();
    assert!(slow.over_budget);
    assert_eq!(slow.slept, Duration::ZERO);
    assert!(clock.sleeps().is_empty());

    // The next frame gets a full, fresh budget.
    let next = scheduler
        .step(|| {
            clock.advance(ms(30));
            Ok::<_, ()>(())
        })
        .unwrap();
    assert_eq!(next.slept, ms(70));
    assert_eq!(clock.sleeps(), vec![ms(70)]);
}

#[test]
fn frame_render_error_stops_the_loop() {
    let vs = "attribute vec3 position;\nattribute vec3 color;\nvoid main(void) {}";
    let fs = "void main(void) {}";
    let scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("a", vs, fs).with_drawable(Mesh::triangle([0.0; 9], [0.0; 9])));

    let mut engine = RenderEngine::new(RecordingDevice::new(8, 8));
    engine.init(&scene).unwrap();

    let clock = ManualClock::new();
    let mut scheduler = FrameScheduler::with_clock(50, clock.clone()).unwrap();
    let mut frames = 0;

    let result = scheduler.run(|| {
        frames += 1;
        if frames == 3 {
            engine.device_mut().fail_next("flush");
        }
        clock.advance(ms(5));
        engine.render(&scene)
    });

    assert!(matches!(result, Err(EngineError::FrameRender(_))));
    assert_eq!(frames, 3);
    assert_eq!(scheduler.frames(), 2);
    assert_eq!(clock.sleeps(), vec![ms(15), ms(15)]);
    assert_eq!(clock.now(), ms(5 * 3 + 15 * 2));
}
