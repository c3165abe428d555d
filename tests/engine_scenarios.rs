//! End-to-end scenarios through the spawned engine task with mock drivers
//! and a hand-driven distance channel.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use rovercore::core::{
    Action, ActionKind, Band, ControlError, ControlManager, CoreHandle, Direction, DistanceReading,
    DistanceUpdate, Effect, EngineSettings, LedEngine, LedSettings, Mode, MotionExecutor,
    MotionSettings, Rgb, Source,
};
use rovercore::hw::mock::{MockLedDriver, MockMotionDriver};

const TICK_WAIT: Duration = Duration::from_millis(250);

fn distance(band: Band, meters: f32) -> DistanceUpdate {
    DistanceUpdate {
        reading: DistanceReading { meters, band },
        sensor_ok: true,
        degraded: false,
    }
}

struct Harness {
    core: CoreHandle,
    distance_tx: watch::Sender<DistanceUpdate>,
    speeds: std::sync::Arc<std::sync::Mutex<(f32, f32)>>,
    frame: std::sync::Arc<std::sync::Mutex<[Rgb; 6]>>,
    cancel: CancellationToken,
}

fn spawn_core() -> Harness {
    let (distance_tx, distance_rx) = watch::channel(DistanceUpdate::assume_safe(2.0));
    let (motion_driver, speeds) = MockMotionDriver::new();
    let (led_driver, frame) = MockLedDriver::new();

    let manager = ControlManager::new(
        MotionExecutor::new(MotionSettings::default()),
        LedEngine::new(&LedSettings::default(), 20),
    );

    let cancel = CancellationToken::new();
    let core = CoreHandle::spawn(
        manager,
        EngineSettings::default(),
        distance_rx,
        Box::new(motion_driver),
        Box::new(led_driver),
        cancel.clone(),
    )
    .expect("engine should spawn");

    Harness {
        core,
        distance_tx,
        speeds,
        frame,
        cancel,
    }
}

fn forward(source: Source) -> Action {
    Action::new(
        ActionKind::MoveStart {
            direction: Direction::Forward,
            magnitude: None,
        },
        source,
    )
}

#[tokio::test]
async fn first_source_owns_the_robot_until_release() {
    let mut h = spawn_core();
    let sender = h.core.submitter();

    let mode = sender.submit(forward(Source::Web)).await.unwrap();
    assert_eq!(mode, Mode::Manual { source: Source::Web });

    let err = sender.submit(forward(Source::Gamepad)).await.unwrap_err();
    assert!(matches!(err, ControlError::SourceBusy { holder: Source::Web }));

    let mode = sender
        .submit(Action::new(
            ActionKind::MoveStop { direction: None },
            Source::Web,
        ))
        .await
        .unwrap();
    assert_eq!(mode, Mode::Idle);

    let mode = sender.submit(forward(Source::Gamepad)).await.unwrap();
    assert_eq!(mode, Mode::Manual { source: Source::Gamepad });

    h.cancel.cancel();
    h.core.shutdown().await.unwrap();
}

#[tokio::test]
async fn emergency_stop_reaches_the_motors_within_a_tick() {
    let mut h = spawn_core();
    let sender = h.core.submitter();

    sender.submit(forward(Source::Gamepad)).await.unwrap();
    sleep(TICK_WAIT).await;
    assert!(h.speeds.lock().unwrap().0 > 0.0, "robot should be moving");

    // Any source may fire the emergency stop, holder or not.
    let mode = sender
        .submit(Action::new(ActionKind::EmergencyStop, Source::Voice))
        .await
        .unwrap();
    assert_eq!(mode, Mode::Idle);

    sleep(TICK_WAIT).await;
    assert_eq!(*h.speeds.lock().unwrap(), (0.0, 0.0));

    let status = h.core.status();
    assert_eq!(status.mode, Mode::Idle);
    assert_eq!(status.active_effect, Effect::Off);

    h.core.shutdown().await.unwrap();
}

#[tokio::test]
async fn critical_band_clamps_forward_motion_and_releases_it_again() {
    let mut h = spawn_core();
    let sender = h.core.submitter();

    sender.submit(forward(Source::Web)).await.unwrap();
    sleep(TICK_WAIT).await;
    assert!(h.speeds.lock().unwrap().0 > 0.0);

    h.distance_tx.send(distance(Band::Critical, 0.1)).unwrap();
    sleep(TICK_WAIT).await;
    assert_eq!(
        *h.speeds.lock().unwrap(),
        (0.0, 0.0),
        "forward motion must be clamped in the critical band"
    );

    // Front lights carry the red warning while the band is critical.
    let frame = *h.frame.lock().unwrap();
    assert_eq!(frame[2], Rgb::new(255, 0, 0));
    assert_eq!(frame[3], Rgb::new(255, 0, 0));

    // Obstacle clears: held targets were preserved, motion ramps back up.
    h.distance_tx.send(distance(Band::Safe, 2.0)).unwrap();
    sleep(TICK_WAIT).await;
    assert!(
        h.speeds.lock().unwrap().0 > 0.0,
        "motion should resume after the band improves"
    );

    h.core.shutdown().await.unwrap();
}

#[tokio::test]
async fn overlay_restores_the_chosen_effect_afterwards() {
    let mut h = spawn_core();
    let sender = h.core.submitter();

    sender
        .submit(Action::new(
            ActionKind::SetEffect {
                effect: Effect::Party,
            },
            Source::Web,
        ))
        .await
        .unwrap();

    h.distance_tx.send(distance(Band::Warning, 0.3)).unwrap();
    sleep(TICK_WAIT).await;
    let frame = *h.frame.lock().unwrap();
    assert_eq!(frame[2], Rgb::new(255, 255, 0), "warning shows yellow fronts");

    h.distance_tx.send(distance(Band::Safe, 2.0)).unwrap();
    sleep(TICK_WAIT).await;
    assert_eq!(h.core.status().active_effect, Effect::Party);

    h.core.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_leaves_motors_zeroed_and_lights_dark() {
    let mut h = spawn_core();
    let sender = h.core.submitter();

    sender.submit(forward(Source::Web)).await.unwrap();
    sender
        .submit(Action::new(
            ActionKind::SetEffect {
                effect: Effect::Solid(Rgb::new(0, 0, 255)),
            },
            Source::Web,
        ))
        .await
        .unwrap();
    sleep(TICK_WAIT).await;
    assert!(h.speeds.lock().unwrap().0 > 0.0);

    h.core.shutdown().await.unwrap();

    assert_eq!(*h.speeds.lock().unwrap(), (0.0, 0.0));
    assert_eq!(*h.frame.lock().unwrap(), [Rgb::new(0, 0, 0); 6]);
}
