use color_eyre::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rovercore::adapters::{GamepadAdapter, VoiceAdapter, WebBridge};
use rovercore::config::Config;
use rovercore::core::{ControlManager, CoreHandle, DistanceMonitor, LedEngine, MotionExecutor};
use rovercore::hw::mock::{FixedDistanceSensor, MockLedDriver, MockMotionDriver};
use rovercore::hw::pi::{PiDistanceSensor, PiLedDriver, PiMotionDriver};
use rovercore::hw::{DistanceSensor, LedDriver, MotionDriver};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::load().await?;

    let cancel = CancellationToken::new();

    let (motion_driver, led_driver, distance_sensor) = build_drivers(&config);

    let distance_rx =
        DistanceMonitor::new(distance_sensor, config.distance.clone()).spawn(cancel.clone());

    let manager = ControlManager::new(
        MotionExecutor::new(config.movement.clone()),
        LedEngine::new(&config.leds, config.ticks.led_hz),
    );
    let mut core = CoreHandle::spawn(
        manager,
        config.ticks.clone(),
        distance_rx,
        motion_driver,
        led_driver,
        cancel.clone(),
    )?;

    if config.gamepad.enabled {
        match GamepadAdapter::create(config.gamepad.clone()) {
            Ok(adapter) => {
                adapter.spawn(core.submitter(), cancel.clone());
            }
            Err(e) => warn!("Gamepad unavailable, continuing without it: {}", e),
        }
    }

    if config.web.enabled {
        WebBridge::new(config.web.clone()).spawn(
            core.submitter(),
            core.subscribe_status(),
            cancel.clone(),
        );
    }

    if config.voice.enabled {
        spawn_voice(&config, &core, cancel.clone());
    }

    info!("rovercore running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested");
    core.shutdown().await?;
    info!("Goodbye");
    Ok(())
}

/// Real drivers when the hardware is there, mocks otherwise. A failed
/// hardware probe falls back rather than aborting so the same binary runs
/// on a development machine.
fn build_drivers(
    config: &Config,
) -> (
    Box<dyn MotionDriver>,
    Box<dyn LedDriver>,
    Box<dyn DistanceSensor>,
) {
    let mock_distance = config.development.mock_distance_m.unwrap_or(2.0);

    if config.development.force_mock {
        info!("Mock drivers forced by configuration");
        return mock_drivers(mock_distance);
    }

    match (
        PiMotionDriver::new(),
        PiLedDriver::new(),
        PiDistanceSensor::new(),
    ) {
        (Ok(motion), Ok(leds), Ok(distance)) => {
            info!("Hardware drivers initialized");
            (Box::new(motion), Box::new(leds), Box::new(distance))
        }
        (motion, leds, distance) => {
            for err in [
                motion.err().map(|e| e.to_string()),
                leds.err().map(|e| e.to_string()),
                distance.err().map(|e| e.to_string()),
            ]
            .into_iter()
            .flatten()
            {
                warn!("Hardware probe failed: {}", err);
            }
            warn!("Falling back to mock drivers");
            mock_drivers(mock_distance)
        }
    }
}

fn mock_drivers(
    mock_distance: f32,
) -> (
    Box<dyn MotionDriver>,
    Box<dyn LedDriver>,
    Box<dyn DistanceSensor>,
) {
    let (motion, _) = MockMotionDriver::new();
    let (leds, _) = MockLedDriver::new();
    (
        Box::new(motion),
        Box::new(leds),
        Box::new(FixedDistanceSensor::new(mock_distance)),
    )
}

/// Wires the voice adapter to stdin lines and logs its feedback. A real
/// speech pipeline would replace both channels.
fn spawn_voice(config: &Config, core: &CoreHandle, cancel: CancellationToken) -> JoinHandle<()> {
    let (transcript_tx, transcript_rx) = mpsc::channel(16);
    let (feedback_tx, mut feedback_rx) = mpsc::channel::<String>(16);

    VoiceAdapter::new(config.voice.clone()).spawn(
        core.submitter(),
        transcript_rx,
        feedback_tx,
        cancel.clone(),
    );

    tokio::spawn(async move {
        while let Some(line) = feedback_rx.recv().await {
            info!("Voice feedback: {}", line);
        }
    });

    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if transcript_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                },
            }
        }
    })
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
