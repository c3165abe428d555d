//! Web bridge: remote command and status transport over MQTT.
//!
//! Subscribes to `{base}/command/#` and maps topic paths to core actions,
//! answers every command with a JSON acknowledgement on `{base}/ack` and
//! publishes the core status snapshot on `{base}/status` on a fixed
//! cadence. A web frontend only needs an MQTT-over-websocket client to
//! drive the robot.
//!
//! Command topics, relative to `{base}/command/`:
//!
//! ```text
//! move/<forward|backward|left|right>/start   payload: optional magnitude
//! move/<forward|backward|left|right>/stop
//! stop            soft stop, keeps ownership
//! estop           emergency stop
//! release         drop all held motion
//! effect/<knight_rider|party|solid|off>      solid payload: {"r":..,"g":..,"b":..}
//! overlay/clear
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{
    Action, ActionKind, ActionSender, ControlError, CoreStatus, Direction, Effect, Rgb, Source,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebBridgeSettings {
    pub enabled: bool,
    /// Broker address as `host:port`.
    pub url: String,
    pub user: String,
    pub pw: String,
    pub base_topic: String,
    pub status_interval_ms: u64,
}

impl Default for WebBridgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "localhost:1883".to_string(),
            user: String::new(),
            pw: String::new(),
            base_topic: "rover".to_string(),
            status_interval_ms: 1000,
        }
    }
}

impl WebBridgeSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.enabled && self.url.is_empty() {
            return Err(ControlError::ConfigError(
                "web bridge enabled but no broker url configured".into(),
            ));
        }
        if self.base_topic.is_empty() || self.base_topic.contains(['#', '+']) {
            return Err(ControlError::ConfigError(format!(
                "invalid base topic '{}'",
                self.base_topic
            )));
        }
        Ok(())
    }
}

fn parse_direction(s: &str) -> Option<Direction> {
    match s {
        "forward" => Some(Direction::Forward),
        "backward" => Some(Direction::Backward),
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        _ => None,
    }
}

/// Maps a command topic (relative to the command prefix) and its payload
/// to an action. Unknown paths yield `None` and are only logged.
fn parse_command(path: &str, payload: &str) -> Option<ActionKind> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["move", dir, "start"] => {
            let direction = parse_direction(dir)?;
            let magnitude = payload.trim().parse::<f32>().ok();
            Some(ActionKind::MoveStart {
                direction,
                magnitude,
            })
        }
        ["move", dir, "stop"] => {
            let direction = parse_direction(dir)?;
            Some(ActionKind::MoveStop {
                direction: Some(direction),
            })
        }
        ["stop"] => Some(ActionKind::Stop),
        ["estop"] => Some(ActionKind::EmergencyStop),
        ["release"] => Some(ActionKind::MoveStop { direction: None }),
        ["effect", "knight_rider"] => Some(ActionKind::SetEffect {
            effect: Effect::KnightRider,
        }),
        ["effect", "party"] => Some(ActionKind::SetEffect {
            effect: Effect::Party,
        }),
        ["effect", "off"] => Some(ActionKind::SetEffect {
            effect: Effect::Off,
        }),
        ["effect", "solid"] => {
            let color = serde_json::from_str::<Rgb>(payload).unwrap_or(Rgb::new(0, 0, 255));
            Some(ActionKind::SetEffect {
                effect: Effect::Solid(color),
            })
        }
        ["overlay", "clear"] => Some(ActionKind::SetOverlay { overlay: None }),
        _ => None,
    }
}

pub struct WebBridge {
    settings: WebBridgeSettings,
}

impl WebBridge {
    pub fn new(settings: WebBridgeSettings) -> Self {
        Self { settings }
    }

    /// Connects to the broker and runs the bridge until cancelled.
    pub fn spawn(
        self,
        sender: ActionSender,
        status_rx: watch::Receiver<CoreStatus>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let settings = self.settings;

        let server_comps: Vec<&str> = settings.url.split(':').collect();
        let server_addr = (*server_comps.first().unwrap_or(&"localhost")).to_string();
        let port: u16 = server_comps
            .get(1)
            .and_then(|p| p.parse().ok())
            .unwrap_or(1883);

        let mut mqtt_options = MqttOptions::new("rovercore-web", server_addr, port);
        mqtt_options.set_keep_alive(Duration::from_secs(5));
        if !settings.user.is_empty() {
            mqtt_options.set_credentials(settings.user.clone(), settings.pw.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

        let command_prefix = format!("{}/command/", settings.base_topic);
        let command_filter = format!("{}#", command_prefix);
        let ack_topic = format!("{}/ack", settings.base_topic);
        let status_topic = format!("{}/status", settings.base_topic);
        let status_period = Duration::from_millis(settings.status_interval_ms);

        tokio::spawn(async move {
            info!("Web bridge connecting to {}", settings.url);
            if let Err(e) = client.subscribe(command_filter.as_str(), QoS::AtMostOnce).await {
                error!("Web bridge failed to subscribe: {}", e);
                return;
            }

            let mut status_timer = interval(status_period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Web bridge stopped");
                        break;
                    }

                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let payload = String::from_utf8_lossy(&publish.payload).to_string();
                            handle_command(
                                &client,
                                &sender,
                                &command_prefix,
                                &ack_topic,
                                &publish.topic,
                                &payload,
                            )
                            .await;
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Web bridge connected to broker");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Web bridge connection error, retrying: {}", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    },

                    _ = status_timer.tick() => {
                        let status = status_rx.borrow().clone();
                        match serde_json::to_string(&status) {
                            Ok(body) => {
                                if let Err(e) = client
                                    .publish(status_topic.as_str(), QoS::AtMostOnce, false, body)
                                    .await
                                {
                                    debug!("Status publish failed: {}", e);
                                }
                            }
                            Err(e) => error!("Status serialization failed: {}", e),
                        }
                    }
                }
            }
        })
    }
}

async fn handle_command(
    client: &AsyncClient,
    sender: &ActionSender,
    command_prefix: &str,
    ack_topic: &str,
    topic: &str,
    payload: &str,
) {
    let Some(path) = topic.strip_prefix(command_prefix) else {
        debug!("Ignoring off-prefix topic {}", topic);
        return;
    };

    let Some(kind) = parse_command(path, payload) else {
        warn!("Unknown web command: {}", path);
        publish_ack(client, ack_topic, path, Err("unknown command".to_string())).await;
        return;
    };

    let result = sender.submit(Action::new(kind, Source::Web)).await;
    let verdict = match result {
        Ok(mode) => {
            debug!("Web command {} accepted, mode {}", path, mode);
            Ok(mode.to_string())
        }
        Err(e) => {
            debug!("Web command {} rejected: {}", path, e);
            Err(e.to_string())
        }
    };
    publish_ack(client, ack_topic, path, verdict).await;
}

async fn publish_ack(
    client: &AsyncClient,
    ack_topic: &str,
    path: &str,
    verdict: Result<String, String>,
) {
    let body = match &verdict {
        Ok(mode) => json!({ "command": path, "accepted": true, "mode": mode }),
        Err(reason) => json!({ "command": path, "accepted": false, "error": reason }),
    };
    if let Err(e) = client
        .publish(ack_topic, QoS::AtMostOnce, false, body.to_string())
        .await
    {
        debug!("Ack publish failed: {}", e);
    }
}
