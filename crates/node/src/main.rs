mod alarm;
mod discovery;
mod mat;
mod presence;
mod ringer;
#[cfg(feature = "sim")]
mod sim;
mod transport;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, time::Duration};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use alarm::{AlarmRuntime, Effect};
use presence::PresenceDetector;
use ringer::Ringer;
use transport::TransportPublisher;
use wakemat_proto::{decode_command, decode_weather, topic, Command, NodeSettings, SensorReport};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Address of the interface that routes outward; the UDP connect never
/// sends a packet, it just binds the route.
fn local_ip() -> Option<String> {
    let sock = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    sock.connect("8.8.8.8:80").ok()?;
    Some(sock.local_addr().ok()?.ip().to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let discovery_port: u16 = env_parse("DISCOVERY_PORT", 8266);
    let mqtt_port: u16 = env_parse("MQTT_PORT", 1883);
    let hub_http_port: u16 = env_parse("HUB_HTTP_PORT", 8080);
    let node_name = env::var("NODE_NAME").unwrap_or_else(|_| "bed-mat".to_string());
    let node_mac = env::var("NODE_MAC").unwrap_or_else(|_| "00:00:00:00:00:00".to_string());

    // ── Broker discovery (one-shot, before anything else) ───────────
    let broker = discovery::wait_for_broker(discovery_port).await?;
    let node_ip = local_ip().unwrap_or_else(|| "0.0.0.0".to_string());

    // ── Hardware ────────────────────────────────────────────────────
    let mut settings = NodeSettings::default();

    #[cfg(feature = "gpio")]
    let mut sensor = mat::MatSensor::new(env_parse("MAT_PIN", 18))?;
    #[cfg(not(feature = "gpio"))]
    let mut sensor = {
        let scenario = env::var("SIM_SCENARIO").unwrap_or_default();
        mat::MatSensor::new(sim::Scenario::from_str_lossy(&scenario))?
    };

    let mut ringer = Ringer::new(
        env_parse("LED_PIN", 2),
        env_parse("SOUNDER_PIN", 4),
        settings.volume,
    )?;

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = format!("wakemat-node-{node_name}");
    let mut mqttoptions = MqttOptions::new(client_id, &broker, mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
    client.subscribe(topic::COMMAND, QoS::AtLeastOnce).await?;
    client.subscribe(topic::WEATHER, QoS::AtLeastOnce).await?;

    // Inbound commands land in a bounded channel and are drained once
    // per tick, so command application and state transitions within a
    // tick never interleave.
    let (tx, mut rx) = mpsc::channel::<Command>(32);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    let decoded = match p.topic.as_str() {
                        topic::COMMAND => decode_command(&p.payload),
                        topic::WEATHER => decode_weather(&p.payload),
                        other => {
                            warn!(topic = other, "unhandled topic");
                            continue;
                        }
                    };
                    match decoded {
                        Ok(cmd) => {
                            if tx.try_send(cmd).is_err() {
                                warn!("command channel full, dropping command");
                            }
                        }
                        // Malformed payloads are dropped, never retried.
                        Err(e) => warn!(topic = %p.topic, "dropping payload: {e}"),
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("node connected to mqtt");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. retrying...");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let publisher = TransportPublisher::new(
        client.clone(),
        format!("http://{broker}:{hub_http_port}/sensor_data"),
    );

    // ── Tick loop ───────────────────────────────────────────────────
    let mut detector = PresenceDetector::new(settings.window_size);
    let mut runtime = AlarmRuntime::new();

    let mut tick_interval = settings.tick_interval;
    let mut ticker = tokio::time::interval(tick_interval);
    let mut last_publish: Option<Instant> = None;

    info!(
        node = %node_name,
        ip = %node_ip,
        broker = %broker,
        tick = ?tick_interval,
        "node started"
    );

    loop {
        ticker.tick().await;

        // 1. Commands first, so this tick's transition sees them.
        while let Ok(cmd) = rx.try_recv() {
            apply_command(cmd, &mut settings, &mut runtime, &mut detector, &mut ringer);
        }
        if settings.tick_interval != tick_interval {
            tick_interval = settings.tick_interval;
            ticker = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
            info!(tick = ?tick_interval, "tick interval updated");
        }

        // 2. Presence.
        let raw = sensor.read();
        let avg = detector.observe(raw);

        // 3. Alarm transition.
        let now = Instant::now();
        for effect in runtime.tick(avg, now.into_std(), &settings) {
            match effect {
                Effect::Begin => ringer.start(),
                Effect::Stop => ringer.stop(),
                Effect::Escalate => ringer.escalate(),
            }
        }

        // 4. Telemetry, rate-limited by the sampling rate.
        let due = last_publish.map_or(true, |t| now.duration_since(t) >= settings.sampling_rate);
        if due {
            last_publish = Some(now);
            let report = SensorReport {
                sensor_name: node_name.clone(),
                sensor_ip: node_ip.clone(),
                sensor_mac: node_mac.clone(),
                state: u8::from(!raw),
                state_avg: avg,
            };
            if let Err(e) = publisher.send(&report, &settings).await {
                // Best effort; the next due tick retries on its own.
                warn!("telemetry send failed: {e:#}");
            }
        }
    }
}

/// Apply one inbound command to the node state.  Runs before presence
/// evaluation within the tick that drained it.
fn apply_command(
    cmd: Command,
    settings: &mut NodeSettings,
    runtime: &mut AlarmRuntime,
    detector: &mut PresenceDetector,
    ringer: &mut Ringer,
) {
    match cmd {
        Command::TriggerAlarm => {
            info!("alarm armed by hub");
            runtime.arm();
        }
        Command::StopAlarm => {
            info!("alarm stopped by hub");
            if runtime.force_stop() {
                ringer.stop();
            }
        }
        Command::SetSamplingRate(value) => {
            if settings.set_sampling_rate(value) {
                warn!(value, "sampling rate out of range, clamped");
            }
            info!(rate = ?settings.sampling_rate, "sampling rate updated");
        }
        Command::SetSettings(patch) => {
            let clamped = settings.apply(&patch);
            if !clamped.is_empty() {
                warn!(?clamped, "settings values out of range, clamped");
            }
            detector.set_capacity(settings.window_size);
            ringer.set_volume(settings.volume);
            info!(?settings, "settings updated");
        }
        Command::WeatherTag(condition) => {
            // Display-only on this hardware; worth a log line.
            info!(weather = %condition, "weather tag received");
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wakemat_proto::SettingsPatch;

    fn fixtures() -> (NodeSettings, AlarmRuntime, PresenceDetector, Ringer) {
        (
            NodeSettings::default(),
            AlarmRuntime::new(),
            PresenceDetector::new(10),
            Ringer::new(2, 4, 20).unwrap(),
        )
    }

    #[test]
    fn trigger_command_arms_the_runtime() {
        let (mut s, mut rt, mut d, mut r) = fixtures();
        apply_command(Command::TriggerAlarm, &mut s, &mut rt, &mut d, &mut r);
        assert!(rt.armed);
    }

    #[test]
    fn stop_command_silences_an_active_ring() {
        let (mut s, mut rt, mut d, mut r) = fixtures();
        rt.arm();
        rt.tick(1.0, std::time::Instant::now(), &s);
        r.start();

        apply_command(Command::StopAlarm, &mut s, &mut rt, &mut d, &mut r);
        assert!(!rt.armed);
        assert!(!rt.is_ringing);
        assert!(!r.ringing);
    }

    #[test]
    fn settings_command_resizes_the_window_and_volume() {
        let (mut s, mut rt, mut d, mut r) = fixtures();
        let patch = SettingsPatch {
            w_size: Some(3),
            vol: Some(7),
            ..Default::default()
        };
        apply_command(Command::SetSettings(patch), &mut s, &mut rt, &mut d, &mut r);
        assert_eq!(d.capacity(), 3);
        assert_eq!(r.volume, 7);
    }

    #[test]
    fn sampling_rate_command_updates_settings() {
        let (mut s, mut rt, mut d, mut r) = fixtures();
        apply_command(
            Command::SetSamplingRate(2.0),
            &mut s,
            &mut rt,
            &mut d,
            &mut r,
        );
        assert_eq!(s.sampling_rate, Duration::from_secs(2));
    }

    #[test]
    fn weather_tag_is_inert() {
        let (mut s, mut rt, mut d, mut r) = fixtures();
        let before = s.clone();
        apply_command(
            Command::WeatherTag(wakemat_proto::WeatherCondition::Rainy),
            &mut s,
            &mut rt,
            &mut d,
            &mut r,
        );
        assert_eq!(s, before);
        assert!(!rt.armed);
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("WAKEMAT_TEST_PORT", "not-a-number");
        assert_eq!(env_parse("WAKEMAT_TEST_PORT", 8266_u16), 8266);
        std::env::remove_var("WAKEMAT_TEST_PORT");
    }
}
