mod config;
mod discovery;
mod mqtt;
mod scheduler;
mod state;
mod store;
mod weather;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use mqtt::Inbound;
use state::{SharedState, SystemState};
use store::{AlarmStore, SharedStore};
use wakemat_proto::topic;
use weather::WeatherService;
use web::AppState;

/// Address of the interface that routes outward; the UDP connect never
/// sends a packet, it just binds the route.
fn local_ip() -> Option<String> {
    let sock = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    sock.connect("8.8.8.8:80").ok()?;
    Some(sock.local_addr().ok()?.ip().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker_host = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let broker_port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let alarm_file = env::var("ALARM_FILE").unwrap_or_else(|_| "alarms.json".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    let cfg = config::load(&config_path)?;

    // ── Alarm store ─────────────────────────────────────────────────
    let store: SharedStore = Arc::new(RwLock::new(AlarmStore::load(&alarm_file)));
    {
        let st = store.read().await;
        info!(alarms = st.list().len(), file = %alarm_file, "alarm store ready");
    }

    // ── Shared state (ephemeral, for the control plane) ─────────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new()));
    {
        let mut st = shared.write().await;
        st.record_system("hub started".to_string());
    }

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("wakemat-hub", &broker_host, broker_port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);
    client.subscribe(topic::SENSOR, QoS::AtLeastOnce).await?;
    client.subscribe(topic::DELAY, QoS::AtLeastOnce).await?;
    info!(
        sensor = topic::SENSOR,
        delay = topic::DELAY,
        "hub subscribed"
    );

    // ── Control plane ───────────────────────────────────────────────
    let web_state = AppState {
        shared: Arc::clone(&shared),
        store: Arc::clone(&store),
        mqtt: client.clone(),
    };
    tokio::spawn(web::serve(web_state, cfg.hub.web_port));

    // ── Broker discovery announcement ───────────────────────────────
    // The node reaches both the broker and the telemetry endpoint at
    // this address; by default that is our own outward-facing IP, like
    // the co-located broker deployment assumes.
    let announce_addr = env::var("ANNOUNCE_HOST")
        .ok()
        .or_else(local_ip)
        .unwrap_or_else(|| broker_host.clone());
    let node_addr = format!("{}:{}", cfg.node.host, cfg.node.discovery_port);
    tokio::spawn(discovery::announce_broker(node_addr, announce_addr));

    // ── Schedule evaluator ──────────────────────────────────────────
    let weather_service = cfg
        .weather
        .enabled
        .then(|| WeatherService::new(cfg.weather.latitude, cfg.weather.longitude));
    tokio::spawn(scheduler::run(
        Arc::clone(&store),
        Arc::clone(&shared),
        client.clone(),
        weather_service,
        Duration::from_secs(cfg.hub.poll_interval_sec),
    ));

    // ── MQTT ingest loop ────────────────────────────────────────────
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                match mqtt::decode_inbound(&p.topic, &p.payload) {
                    Ok(Some(Inbound::Sensor(report))) => {
                        debug!(
                            sensor = %report.sensor_name,
                            state = report.state,
                            avg = report.state_avg,
                            "telemetry"
                        );
                        let mut st = shared.write().await;
                        st.record_sensor(report);
                    }
                    Ok(Some(Inbound::Delay(report))) => {
                        let mut st = shared.write().await;
                        st.record_delay(report.delay);
                        debug!(
                            delay_ms = report.delay,
                            avg_ms = st.delay.average_ms,
                            "delay report"
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(topic = %p.topic, "bad payload: {e}");
                        let mut st = shared.write().await;
                        st.record_error(format!("bad payload on {}: {e}", p.topic));
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
