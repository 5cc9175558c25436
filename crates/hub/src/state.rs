use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use wakemat_proto::SensorReport;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    /// Whether a trigger has been sent and not yet stopped.
    pub alarm_triggered: bool,
    pub sensor: Option<SensorSnapshot>,
    pub delay: DelayStats,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SensorSnapshot {
    #[serde(flatten)]
    pub report: SensorReport,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

/// Cumulative average of delay reports received over the bus.
#[derive(Clone, Copy, Default, Serialize)]
pub struct DelayStats {
    pub count: u64,
    pub average_ms: f64,
}

impl DelayStats {
    pub fn record(&mut self, delay_ms: u64) {
        self.count += 1;
        self.average_ms =
            (self.average_ms * (self.count - 1) as f64 + delay_ms as f64) / self.count as f64;
    }
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sensor,
    Alarm,
    Scheduler,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub alarm_triggered: bool,
    pub sensor: Option<SensorSnapshot>,
    pub delay: DelayStats,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            alarm_triggered: false,
            sensor: None,
            delay: DelayStats::default(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a telemetry report from the node.
    pub fn record_sensor(&mut self, report: SensorReport) {
        let detail = format!(
            "{}: state={} avg={:.2}",
            report.sensor_name, report.state, report.state_avg
        );
        self.sensor = Some(SensorSnapshot {
            report,
            last_seen: OffsetDateTime::now_utc(),
        });
        self.push_event(EventKind::Sensor, detail);
    }

    /// Record a delay report, updating the cumulative average.
    pub fn record_delay(&mut self, delay_ms: u64) {
        self.delay.record(delay_ms);
        self.push_event(
            EventKind::Sensor,
            format!("delay {delay_ms}ms (avg {:.1}ms)", self.delay.average_ms),
        );
    }

    /// Record an alarm trigger/stop.
    pub fn record_alarm(&mut self, detail: String) {
        self.push_event(EventKind::Alarm, detail);
    }

    /// Record a scheduler decision.
    pub fn record_scheduler(&mut self, detail: String) {
        self.push_event(EventKind::Scheduler, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            alarm_triggered: self.alarm_triggered,
            sensor: self.sensor.clone(),
            delay: self.delay,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn report(avg: f32) -> SensorReport {
        SensorReport {
            sensor_name: "bed-mat".into(),
            sensor_ip: "192.168.1.42".into(),
            sensor_mac: "aa:bb:cc:dd:ee:ff".into(),
            state: 1,
            state_avg: avg,
        }
    }

    // -- DelayStats ----------------------------------------------------------

    #[test]
    fn delay_average_of_single_value_is_that_value() {
        let mut d = DelayStats::default();
        d.record(100);
        assert_eq!(d.count, 1);
        assert!((d.average_ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn delay_average_is_cumulative() {
        let mut d = DelayStats::default();
        d.record(100);
        d.record(200);
        d.record(300);
        assert_eq!(d.count, 3);
        assert!((d.average_ms - 200.0).abs() < 1e-9);
    }

    // -- SystemState ----------------------------------------------------------

    #[test]
    fn record_sensor_updates_snapshot_and_events() {
        let mut st = SystemState::new();
        st.record_sensor(report(0.8));
        assert!(st.sensor.is_some());
        assert_eq!(st.events.len(), 1);
        assert!(st.events[0].detail.contains("bed-mat"));
    }

    #[test]
    fn event_ring_is_bounded() {
        let mut st = SystemState::new();
        for i in 0..(MAX_EVENTS + 50) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        // Oldest events were evicted.
        assert_eq!(st.events[0].detail, "event 50");
    }

    #[test]
    fn status_reports_events_newest_first() {
        let mut st = SystemState::new();
        st.record_system("first".into());
        st.record_system("second".into());
        let status = st.to_status();
        assert_eq!(status.events[0].detail, "second");
        assert_eq!(status.events[1].detail, "first");
    }

    #[test]
    fn status_carries_delay_stats() {
        let mut st = SystemState::new();
        st.record_delay(40);
        st.record_delay(60);
        let status = st.to_status();
        assert_eq!(status.delay.count, 2);
        assert!((status.delay.average_ms - 50.0).abs() < 1e-9);
    }
}
