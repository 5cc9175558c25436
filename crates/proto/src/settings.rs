//! Node runtime settings and the wire patch that mutates them.
//!
//! Out-of-range values coming over the wire are clamped to the nearest
//! bound rather than rejected; `apply` reports which fields were
//! adjusted so the caller can log them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// Clamp bounds for wire-mutable knobs.
const SAMPLING_RATE_SECS: (f64, f64) = (0.1, 3600.0);
const TICK_SECS: (f64, f64) = (0.05, 60.0);
const WINDOW_SIZE: (i64, i64) = (1, 600);
const VOLUME: (i64, i64) = (0, 30);
const ESCALATION_MS: (i64, i64) = (1_000, 600_000);

/// How telemetry leaves the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Publish on the sensor topic, fire-and-forget.
    Bus,
    /// POST to the hub's telemetry endpoint and measure the round trip.
    RequestResponse,
}

/// Runtime-tunable node behaviour, mutated only by inbound settings
/// commands and read by every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub mode: TransportMode,
    /// Request-response calls run on a spawned task instead of blocking
    /// the tick loop.
    pub async_delivery: bool,
    /// Escalate a sustained ring to the secondary response.
    pub angry_mode: bool,
    /// Publish a delay report after each measured request-response send.
    pub report_latency: bool,
    /// Minimum interval between telemetry publishes.
    pub sampling_rate: Duration,
    /// Tick loop period.
    pub tick_interval: Duration,
    /// Presence sliding-window capacity.
    pub window_size: usize,
    /// Ringer volume, 0..=30.
    pub volume: u8,
    /// Ringing duration before escalation.
    pub escalation_timeout: Duration,
    /// Presence average above which an armed alarm starts ringing; the
    /// ring stops below `1.0 - start_thresh`.
    pub start_thresh: f32,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            mode: TransportMode::Bus,
            async_delivery: false,
            angry_mode: false,
            report_latency: false,
            sampling_rate: Duration::from_secs(1),
            tick_interval: Duration::from_millis(500),
            window_size: 10,
            volume: 20,
            escalation_timeout: Duration::from_millis(30_000),
            start_thresh: 0.7,
        }
    }
}

/// Partial settings object as sent on the command topic.  Field names
/// match the wire format; signed/float types let out-of-range values
/// reach `apply` where they are clamped instead of failing to decode.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_mqtt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_async_http: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angry_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_latency: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_timeout: Option<i64>,
}

impl SettingsPatch {
    /// True when no recognized field is present.
    pub fn is_empty(&self) -> bool {
        self.use_mqtt.is_none()
            && self.use_async_http.is_none()
            && self.angry_mode.is_none()
            && self.report_latency.is_none()
            && self.sampling_rate.is_none()
            && self.w_size.is_none()
            && self.vol.is_none()
            && self.tick.is_none()
            && self.escalation_timeout.is_none()
    }
}

fn clamp_f64(v: f64, (lo, hi): (f64, f64)) -> (f64, bool) {
    if !v.is_finite() {
        return (lo, true);
    }
    let c = v.clamp(lo, hi);
    (c, c != v)
}

fn clamp_i64(v: i64, (lo, hi): (i64, i64)) -> (i64, bool) {
    let c = v.clamp(lo, hi);
    (c, c != v)
}

impl NodeSettings {
    /// Apply a wire patch, clamping out-of-range values.  Returns the
    /// names of fields that had to be clamped.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Vec<&'static str> {
        let mut clamped = Vec::new();

        if let Some(v) = patch.use_mqtt {
            self.mode = if v {
                TransportMode::Bus
            } else {
                TransportMode::RequestResponse
            };
        }
        if let Some(v) = patch.use_async_http {
            self.async_delivery = v;
        }
        if let Some(v) = patch.angry_mode {
            self.angry_mode = v;
        }
        if let Some(v) = patch.report_latency {
            self.report_latency = v;
        }
        if let Some(v) = patch.sampling_rate {
            if self.set_sampling_rate(v) {
                clamped.push("sampling_rate");
            }
        }
        if let Some(v) = patch.w_size {
            let (c, was) = clamp_i64(v, WINDOW_SIZE);
            if was {
                clamped.push("w_size");
            }
            self.window_size = c as usize;
        }
        if let Some(v) = patch.vol {
            let (c, was) = clamp_i64(v, VOLUME);
            if was {
                clamped.push("vol");
            }
            self.volume = c as u8;
        }
        if let Some(v) = patch.tick {
            let (c, was) = clamp_f64(v, TICK_SECS);
            if was {
                clamped.push("tick");
            }
            self.tick_interval = Duration::from_secs_f64(c);
        }
        if let Some(v) = patch.escalation_timeout {
            let (c, was) = clamp_i64(v, ESCALATION_MS);
            if was {
                clamped.push("escalation_timeout");
            }
            self.escalation_timeout = Duration::from_millis(c as u64);
        }

        clamped
    }

    /// Set the telemetry publish interval, clamping to bounds.  Returns
    /// true when the value had to be clamped.
    pub fn set_sampling_rate(&mut self, secs: f64) -> bool {
        let (c, was) = clamp_f64(secs, SAMPLING_RATE_SECS);
        self.sampling_rate = Duration::from_secs_f64(c);
        was
    }
}

// ===========================================================================
// Tests
// ===========================================================================
