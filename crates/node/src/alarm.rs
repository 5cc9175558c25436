//! Alarm state machine: Idle → Ringing → Escalated.
//!
//! ```text
//! Idle ──[armed && avg > start_thresh]──▶ Ringing
//!  ▲                                        │
//!  │◀──[avg < 1 - start_thresh]─────────────┤
//!  │                                        ▼
//!  └◀──[avg < 1 - start_thresh]──────── Escalated
//!            (angry_mode && ringing > escalation_timeout)
//! ```
//!
//! The asymmetric thresholds form a hysteresis band: once ringing, the
//! presence average must fall below `1 - start_thresh`, not merely
//! below `start_thresh`, before the ring stops.  The stop check runs
//! before the escalation check on every tick so a vacated bed never
//! escalates.

use std::time::Instant;

use tracing::info;
use wakemat_proto::NodeSettings;

/// Hardware-facing side effects requested by a transition.  Each is
/// produced at most once per episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Begin the alarm sound/light.
    Begin,
    /// Stop the alarm sound/light.
    Stop,
    /// Trigger the secondary, more intense response.
    Escalate,
}

/// Mutable alarm state, owned by the tick loop and mutated only by
/// `tick`, `arm` and `force_stop`.
#[derive(Debug, Default)]
pub struct AlarmRuntime {
    /// Set by `TriggerAlarm`, cleared by `StopAlarm` and by a
    /// presence-driven stop (no auto-retrigger until re-armed).
    pub armed: bool,
    pub is_ringing: bool,
    pub is_escalated: bool,
    pub started_at: Option<Instant>,
}

impl AlarmRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the alarm (`TriggerAlarm`).  The ring itself starts on the
    /// next tick in which presence exceeds the start threshold.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// `StopAlarm`: force any state to Idle in one step.  Returns true
    /// when a ring was actually in progress and the sound must stop.
    pub fn force_stop(&mut self) -> bool {
        let was_ringing = self.is_ringing;
        self.armed = false;
        self.is_ringing = false;
        self.is_escalated = false;
        self.started_at = None;
        was_ringing
    }

    /// One transition step.  `now` is injected so tests can advance
    /// simulated time.
    pub fn tick(&mut self, avg: f32, now: Instant, settings: &NodeSettings) -> Vec<Effect> {
        let stop_thresh = 1.0 - settings.start_thresh;

        // Stop-by-hysteresis first: a vacated bed must never escalate.
        if self.is_ringing {
            if avg < stop_thresh {
                info!(avg, "bed vacated, stopping alarm");
                self.is_ringing = false;
                self.is_escalated = false;
                self.started_at = None;
                // Stopping via presence also disarms; the schedule has
                // to trigger again explicitly for another ring.
                self.armed = false;
                return vec![Effect::Stop];
            }

            if settings.angry_mode && !self.is_escalated {
                let ringing_for = self
                    .started_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or_default();
                if ringing_for > settings.escalation_timeout {
                    info!(?ringing_for, "still in bed, escalating");
                    self.is_escalated = true;
                    return vec![Effect::Escalate];
                }
            }

            return Vec::new();
        }

        if self.armed && avg > settings.start_thresh {
            info!(avg, "presence confirmed, starting alarm");
            self.is_ringing = true;
            self.started_at = Some(now);
            return vec![Effect::Begin];
        }

        Vec::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
