//! Stateful bed-occupancy simulator for local development.
//!
//! Models realistic pressure-mat behaviour:
//! - Long coherent occupied/vacant episodes rather than white noise
//! - Momentary flickers while occupied (rolling over lifts the mat)
//! - Occasional contact bounce while vacant (pets, bedding settling)
//! - A "gets up after a while" scenario for exercising the alarm path

use std::fmt;

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Solid occupancy with rare flickers.  The default; keeps an armed
    /// alarm ringing.
    Asleep,
    /// Frequent toss-and-turn flickers.  Tests window smoothing and the
    /// hysteresis band.
    Restless,
    /// Nobody in bed; occasional contact bounce.  Tests that an armed
    /// alarm stays silent.
    Empty,
    /// Occupied at start, gets up for good after ~2 minutes of samples.
    /// Tests the presence-driven stop.
    Waking,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "restless" => Self::Restless,
            "empty" => Self::Empty,
            "waking" => Self::Waking,
            _ => Self::Asleep, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asleep => write!(f, "asleep"),
            Self::Restless => write!(f, "restless"),
            Self::Empty => write!(f, "empty"),
            Self::Waking => write!(f, "waking"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Produces raw mat line levels (low = occupied, mirroring the real
/// sensor's pull-down wiring).
pub struct BedOccupancySim {
    occupied: bool,
    /// Chance per sample of a momentary inverted reading.
    flicker_prob: f32,
    /// Samples until the sleeper leaves for good (Waking scenario).
    leave_after: Option<u32>,
    samples: u32,
}

impl BedOccupancySim {
    pub fn new(scenario: Scenario) -> Self {
        let (occupied, flicker_prob, leave_after) = match scenario {
            Scenario::Asleep => (true, 0.02, None),
            Scenario::Restless => (true, 0.20, None),
            Scenario::Empty => (false, 0.01, None),
            Scenario::Waking => (true, 0.05, Some(240)),
        };
        Self {
            occupied,
            flicker_prob,
            leave_after,
            samples: 0,
        }
    }

    /// Next raw line level: `false` (low) while the mat is pressed.
    pub fn sample(&mut self) -> bool {
        self.samples += 1;

        if let Some(leave) = self.leave_after {
            if self.samples >= leave {
                self.occupied = false;
            }
        }

        let mut occupied = self.occupied;
        if fastrand::f32() < self.flicker_prob {
            occupied = !occupied;
        }

        !occupied
    }
}

// ===========================================================================
// Tests
// ===========================================================================
