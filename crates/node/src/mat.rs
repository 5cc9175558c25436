//! Pressure-mat input. The `gpio` feature gates the real rppal pin;
//! without it, the stateful simulator supplies raw line levels.
//!
//! The mat pulls the line low when pressed, so `read` returns the
//! electrical level, not the occupancy — inversion happens in the
//! presence detector.

use anyhow::Result;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, InputPin};

// ---------------------------------------------------------------------------
// Real mat sensor (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct MatSensor {
    pin: InputPin,
}

#[cfg(feature = "gpio")]
impl MatSensor {
    pub(crate) fn new(pin_num: u8) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pin = gpio.get(pin_num)?.into_input_pullup();
        Ok(Self { pin })
    }

    /// Raw line level: low (false) = occupied.
    pub(crate) fn read(&mut self) -> bool {
        self.pin.is_high()
    }
}

// ---------------------------------------------------------------------------
// Simulated mat sensor (development — no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct MatSensor {
    sim: crate::sim::BedOccupancySim,
}

#[cfg(not(feature = "gpio"))]
impl MatSensor {
    pub(crate) fn new(scenario: crate::sim::Scenario) -> Result<Self> {
        tracing::info!(%scenario, "mat sensor simulated (no hardware)");
        Ok(Self {
            sim: crate::sim::BedOccupancySim::new(scenario),
        })
    }

    /// Raw line level: low (false) = occupied.
    pub(crate) fn read(&mut self) -> bool {
        self.sim.sample()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::sim::Scenario;

    #[test]
    fn simulated_mat_reads_low_while_asleep() {
        let mut mat = MatSensor::new(Scenario::Asleep).unwrap();
        let lows = (0..100).filter(|_| !mat.read()).count();
        assert!(lows > 80, "expected mostly-low line, got {lows}/100");
    }

    #[test]
    fn simulated_mat_reads_high_while_empty() {
        let mut mat = MatSensor::new(Scenario::Empty).unwrap();
        let highs = (0..100).filter(|_| mat.read()).count();
        assert!(highs > 80, "expected mostly-high line, got {highs}/100");
    }
}
