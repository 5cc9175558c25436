//! Alarm effect sink: sound/light triggering. The `gpio` feature gates
//! the real rppal pins (LED + sounder trigger line); without it, a mock
//! implementation tracks state and logs.
//!
//! Only the triggering contract matters here — start, stop, escalate,
//! volume. What the sounder module does with its trigger line is its
//! own business.

use anyhow::Result;
use tracing::info;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real ringer (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct Ringer {
    led: OutputPin,
    sounder: OutputPin,
    volume: u8,
    escalated: bool,
}

#[cfg(feature = "gpio")]
impl Ringer {
    pub(crate) fn new(led_pin: u8, sounder_pin: u8, volume: u8) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut led = gpio.get(led_pin)?.into_output();
        let mut sounder = gpio.get(sounder_pin)?.into_output();

        // Fail-safe: silent at startup.
        led.set_low();
        sounder.set_low();

        Ok(Self {
            led,
            sounder,
            volume,
            escalated: false,
        })
    }

    pub(crate) fn start(&mut self) {
        self.led.set_high();
        self.sounder.set_high();
        info!(volume = self.volume, "alarm started");
    }

    pub(crate) fn stop(&mut self) {
        self.led.set_low();
        self.sounder.set_low();
        self.escalated = false;
        info!("alarm stopped");
    }

    pub(crate) fn escalate(&mut self) {
        self.escalated = true;
        // The sounder module switches to its second track on a re-trigger.
        self.sounder.set_low();
        self.sounder.set_high();
        info!(volume = self.volume, "alarm escalated");
    }

    pub(crate) fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        info!(volume, "ringer volume updated");
    }
}

// ---------------------------------------------------------------------------
// Mock ringer (development — no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct Ringer {
    pub(crate) ringing: bool,
    pub(crate) escalated: bool,
    pub(crate) volume: u8,
}

#[cfg(not(feature = "gpio"))]
impl Ringer {
    pub(crate) fn new(_led_pin: u8, _sounder_pin: u8, volume: u8) -> Result<Self> {
        info!("[mock-ringer] initialised (no hardware)");
        Ok(Self {
            ringing: false,
            escalated: false,
            volume,
        })
    }

    pub(crate) fn start(&mut self) {
        self.ringing = true;
        info!(volume = self.volume, "[mock-ringer] alarm started");
    }

    pub(crate) fn stop(&mut self) {
        self.ringing = false;
        self.escalated = false;
        info!("[mock-ringer] alarm stopped");
    }

    pub(crate) fn escalate(&mut self) {
        self.escalated = true;
        info!(volume = self.volume, "[mock-ringer] alarm escalated");
    }

    pub(crate) fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        info!(volume, "[mock-ringer] volume updated");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
