//! Shared wire and domain model for the wakemat hub and node.
//!
//! Everything that crosses the MQTT bus or the request-response endpoint
//! is defined here once, so both sides decode payloads into the same
//! typed messages at the boundary and never match on raw strings
//! internally.

pub mod alarm;
pub mod message;
pub mod settings;
pub mod topic;

pub use alarm::{parse_hhmm, validate_fields, Alarm, ValidateError};
pub use message::{
    decode_command, decode_weather, Command, DecodeError, DelayReport, SensorReport,
    WeatherCondition,
};
pub use settings::{NodeSettings, SettingsPatch, TransportMode};
