//! Typed messages crossing the bus, and their boundary decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::SettingsPatch;
use crate::topic;

// ---------------------------------------------------------------------------
// Commands (hub → node)
// ---------------------------------------------------------------------------

/// Control command delivered on the command topic (or, for weather
/// tags, on the weather topic).  Decoded once at the boundary; internal
/// logic matches on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TriggerAlarm,
    StopAlarm,
    SetSamplingRate(f64),
    SetSettings(SettingsPatch),
    WeatherTag(WeatherCondition),
}

/// On-wire shape of `{"command": ..., "value": ...}` payloads.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum WireCommand {
    TriggerAlarm,
    StopAlarm,
    SamplingRate { value: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is neither a command nor a settings patch")]
    UnknownShape,
}

/// Decode a command-topic payload: either a tagged command object or a
/// bare settings patch.
pub fn decode_command(payload: &[u8]) -> Result<Command, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;

    if value.get("command").is_some() {
        let wire: WireCommand = serde_json::from_value(value)?;
        return Ok(match wire {
            WireCommand::TriggerAlarm => Command::TriggerAlarm,
            WireCommand::StopAlarm => Command::StopAlarm,
            WireCommand::SamplingRate { value } => Command::SetSamplingRate(value),
        });
    }

    let patch: SettingsPatch = serde_json::from_value(value)?;
    if patch.is_empty() {
        return Err(DecodeError::UnknownShape);
    }
    Ok(Command::SetSettings(patch))
}

/// Decode a weather-topic payload.
pub fn decode_weather(payload: &[u8]) -> Result<Command, DecodeError> {
    let msg: WeatherMsg = serde_json::from_slice(payload)?;
    Ok(Command::WeatherTag(msg.weather))
}

impl Command {
    /// Topic this command travels on.
    pub fn topic(&self) -> &'static str {
        match self {
            Command::WeatherTag(_) => topic::WEATHER,
            _ => topic::COMMAND,
        }
    }

    /// Wire payload for publishing.
    pub fn to_payload(&self) -> Vec<u8> {
        let value = match self {
            Command::TriggerAlarm => serde_json::to_value(WireCommand::TriggerAlarm),
            Command::StopAlarm => serde_json::to_value(WireCommand::StopAlarm),
            Command::SetSamplingRate(v) => {
                serde_json::to_value(WireCommand::SamplingRate { value: *v })
            }
            Command::SetSettings(patch) => serde_json::to_value(patch),
            Command::WeatherTag(cond) => serde_json::to_value(WeatherMsg { weather: *cond }),
        };
        // Serializing our own derive structs cannot fail.
        serde_json::to_vec(&value.unwrap_or_default()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Sunny,
    PartlyCloudy,
    Cloudy,
    Rainy,
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sunny => write!(f, "sunny"),
            Self::PartlyCloudy => write!(f, "partly cloudy"),
            Self::Cloudy => write!(f, "cloudy"),
            Self::Rainy => write!(f, "rainy"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WeatherMsg {
    weather: WeatherCondition,
}

// ---------------------------------------------------------------------------
// Telemetry (node → hub)
// ---------------------------------------------------------------------------

/// Bed sensor report.  `state` is 1 when the bed is occupied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub sensor_name: String,
    pub sensor_ip: String,
    pub sensor_mac: String,
    pub state: u8,
    pub state_avg: f32,
}

/// Round-trip latency of one request-response telemetry send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayReport {
    /// Milliseconds.
    pub delay: u64,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- decode_command: tagged commands -------------------------------------

    #[test]
    fn decode_trigger_alarm() {
        let cmd = decode_command(br#"{"command":"trigger_alarm"}"#).unwrap();
        assert_eq!(cmd, Command::TriggerAlarm);
    }

    #[test]
    fn decode_stop_alarm() {
        let cmd = decode_command(br#"{"command":"stop_alarm"}"#).unwrap();
        assert_eq!(cmd, Command::StopAlarm);
    }

    #[test]
    fn decode_sampling_rate_with_value() {
        let cmd = decode_command(br#"{"command":"sampling_rate","value":2.5}"#).unwrap();
        assert_eq!(cmd, Command::SetSamplingRate(2.5));
    }

    #[test]
    fn decode_sampling_rate_missing_value_fails() {
        assert!(decode_command(br#"{"command":"sampling_rate"}"#).is_err());
    }

    #[test]
    fn decode_unknown_command_fails() {
        assert!(decode_command(br#"{"command":"self_destruct"}"#).is_err());
    }

    // -- decode_command: settings patch ---------------------------------------

    #[test]
    fn decode_settings_patch() {
        let cmd = decode_command(br#"{"use_mqtt":false,"vol":25}"#).unwrap();
        match cmd {
            Command::SetSettings(p) => {
                assert_eq!(p.use_mqtt, Some(false));
                assert_eq!(p.vol, Some(25));
            }
            other => panic!("expected SetSettings, got {other:?}"),
        }
    }

    #[test]
    fn decode_object_without_known_fields_fails() {
        assert!(decode_command(br#"{"favourite_colour":"green"}"#).is_err());
    }

    #[test]
    fn decode_invalid_json_fails() {
        assert!(decode_command(b"not json at all").is_err());
    }

    #[test]
    fn decode_truncated_json_fails() {
        assert!(decode_command(br#"{"command":"trig"#).is_err());
    }

    // -- decode_weather -------------------------------------------------------

    #[test]
    fn decode_weather_tag() {
        let cmd = decode_weather(br#"{"weather":"rainy"}"#).unwrap();
        assert_eq!(cmd, Command::WeatherTag(WeatherCondition::Rainy));
    }

    #[test]
    fn decode_weather_partly_cloudy() {
        let cmd = decode_weather(br#"{"weather":"partly_cloudy"}"#).unwrap();
        assert_eq!(cmd, Command::WeatherTag(WeatherCondition::PartlyCloudy));
    }

    #[test]
    fn decode_weather_unknown_condition_fails() {
        assert!(decode_weather(br#"{"weather":"meteor_shower"}"#).is_err());
    }

    // -- round trips ----------------------------------------------------------

    #[test]
    fn command_payload_round_trips() {
        for cmd in [
            Command::TriggerAlarm,
            Command::StopAlarm,
            Command::SetSamplingRate(1.5),
        ] {
            let decoded = decode_command(&cmd.to_payload()).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn weather_payload_round_trips() {
        let cmd = Command::WeatherTag(WeatherCondition::Sunny);
        assert_eq!(cmd.topic(), topic::WEATHER);
        let decoded = decode_weather(&cmd.to_payload()).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn trigger_topic_is_command_topic() {
        assert_eq!(Command::TriggerAlarm.topic(), topic::COMMAND);
    }

    // -- telemetry wire format -------------------------------------------------

    #[test]
    fn sensor_report_serializes_expected_fields() {
        let r = SensorReport {
            sensor_name: "bed-mat".into(),
            sensor_ip: "192.168.1.42".into(),
            sensor_mac: "aa:bb:cc:dd:ee:ff".into(),
            state: 1,
            state_avg: 0.8,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["sensor_name"], "bed-mat");
        assert_eq!(json["state"], 1);
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn sensor_report_missing_field_fails_to_decode() {
        let json = r#"{"sensor_name":"bed-mat","state":1}"#;
        assert!(serde_json::from_str::<SensorReport>(json).is_err());
    }

    #[test]
    fn delay_report_round_trips() {
        let d = DelayReport { delay: 137 };
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"delay":137}"#);
        let back: DelayReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
