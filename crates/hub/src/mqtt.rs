//! Inbound MQTT payload routing and decoding for the hub.

use wakemat_proto::{topic, DelayReport, SensorReport};

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Sensor(SensorReport),
    Delay(DelayReport),
}

/// Route and decode a publish received from the bus.  `Ok(None)` means
/// the topic is not ours; a decode failure on a known topic is an
/// error the caller logs and drops.
pub(crate) fn decode_inbound(
    topic: &str,
    payload: &[u8],
) -> Result<Option<Inbound>, serde_json::Error> {
    match topic {
        topic::SENSOR => Ok(Some(Inbound::Sensor(serde_json::from_slice(payload)?))),
        topic::DELAY => Ok(Some(Inbound::Delay(serde_json::from_slice(payload)?))),
        _ => Ok(None),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR_JSON: &str = r#"{"sensor_name":"bed-mat","sensor_ip":"192.168.1.42",
        "sensor_mac":"aa:bb:cc:dd:ee:ff","state":1,"state_avg":0.9}"#;

    // -- routing -------------------------------------------------------------

    #[test]
    fn sensor_topic_decodes_to_sensor_report() {
        let inbound = decode_inbound(topic::SENSOR, SENSOR_JSON.as_bytes()).unwrap();
        match inbound {
            Some(Inbound::Sensor(r)) => {
                assert_eq!(r.sensor_name, "bed-mat");
                assert_eq!(r.state, 1);
            }
            other => panic!("expected sensor report, got {other:?}"),
        }
    }

    #[test]
    fn delay_topic_decodes_to_delay_report() {
        let inbound = decode_inbound(topic::DELAY, br#"{"delay":42}"#).unwrap();
        assert_eq!(inbound, Some(Inbound::Delay(DelayReport { delay: 42 })));
    }

    #[test]
    fn foreign_topic_is_ignored() {
        let inbound = decode_inbound("some/other/topic", b"whatever").unwrap();
        assert_eq!(inbound, None);
    }

    // -- malformed payloads ---------------------------------------------------

    #[test]
    fn invalid_json_on_sensor_topic_is_an_error() {
        assert!(decode_inbound(topic::SENSOR, b"not json").is_err());
    }

    #[test]
    fn missing_fields_on_sensor_topic_is_an_error() {
        assert!(decode_inbound(topic::SENSOR, br#"{"sensor_name":"x"}"#).is_err());
    }

    #[test]
    fn missing_delay_field_is_an_error() {
        assert!(decode_inbound(topic::DELAY, br#"{"latency":42}"#).is_err());
    }

    #[test]
    fn negative_delay_is_an_error() {
        // Delay is a non-negative millisecond count by type.
        assert!(decode_inbound(topic::DELAY, br#"{"delay":-5}"#).is_err());
    }
}
