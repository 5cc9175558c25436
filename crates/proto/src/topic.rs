//! MQTT topic names used by the hub and the node.

/// Hub → node: alarm commands and settings patches.
pub const COMMAND: &str = "iot_alarm/command";

/// Node → hub: bed sensor telemetry.
pub const SENSOR: &str = "iot_alarm/sensor_data";

/// Hub → node: weather tag accompanying a schedule trigger.
pub const WEATHER: &str = "iot_alarm/weather";

/// Node → hub: request-response latency measurements.
pub const DELAY: &str = "iot_alarm/delay";
