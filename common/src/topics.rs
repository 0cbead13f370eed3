pub const TOPIC_SENSOR_TEMP: &str = "relaystat/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "relaystat/sensor/humidity";
