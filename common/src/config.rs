use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    schedule::{normalize_program, Interval},
    sensor::DEFAULT_ERROR_TOLERANCE,
    thermostat::{Hysteresis, DEFAULT_HYSTERESIS_NEG, DEFAULT_HYSTERESIS_POS},
    time::parse_timezone,
    validator::Validator,
};

pub const DEFAULT_RELAY_URL: &str = "https://dweet.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SensorConfig {
    Relay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thing: Option<String>,
    },
    Mqtt {
        host: String,
        #[serde(default = "default_mqtt_port")]
        port: u16,
        #[serde(default)]
        user: String,
        #[serde(default)]
        pass: String,
    },
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::Relay { thing: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub thingid: String,
    #[serde(default = "default_thingname")]
    pub thingname: String,
    #[serde(default = "default_msg_expiry_s")]
    pub msg_expiry_s: u64,
    #[serde(default = "default_cmd_expiry_s")]
    pub cmd_expiry_s: u64,
    #[serde(default = "default_get_commands_every_s")]
    pub get_commands_every_s: u64,
    #[serde(default = "default_send_status_every_s")]
    pub send_status_every_s: u64,
    pub switch_file: PathBuf,
    #[serde(default)]
    pub watchdog_file: Option<PathBuf>,
    #[serde(default)]
    pub program: Vec<Interval>,
    #[serde(default)]
    pub override_program: Option<Interval>,
    pub password: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
    #[serde(default = "default_evaluate_every_s")]
    pub evaluate_every_s: u64,
    #[serde(default = "default_read_sensors_every_s")]
    pub read_sensors_every_s: u64,
    #[serde(default = "default_hysteresis_pos")]
    pub hysteresis_pos: f64,
    #[serde(default = "default_hysteresis_neg")]
    pub hysteresis_neg: f64,
    #[serde(default = "default_sensor_errors_tolerance")]
    pub sensor_errors_tolerance: u32,
    #[serde(default = "default_sensor_staleness_ms")]
    pub sensor_staleness_ms: u64,
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub thingid: String,
    pub password: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
    #[serde(default = "default_msg_expiry_s")]
    pub msg_expiry_s: u64,
    #[serde(default = "default_poll_status_every_s")]
    pub poll_status_every_s: u64,
    #[serde(default = "default_override_hours")]
    pub override_hours: u32,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
}

impl ControllerConfig {
    pub fn new(
        thingid: impl Into<String>,
        password: impl Into<String>,
        switch_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            thingid: thingid.into(),
            thingname: default_thingname(),
            msg_expiry_s: default_msg_expiry_s(),
            cmd_expiry_s: default_cmd_expiry_s(),
            get_commands_every_s: default_get_commands_every_s(),
            send_status_every_s: default_send_status_every_s(),
            switch_file: switch_file.into(),
            watchdog_file: None,
            program: Vec::new(),
            override_program: None,
            password: password.into(),
            relay_url: default_relay_url(),
            tolerance_ms: default_tolerance_ms(),
            evaluate_every_s: default_evaluate_every_s(),
            read_sensors_every_s: default_read_sensors_every_s(),
            hysteresis_pos: default_hysteresis_pos(),
            hysteresis_neg: default_hysteresis_neg(),
            sensor_errors_tolerance: default_sensor_errors_tolerance(),
            sensor_staleness_ms: default_sensor_staleness_ms(),
            request_timeout_s: default_request_timeout_s(),
            timezone: default_timezone(),
            sensor: SensorConfig::default(),
            last_saved: None,
        }
    }

    pub fn sanitize(&mut self) {
        self.msg_expiry_s = self.msg_expiry_s.max(1);
        self.cmd_expiry_s = self.cmd_expiry_s.max(1);
        self.get_commands_every_s = self.get_commands_every_s.max(1);
        self.send_status_every_s = self.send_status_every_s.max(1);
        self.evaluate_every_s = self.evaluate_every_s.max(1);
        self.read_sensors_every_s = self.read_sensors_every_s.max(1);
        self.sensor_errors_tolerance = self.sensor_errors_tolerance.max(1);
        self.request_timeout_s = self.request_timeout_s.clamp(1, 120);

        if !self.hysteresis_pos.is_finite() || self.hysteresis_pos < 0.0 {
            self.hysteresis_pos = DEFAULT_HYSTERESIS_POS;
        }
        if !self.hysteresis_neg.is_finite() || self.hysteresis_neg < 0.0 {
            self.hysteresis_neg = DEFAULT_HYSTERESIS_NEG;
        }

        normalize_program(&mut self.program);
        if !self.override_program.as_ref().map(Interval::validate).unwrap_or(true) {
            self.override_program = None;
        }
    }

    pub fn validate(&self) -> Result<Tz, ConfigError> {
        if self.thingid.trim().is_empty() {
            return Err(ConfigError::Missing("thingid"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        if self.switch_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("switch_file"));
        }
        parse_timezone(&self.timezone)
    }

    pub fn hysteresis(&self) -> Hysteresis {
        Hysteresis {
            above: self.hysteresis_pos,
            below: self.hysteresis_neg,
        }
    }

    pub fn command_validator(&self) -> Validator {
        Validator::new(self.cmd_expiry_s, self.tolerance_ms)
    }

    pub fn sensor_thing(&self) -> String {
        match &self.sensor {
            SensorConfig::Relay { thing: Some(thing) } => thing.clone(),
            _ => format!("{}-sensors", self.thingid),
        }
    }
}

impl RemoteConfig {
    pub fn sanitize(&mut self) {
        self.msg_expiry_s = self.msg_expiry_s.max(1);
        self.poll_status_every_s = self.poll_status_every_s.max(1);
        self.override_hours = self.override_hours.clamp(1, 23);
        self.request_timeout_s = self.request_timeout_s.clamp(1, 120);
    }

    pub fn validate(&self) -> Result<Tz, ConfigError> {
        if self.thingid.trim().is_empty() {
            return Err(ConfigError::Missing("thingid"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        parse_timezone(&self.timezone)
    }

    pub fn validator(&self) -> Validator {
        Validator::new(self.msg_expiry_s, self.tolerance_ms)
    }
}

fn default_thingname() -> String {
    "relaystat".to_string()
}

fn default_msg_expiry_s() -> u64 {
    600
}

fn default_cmd_expiry_s() -> u64 {
    600
}

fn default_get_commands_every_s() -> u64 {
    30
}

fn default_send_status_every_s() -> u64 {
    60
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_tolerance_ms() -> u64 {
    30_000
}

fn default_evaluate_every_s() -> u64 {
    20
}

fn default_read_sensors_every_s() -> u64 {
    30
}

fn default_hysteresis_pos() -> f64 {
    DEFAULT_HYSTERESIS_POS
}

fn default_hysteresis_neg() -> f64 {
    DEFAULT_HYSTERESIS_NEG
}

fn default_sensor_errors_tolerance() -> u32 {
    DEFAULT_ERROR_TOLERANCE
}

fn default_sensor_staleness_ms() -> u64 {
    300_000
}

fn default_request_timeout_s() -> u64 {
    15
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_poll_status_every_s() -> u64 {
    30
}

fn default_override_hours() -> u32 {
    2
}

fn default_http_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_minimal_controller_file() {
        let raw = r#"{
            "msg_expiry_s": 300,
            "cmd_expiry_s": 120,
            "thingid": "f00dcafe",
            "thingname": "Caldaia",
            "get_commands_every_s": 10,
            "send_status_every_s": 60,
            "switch_file": "/sys/class/gpio/gpio17/value",
            "watchdog_file": null,
            "program": [{"begin": 2200, "end": 600, "temp": 18}],
            "override_program": null,
            "password": "hunter2",
            "last_saved": "2026-01-05T07:00:00.000000Z"
        }"#;
        let config: ControllerConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.thingname, "Caldaia");
        assert_eq!(config.cmd_expiry_s, 120);
        assert_eq!(config.program.len(), 1);
        assert!(config.program[0].status);
        assert_eq!(config.tolerance_ms, 30_000);
        assert_eq!(config.evaluate_every_s, 20);
        assert_eq!(config.sensor, SensorConfig::Relay { thing: None });
        assert_eq!(config.sensor_thing(), "f00dcafe-sensors");
        assert_eq!(config.validate().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn missing_password_is_a_parse_error() {
        let raw = r#"{"thingid": "x", "switch_file": "/tmp/s"}"#;
        assert!(serde_json::from_str::<ControllerConfig>(raw).is_err());
    }

    #[test]
    fn validate_rejects_blank_identity() {
        let config = ControllerConfig::new("  ", "pw", "/tmp/switch");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("thingid"))));

        let config = ControllerConfig::new("thing", "", "/tmp/switch");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("password"))));

        let mut config = ControllerConfig::new("thing", "pw", "/tmp/switch");
        config.timezone = "Atlantis/Capital".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Timezone(_))));
    }

    #[test]
    fn sanitize_clamps_and_drops_bad_intervals() {
        let mut config = ControllerConfig::new("thing", "pw", "/tmp/switch");
        config.get_commands_every_s = 0;
        config.request_timeout_s = 10_000;
        config.hysteresis_neg = -1.0;
        config.program = vec![
            Interval {
                begin: 900,
                end: 1000,
                status: true,
                temp: Some(20.0),
            },
            Interval {
                begin: 2500,
                end: 100,
                status: true,
                temp: None,
            },
            Interval {
                begin: 600,
                end: 800,
                status: true,
                temp: Some(21.0),
            },
        ];
        config.override_program = Some(Interval {
            begin: 1261,
            end: 1300,
            status: true,
            temp: None,
        });

        config.sanitize();

        assert_eq!(config.get_commands_every_s, 1);
        assert_eq!(config.request_timeout_s, 120);
        assert_eq!(config.hysteresis_neg, DEFAULT_HYSTERESIS_NEG);
        assert_eq!(
            config.program.iter().map(|i| i.begin).collect::<Vec<_>>(),
            vec![600, 900]
        );
        assert_eq!(config.override_program, None);
    }

    #[test]
    fn mqtt_sensor_selection() {
        let raw = r#"{"source": "mqtt", "host": "10.0.0.2"}"#;
        let sensor: SensorConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(
            sensor,
            SensorConfig::Mqtt {
                host: "10.0.0.2".to_string(),
                port: 1883,
                user: String::new(),
                pass: String::new(),
            }
        );
    }

    #[test]
    fn remote_defaults() {
        let raw = r#"{"thingid": "f00dcafe", "password": "pw", "override_hours": 48}"#;
        let mut config: RemoteConfig = serde_json::from_str(raw).unwrap();
        config.sanitize();

        assert_eq!(config.override_hours, 23);
        assert_eq!(config.poll_status_every_s, 30);
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert!(config.validate().is_ok());
    }
}
