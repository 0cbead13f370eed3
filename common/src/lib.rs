pub mod actuator;
pub mod config;
pub mod control;
pub mod envelope;
pub mod error;
pub mod relay;
pub mod remote;
pub mod runner;
pub mod schedule;
pub mod sensor;
pub mod store;
pub mod sync;
pub mod thermostat;
pub mod time;
pub mod topics;
pub mod types;
pub mod validator;

pub use actuator::{Actuator, SwitchFile, Watchdog};
pub use config::{ControllerConfig, RemoteConfig, SensorConfig};
pub use control::ControlLoop;
pub use envelope::{decrypt, encrypt, Envelope, PasswordKey};
pub use relay::{DweetRelay, MemoryRelay, RelayEntry, RelayTransport};
pub use remote::{Remote, RemoteView, StatusPoller};
pub use runner::{Runner, Service};
pub use schedule::{contains, Demand, Interval};
pub use sensor::{RelaySensorSource, SensorBuffer, SensorReading, SensorSource, SensorState};
pub use store::ConfigStore;
pub use sync::SyncClient;
pub use thermostat::{EngineAction, Hysteresis, ThermostatEngine, ThermostatState};
pub use topics::*;
pub use types::{Command, Message, MessageKind, Status};
pub use validator::Validator;
