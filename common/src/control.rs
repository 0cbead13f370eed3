use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::{
    actuator::{Actuator, Watchdog},
    config::ControllerConfig,
    error::StoreError,
    relay::RelayTransport,
    runner::Service,
    schedule::{normalize_program, Demand, Interval},
    sensor::{SensorBuffer, SensorSource},
    store::ConfigStore,
    sync::SyncClient,
    thermostat::{EngineAction, Inputs, ThermostatEngine, ThermostatState},
    time::{format_iso8601, hhmm, wire_now},
    types::{Command, Message, Status},
};

pub const INITIAL_COMMAND_ID: &str = "saved_configuration";
pub const CONTROLLER_SENDER: &str = "controller";

#[derive(Debug, Clone, Copy)]
struct Timer {
    every: Duration,
    last: Option<DateTime<Utc>>,
}

impl Timer {
    fn every_s(seconds: u64) -> Self {
        Self {
            every: Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX / 1_000)),
            last: None,
        }
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        self.last.map(|last| now - last >= self.every).unwrap_or(true)
    }

    fn mark(&mut self, now: DateTime<Utc>) {
        self.last = Some(now);
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

pub struct ControlLoop<R, S, A> {
    config: ControllerConfig,
    zone: Tz,
    store: ConfigStore,
    sync: SyncClient<R>,
    sensor: S,
    sensors: SensorBuffer,
    actuator: A,
    watchdog: Watchdog,
    engine: ThermostatEngine,
    state: ThermostatState,
    demand: Demand,
    lastcmd_id: Option<String>,
    status_dirty: bool,
    config_dirty: bool,
    sensor_timer: Timer,
    command_timer: Timer,
    evaluate_timer: Timer,
    status_timer: Timer,
}

impl<R, S, A> ControlLoop<R, S, A>
where
    R: RelayTransport,
    S: SensorSource,
    A: Actuator,
{
    pub fn new(
        config: ControllerConfig,
        zone: Tz,
        store: ConfigStore,
        relay: R,
        sensor: S,
        actuator: A,
    ) -> Self {
        let sync = SyncClient::new(
            relay,
            config.thingid.clone(),
            &config.password,
            config.command_validator(),
        );
        Self {
            zone,
            store,
            sync,
            sensor,
            sensors: SensorBuffer::new(config.sensor_errors_tolerance, config.sensor_staleness_ms),
            actuator,
            watchdog: Watchdog::new(config.watchdog_file.clone()),
            engine: ThermostatEngine::new(config.hysteresis()),
            state: ThermostatState::default(),
            demand: Demand::Off,
            lastcmd_id: Some(INITIAL_COMMAND_ID.to_string()),
            status_dirty: false,
            config_dirty: false,
            sensor_timer: Timer::every_s(config.read_sensors_every_s),
            command_timer: Timer::every_s(config.get_commands_every_s),
            evaluate_timer: Timer::every_s(config.evaluate_every_s),
            status_timer: Timer::every_s(config.send_status_every_s),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ThermostatState {
        self.state
    }

    pub fn demand(&self) -> Demand {
        self.demand
    }

    pub fn lastcmd_id(&self) -> Option<&str> {
        self.lastcmd_id.as_deref()
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) {
        self.watchdog.beat(now).await;

        if self.sensor_timer.due(now) {
            let reading = self.sensor.read().await;
            self.sensors.record(reading, now);
            self.sensor_timer.mark(now);
        }

        if self.command_timer.due(now) {
            match self.sync.poll_command(now).await {
                Ok(command) => {
                    if let Some((command, _)) = command {
                        self.apply_command(command, now).await;
                    }
                    self.command_timer.mark(now);
                }
                Err(err) => warn!("failed to get latest commands: {err}"),
            }
        }

        if self.evaluate_timer.due(now) {
            self.evaluate(now).await;
            self.evaluate_timer.mark(now);
        }

        if self.config_dirty {
            self.persist(now).await;
        }

        if self.status_dirty || self.status_timer.due(now) {
            if self.push_status(now).await {
                self.status_dirty = false;
                self.status_timer.mark(now);
            }
        }
    }

    pub async fn apply_command(&mut self, command: Command, now: DateTime<Utc>) {
        debug!("found valid command {}", command.id);

        let mut program = command.program.unwrap_or_else(|| self.config.program.clone());
        normalize_program(&mut program);
        let override_program = command.override_program.filter(|interval| {
            let valid = interval.validate();
            if !valid {
                warn!("ignoring malformed override in command {}", command.id);
            }
            valid
        });

        if self.lastcmd_id.as_deref() != Some(command.id.as_str()) {
            self.lastcmd_id = Some(command.id);
            self.status_dirty = true;
        }

        if program != self.config.program || override_program != self.config.override_program {
            info!("new schedule received");
            self.config.program = program;
            self.config.override_program = override_program;
            self.persist(now).await;
            self.evaluate_timer.reset();
            self.status_dirty = true;
        }
    }

    pub async fn evaluate(&mut self, now: DateTime<Utc>) {
        let hm = hhmm(now, &self.zone);
        let decision = self.engine.evaluate(
            &self.state,
            &Inputs {
                hm,
                program: &self.config.program,
                override_program: self.config.override_program.as_ref(),
                temp: self.sensors.temp(),
            },
        );
        debug!(
            "hm={hm} demand={:?} temp={:?} desired={} ascending={}",
            decision.demand,
            self.sensors.temp(),
            decision.desired,
            decision.state.ascending
        );

        self.state = decision.state;
        if decision.demand != self.demand {
            self.demand = decision.demand;
            self.status_dirty = true;
        }

        for action in decision.actions {
            match action {
                EngineAction::ClearOverride => {
                    info!("override has expired, deleting");
                    self.config.override_program = None;
                    self.persist(now).await;
                    self.status_dirty = true;
                }
                EngineAction::SendAcknowledgement => self.acknowledge(now).await,
                EngineAction::SwitchActuator(on) => self.switch(on).await,
            }
        }
    }

    async fn switch(&mut self, on: bool) {
        match self.actuator.set(on).await {
            Ok(()) => {
                info!("turning actual heating {}", if on { "on" } else { "off" });
                self.state.commit(on);
                self.status_dirty = true;
            }
            Err(err) => error!("cannot change heating status: {err}"),
        }
    }

    async fn acknowledge(&mut self, now: DateTime<Utc>) {
        let id = match Command::new_id() {
            Ok(id) => id,
            Err(err) => {
                error!("cannot build acknowledgement: {err}");
                return;
            }
        };
        let command = Message::Command(Command {
            timestamp: wire_now(now),
            id: id.clone(),
            program: Some(self.config.program.clone()),
            override_program: None,
            from: Some(CONTROLLER_SENDER.to_string()),
        });

        match self.sync.publish(&command).await {
            Ok(()) => {
                info!("acknowledgement command sent");
                self.lastcmd_id = Some(id);
                self.status_dirty = true;
            }
            Err(err) => error!("failed to send acknowledgement: {err}"),
        }
    }

    async fn persist(&mut self, now: DateTime<Utc>) {
        self.config.last_saved = Some(format_iso8601(now));
        match self.store.save(&self.config).await {
            Ok(()) => {
                info!("configuration saved to {}", self.store.path().display());
                self.config_dirty = false;
            }
            Err(err) => {
                error!("cannot save configuration: {err}");
                self.config_dirty = true;
            }
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> Status {
        Status {
            timestamp: wire_now(now),
            status: self.demand.is_on(),
            actual_status: self.state.heating_on,
            target_temp: self.demand.target(),
            temp: self.sensors.temp(),
            humi: self.sensors.humidity(),
            msgexp_s: self.config.msg_expiry_s,
            msgupd_s: self.config.send_status_every_s,
            program: self.config.program.clone(),
            override_program: self.config.override_program.clone(),
            name: self.config.thingname.clone(),
            lastcmd_id: self.lastcmd_id.clone(),
        }
    }

    async fn push_status(&mut self, now: DateTime<Utc>) -> bool {
        let status = self.status(now);
        let summary = if status.status { "on" } else { "off" };
        match self.sync.publish(&Message::Status(status)).await {
            Ok(()) => {
                info!("status update sent (status is {summary})");
                true
            }
            Err(err) => {
                error!("failed to send status update: {err}");
                false
            }
        }
    }

    pub fn override_program(&self) -> Option<&Interval> {
        self.config.override_program.as_ref()
    }
}

#[async_trait]
impl<R, S, A> Service for ControlLoop<R, S, A>
where
    R: RelayTransport,
    S: SensorSource,
    A: Actuator,
{
    type Error = StoreError;

    async fn start(&mut self) -> Result<(), StoreError> {
        info!(
            "controller {} ({}) starting, {} program entries",
            self.config.thingname,
            self.config.thingid,
            self.config.program.len()
        );
        Ok(())
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.tick(now).await;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), StoreError> {
        if self.config_dirty {
            self.config.last_saved = Some(format_iso8601(Utc::now()));
            self.store.save(&self.config).await?;
        }
        info!("controller stopped");
        Ok(())
    }
}
