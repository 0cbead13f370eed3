use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use chrono_tz::Tz;
use tracing::{info, warn};

use relaystat_common::{
    ConfigStore, ControlLoop, ControllerConfig, DweetRelay, RelaySensorSource, Runner, SensorConfig,
    SensorSource, SwitchFile,
};

use crate::mqtt::MqttSensorSource;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::var("RELAYSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.relaystat/controller.json"));
    let store = ConfigStore::new(path);

    let mut config: ControllerConfig = store
        .load()
        .await
        .context("cannot read controller configuration")?
        .with_context(|| format!("no configuration found at {}", store.path().display()))?;
    config.sanitize();
    let zone = config.validate().context("invalid controller configuration")?;

    let relay = DweetRelay::new(
        config.relay_url.clone(),
        Duration::from_secs(config.request_timeout_s),
    )
    .context("failed to build relay client")?;
    let actuator = SwitchFile::new(config.switch_file.clone());

    info!(
        "controller {} using relay {} (timezone {zone})",
        config.thingid, config.relay_url
    );

    match config.sensor.clone() {
        SensorConfig::Relay { .. } => {
            let sensor = RelaySensorSource::new(relay.clone(), config.sensor_thing());
            run_loop(config, zone, store, relay, sensor, actuator).await
        }
        SensorConfig::Mqtt {
            host,
            port,
            user,
            pass,
        } => {
            let sensor = MqttSensorSource::connect(&host, port, &user, &pass).await?;
            run_loop(config, zone, store, relay, sensor, actuator).await
        }
    }
}

async fn run_loop<S: SensorSource>(
    config: ControllerConfig,
    zone: Tz,
    store: ConfigStore,
    relay: DweetRelay,
    sensor: S,
    actuator: SwitchFile,
) -> anyhow::Result<()> {
    let control = ControlLoop::new(config, zone, store, relay, sensor, actuator);
    Runner::new(control)
        .run_until(shutdown_signal())
        .await
        .context("controller loop failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
