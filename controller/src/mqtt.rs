use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{info, warn};

use relaystat_common::{
    error::SensorError, SensorReading, SensorSource, TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_TEMP,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Latest {
    temp: Option<(f64, DateTime<Utc>)>,
    humidity: Option<f64>,
}

pub struct MqttSensorSource {
    latest: Arc<Mutex<Latest>>,
    // Dropping the client closes the event loop's request channel.
    _client: AsyncClient,
}

impl MqttSensorSource {
    pub async fn connect(host: &str, port: u16, user: &str, pass: &str) -> anyhow::Result<Self> {
        let mut options = MqttOptions::new("relaystat-controller", host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if !user.is_empty() {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 32);
        for topic in [TOPIC_SENSOR_TEMP, TOPIC_SENSOR_HUMIDITY] {
            client
                .subscribe(topic, QoS::AtMostOnce)
                .await
                .with_context(|| format!("failed to subscribe to {topic}"))?;
        }

        let latest = Arc::new(Mutex::new(Latest::default()));
        spawn_mqtt_loop(Arc::clone(&latest), eventloop);
        info!("reading sensors from mqtt broker {host}:{port}");

        Ok(Self {
            latest,
            _client: client,
        })
    }
}

#[async_trait]
impl SensorSource for MqttSensorSource {
    async fn read(&mut self) -> Result<SensorReading, SensorError> {
        let latest = *self.latest.lock().await;
        let (temp, taken_at) = latest.temp.ok_or(SensorError::Unavailable)?;
        Ok(SensorReading {
            temp,
            humidity: latest.humidity,
            taken_at,
        })
    }
}

fn spawn_mqtt_loop(latest: Arc<Mutex<Latest>>, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let mut latest = latest.lock().await;
                    let handled =
                        handle_message(&mut latest, &message.topic, &message.payload, Utc::now());
                    if let Err(err) = handled {
                        warn!("mqtt message handling error: {err}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn handle_message(
    latest: &mut Latest,
    topic: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<(), SensorError> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        return Err(SensorError::Invalid(format!(
            "oversized payload on {topic} ({} bytes)",
            payload.len()
        )));
    }
    let message = std::str::from_utf8(payload)
        .map_err(|_| SensorError::Invalid(format!("non utf8 payload on {topic}")))?;
    let value = message
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| SensorError::Invalid(format!("{message:?} on {topic}")))?;

    match topic {
        TOPIC_SENSOR_TEMP if (-40.0..=125.0).contains(&value) => {
            latest.temp = Some((value, now));
        }
        TOPIC_SENSOR_HUMIDITY if (0.0..=100.0).contains(&value) => {
            latest.humidity = Some(value);
        }
        TOPIC_SENSOR_TEMP | TOPIC_SENSOR_HUMIDITY => {
            return Err(SensorError::Invalid(format!("{value} out of range on {topic}")));
        }
        _ => {}
    }
    Ok(())
}
