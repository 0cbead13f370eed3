use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::{RemoteError, SyncError, TransportError},
    relay::RelayTransport,
    runner::Service,
    schedule::{normalize_program, Interval},
    sync::SyncClient,
    time::{format_iso8601, hhmm, wire_now},
    types::{Command, Message, Status},
};

pub const REMOTE_SENDER: &str = "remote";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteView {
    pub status: Option<Status>,
    pub received: Option<String>,
    pub last_sent_id: Option<String>,
    pub awaiting_ack: bool,
    pub last_error: Option<String>,
}

pub struct Remote<R> {
    sync: Arc<SyncClient<R>>,
    view: Arc<Mutex<RemoteView>>,
    zone: Tz,
    override_hours: u32,
}

impl<R> Clone for Remote<R> {
    fn clone(&self) -> Self {
        Self {
            sync: Arc::clone(&self.sync),
            view: Arc::clone(&self.view),
            zone: self.zone,
            override_hours: self.override_hours,
        }
    }
}

impl<R: RelayTransport> Remote<R> {
    pub fn new(sync: SyncClient<R>, zone: Tz, override_hours: u32) -> Self {
        Self {
            sync: Arc::new(sync),
            view: Arc::new(Mutex::new(RemoteView::default())),
            zone,
            override_hours: override_hours.clamp(1, 23),
        }
    }

    pub async fn view(&self) -> RemoteView {
        self.view.lock().await.clone()
    }

    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<(), TransportError> {
        let snapshot = match self.sync.snapshot(now).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.view.lock().await.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        let mut view = self.view.lock().await;
        view.last_error = None;
        if let Some((status, received)) = snapshot.status {
            debug!("status received: heating {}", if status.status { "on" } else { "off" });
            view.status = Some(status);
            view.received = Some(format_iso8601(received));
        }

        if let Some(sent) = view.last_sent_id.clone() {
            let acknowledged = view
                .status
                .as_ref()
                .and_then(|status| status.lastcmd_id.as_deref())
                == Some(sent.as_str());
            let superseded = snapshot
                .command
                .as_ref()
                .map(|(command, _)| command.id != sent)
                .unwrap_or(false);
            if acknowledged {
                info!("controller acknowledged command {sent}");
            } else if superseded {
                info!("command {sent} superseded by a newer one");
            }
            view.awaiting_ack = !(acknowledged || superseded);
        }
        Ok(())
    }

    pub async fn turn_on(
        &self,
        temp: Option<f64>,
        hours: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<String, RemoteError> {
        if let Some(temp) = temp.filter(|t| !t.is_finite()) {
            return Err(RemoteError::InvalidTemperature(temp));
        }
        let hours = hours.unwrap_or(self.override_hours).clamp(1, 23);
        let boost = Interval {
            begin: hhmm(now, &self.zone),
            end: hhmm(now + Duration::hours(i64::from(hours)), &self.zone),
            status: true,
            temp,
        };
        let program = self.known_program().await;
        self.send(program, Some(boost), now).await
    }

    pub async fn turn_off(&self, now: DateTime<Utc>) -> Result<String, RemoteError> {
        let program = self.known_program().await;
        self.send(program, Some(Interval::unconditional(false, None)), now).await
    }

    pub async fn set_schedule(
        &self,
        mut program: Vec<Interval>,
        now: DateTime<Utc>,
    ) -> Result<String, RemoteError> {
        if let Some(bad) = program.iter().find(|interval| !interval.validate()) {
            return Err(RemoteError::InvalidInterval {
                begin: bad.begin,
                end: bad.end,
            });
        }
        normalize_program(&mut program);
        let override_program = self
            .view
            .lock()
            .await
            .status
            .as_ref()
            .and_then(|status| status.override_program.clone());
        self.send(Some(program), override_program, now).await
    }

    pub async fn cancel_override(&self, now: DateTime<Utc>) -> Result<String, RemoteError> {
        let program = self.known_program().await;
        self.send(program, None, now).await
    }

    /// Program from the last status, `None` when no status was seen yet so
    /// the controller keeps its own.
    async fn known_program(&self) -> Option<Vec<Interval>> {
        self.view
            .lock()
            .await
            .status
            .as_ref()
            .map(|status| status.program.clone())
    }

    async fn send(
        &self,
        program: Option<Vec<Interval>>,
        override_program: Option<Interval>,
        now: DateTime<Utc>,
    ) -> Result<String, RemoteError> {
        let id = Command::new_id().map_err(SyncError::from)?;
        let command = Message::Command(Command {
            timestamp: wire_now(now),
            id: id.clone(),
            program,
            override_program,
            from: Some(REMOTE_SENDER.to_string()),
        });
        self.sync.publish(&command).await?;
        info!("command {id} sent");

        let mut view = self.view.lock().await;
        view.last_sent_id = Some(id.clone());
        view.awaiting_ack = true;
        Ok(id)
    }
}

pub struct StatusPoller<R> {
    remote: Remote<R>,
}

impl<R: RelayTransport> StatusPoller<R> {
    pub fn new(remote: Remote<R>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl<R: RelayTransport> Service for StatusPoller<R> {
    type Error = TransportError;

    async fn start(&mut self) -> Result<(), TransportError> {
        info!("polling status of {}", self.remote.sync.thing_id());
        Ok(())
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) -> Result<(), TransportError> {
        self.remote.refresh(now).await
    }
}
