use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[async_trait]
pub trait Service: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) -> Result<(), Self::Error>;

    async fn stop(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct Runner<S> {
    service: S,
    tick: Duration,
}

impl<S: Service> Runner<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            tick: Duration::from_secs(1),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Shutdown is only observed between ticks: a tick that has started always
    /// runs to completion.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<S, S::Error>
    where
        F: Future<Output = ()> + Send,
    {
        self.service.start().await?;

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.service.on_tick(Utc::now()).await {
                        warn!("tick failed: {err}");
                    }
                }
            }
        }

        self.service.stop().await?;
        Ok(self.service)
    }
}
