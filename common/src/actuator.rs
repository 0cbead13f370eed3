use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::ActuatorError;

#[async_trait]
pub trait Actuator: Send {
    async fn set(&mut self, on: bool) -> Result<(), ActuatorError>;
}

#[derive(Debug, Clone)]
pub struct SwitchFile {
    path: PathBuf,
}

impl SwitchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Actuator for SwitchFile {
    async fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        let value = if on { "1" } else { "0" };
        tokio::fs::write(&self.path, value)
            .await
            .map_err(|source| ActuatorError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!("wrote {value} to {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    path: Option<PathBuf>,
}

impl Watchdog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub async fn beat(&self, now: DateTime<Utc>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = tokio::fs::write(path, now.timestamp_micros().to_string()).await {
            warn!("cannot update watchdog file {}: {err}", path.display());
        }
    }
}
