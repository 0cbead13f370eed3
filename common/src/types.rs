use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::CodecError, schedule::Interval};

const COMMAND_ID_BYTES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Command(Command),
    Status(Status),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Command(_) => MessageKind::Command,
            Self::Status(_) => MessageKind::Status,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Command(command) => command.timestamp,
            Self::Status(status) => status.timestamp,
        }
    }
}

/// `program: None` leaves the current program untouched; `override_program`
/// always replaces the current override, so `null` cancels it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(with = "crate::time::iso8601")]
    pub timestamp: DateTime<Utc>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<Vec<Interval>>,
    #[serde(default)]
    pub override_program: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Command {
    pub fn new_id() -> Result<String, CodecError> {
        let mut raw = [0u8; COMMAND_ID_BYTES];
        getrandom::getrandom(&mut raw).map_err(CodecError::Random)?;
        Ok(STANDARD.encode(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(with = "crate::time::iso8601")]
    pub timestamp: DateTime<Utc>,
    pub status: bool,
    pub actual_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temp: Option<f64>,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub humi: Option<f64>,
    pub msgexp_s: u64,
    pub msgupd_s: u64,
    #[serde(default)]
    pub program: Vec<Interval>,
    #[serde(default)]
    pub override_program: Option<Interval>,
    pub name: String,
    #[serde(default)]
    pub lastcmd_id: Option<String>,
}
