use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    envelope::{encrypt, PasswordKey},
    error::{SyncError, TransportError},
    relay::{RelayEntry, RelayTransport},
    types::{Command, Message, MessageKind, Status},
    validator::{Accepted, Validator},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub status: Option<(Status, DateTime<Utc>)>,
    pub command: Option<(Command, DateTime<Utc>)>,
}

pub struct SyncClient<R> {
    relay: R,
    thing_id: String,
    key: PasswordKey,
    validator: Validator,
}

impl<R: RelayTransport> SyncClient<R> {
    pub fn new(
        relay: R,
        thing_id: impl Into<String>,
        passphrase: &str,
        validator: Validator,
    ) -> Self {
        Self {
            relay,
            thing_id: thing_id.into(),
            key: PasswordKey::from_passphrase(passphrase),
            validator,
        }
    }

    pub fn thing_id(&self) -> &str {
        &self.thing_id
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub async fn publish(&self, message: &Message) -> Result<(), SyncError> {
        let envelope = encrypt(&self.key, message)?;
        self.relay.post(&self.thing_id, &envelope).await?;
        debug!("posted {:?} to {}", message.kind(), self.thing_id);
        Ok(())
    }

    pub async fn poll_command(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(Command, DateTime<Utc>)>, TransportError> {
        let entries = self.relay.fetch(&self.thing_id).await?;
        Ok(self.pick(&entries, MessageKind::Command, now).and_then(into_command))
    }

    pub async fn poll_status(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(Status, DateTime<Utc>)>, TransportError> {
        let entries = self.relay.fetch(&self.thing_id).await?;
        Ok(self.pick(&entries, MessageKind::Status, now).and_then(into_status))
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<Snapshot, TransportError> {
        let entries = self.relay.fetch(&self.thing_id).await?;
        Ok(Snapshot {
            status: self.pick(&entries, MessageKind::Status, now).and_then(into_status),
            command: self.pick(&entries, MessageKind::Command, now).and_then(into_command),
        })
    }

    fn pick(
        &self,
        entries: &[RelayEntry],
        wanted: MessageKind,
        now: DateTime<Utc>,
    ) -> Option<Accepted> {
        let scan = self.validator.latest(&self.key, entries, wanted, now);
        scan.report.log();
        scan.accepted
    }
}

fn into_command(accepted: Accepted) -> Option<(Command, DateTime<Utc>)> {
    match accepted.message {
        Message::Command(command) => Some((command, accepted.received)),
        Message::Status(_) => None,
    }
}

fn into_status(accepted: Accepted) -> Option<(Status, DateTime<Utc>)> {
    match accepted.message {
        Message::Status(status) => Some((status, accepted.received)),
        Message::Command(_) => None,
    }
}
