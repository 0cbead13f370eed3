mod dweet;
mod memory;

pub use dweet::DweetRelay;
pub use memory::MemoryRelay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{envelope::Envelope, error::TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntry {
    pub created: DateTime<Utc>,
    pub content: Envelope,
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn post(&self, thing: &str, envelope: &Envelope) -> Result<(), TransportError>;

    async fn fetch(&self, thing: &str) -> Result<Vec<RelayEntry>, TransportError>;
}
