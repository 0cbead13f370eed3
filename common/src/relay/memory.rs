use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RelayEntry, RelayTransport};
use crate::{envelope::Envelope, error::TransportError};

#[derive(Debug, Default, Clone)]
pub struct MemoryRelay {
    inner: Arc<Mutex<MemoryRelayInner>>,
}

#[derive(Debug, Default)]
struct MemoryRelayInner {
    // Newest first, like the real board.
    boards: HashMap<String, Vec<RelayEntry>>,
    now: Option<DateTime<Utc>>,
    fail_next_post: Option<String>,
    fail_next_fetch: Option<String>,
    posts: usize,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = Some(now);
    }

    pub fn push_entry(&self, thing: &str, entry: RelayEntry) {
        self.lock()
            .boards
            .entry(thing.to_string())
            .or_default()
            .insert(0, entry);
    }

    pub fn entries(&self, thing: &str) -> Vec<RelayEntry> {
        self.lock().boards.get(thing).cloned().unwrap_or_default()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts
    }

    pub fn fail_next_post(&self, error: &str) {
        self.lock().fail_next_post = Some(error.to_string());
    }

    pub fn fail_next_fetch(&self, error: &str) {
        self.lock().fail_next_fetch = Some(error.to_string());
    }
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    async fn post(&self, thing: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_post.take() {
            return Err(TransportError::Request(error));
        }
        let created = inner.now.unwrap_or_else(Utc::now);
        inner.posts += 1;
        inner.boards.entry(thing.to_string()).or_default().insert(
            0,
            RelayEntry {
                created,
                content: envelope.clone(),
            },
        );
        Ok(())
    }

    async fn fetch(&self, thing: &str) -> Result<Vec<RelayEntry>, TransportError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(TransportError::Request(error));
        }
        Ok(inner.boards.get(thing).cloned().unwrap_or_default())
    }
}
