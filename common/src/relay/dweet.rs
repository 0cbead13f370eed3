use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RelayEntry, RelayTransport};
use crate::{envelope::Envelope, error::TransportError, time::parse_iso8601};

#[derive(Debug, Clone)]
pub struct DweetRelay {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DweetResponse {
    #[serde(default)]
    this: Option<String>,
    #[serde(default)]
    with: serde_json::Value,
    #[serde(default)]
    because: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    created: String,
    #[serde(default)]
    content: serde_json::Value,
}

impl DweetRelay {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn latest_plain(
        &self,
        thing: &str,
    ) -> Result<Option<(DateTime<Utc>, serde_json::Value)>, TransportError> {
        let url = format!("{}/get/latest/dweet/for/{thing}", self.base_url);
        let entries = self.get_entries(&url).await?;
        match entries.into_iter().next() {
            Some(raw) => {
                let entry: WireEntry = serde_json::from_value(raw)
                    .map_err(|err| TransportError::Malformed(err.to_string()))?;
                let created = parse_iso8601(&entry.created)
                    .map_err(|err| TransportError::Malformed(err.to_string()))?;
                Ok(Some((created, entry.content)))
            }
            None => Ok(None),
        }
    }

    async fn get_entries(&self, url: &str) -> Result<Vec<serde_json::Value>, TransportError> {
        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        let body: DweetResponse = response.json().await?;
        unwrap_body(body)
    }
}

fn unwrap_body(body: DweetResponse) -> Result<Vec<serde_json::Value>, TransportError> {
    if body.this.as_deref() == Some("failed") {
        return Err(TransportError::Rejected(
            body.because.unwrap_or_else(|| "no reason given".to_string()),
        ));
    }
    match body.with {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(TransportError::Malformed(format!(
            "expected a list of entries, got {other}"
        ))),
    }
}

/// Keeps the board's order. Entries without a parseable receipt time are
/// dropped here since nothing downstream can place them in time.
fn parse_entries(items: Vec<serde_json::Value>) -> Vec<RelayEntry> {
    let total = items.len();
    let entries: Vec<RelayEntry> = items
        .into_iter()
        .filter_map(|raw| {
            let wire: WireEntry = serde_json::from_value(raw)
                .map_err(|err| debug!("unparseable relay entry: {err}"))
                .ok()?;
            let created = parse_iso8601(&wire.created)
                .map_err(|err| debug!("bad receipt time {:?}: {err}", wire.created))
                .ok()?;
            let content = serde_json::from_value::<Envelope>(wire.content).unwrap_or_default();
            Some(RelayEntry { created, content })
        })
        .collect();

    if entries.len() < total {
        warn!(
            "dropped {} malformed relay entries out of {total}",
            total - entries.len()
        );
    }
    entries
}

#[async_trait]
impl RelayTransport for DweetRelay {
    async fn post(&self, thing: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let url = format!("{}/dweet/for/{thing}", self.base_url);
        let response = self.client.post(url).form(envelope).send().await?;
        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn fetch(&self, thing: &str) -> Result<Vec<RelayEntry>, TransportError> {
        let url = format!("{}/get/dweets/for/{thing}", self.base_url);
        let items = self.get_entries(&url).await?;
        Ok(parse_entries(items))
    }
}
