//! NATS publisher for aggregate records.
//!
//! Every finalized window is published as one JSON message on
//! `<prefix>.<agent_id>.minute`, so consumers can subscribe to a single
//! agent or to `<prefix>.*.minute` for the whole fleet.
//!
//! ## Example
//!
//! ```rust,no_run
//! use netprobe_adapters::nats::NatsPublisher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let publisher = NatsPublisher::builder()
//!         .url("nats://localhost:4222")
//!         .build()
//!         .await?;
//!
//!     assert_eq!(publisher.subject("agent-1"), "netstats.agent-1.minute");
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use netprobe_engine::{RecordSink, SinkError};
use netprobe_types::AggregateRecord;

use crate::AdapterError;

/// Subject prefix used when none is configured.
pub const DEFAULT_SUBJECT_PREFIX: &str = "netstats";

/// Subject a record from `agent_id` is published on.
///
/// Characters NATS treats specially inside a token (`.`, `*`, `>` and
/// whitespace) are replaced with `_`, so an agent id always maps to exactly
/// one subject token.
pub fn subject_for(prefix: &str, agent_id: &str) -> String {
    let token: String = agent_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("{prefix}.{token}.minute")
}

/// Publishes aggregate records to NATS.
pub struct NatsPublisher {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsPublisher {
    /// Create a new builder for configuring the publisher.
    pub fn builder() -> NatsPublisherBuilder {
        NatsPublisherBuilder::default()
    }

    /// Subject records from `agent_id` are published on.
    pub fn subject(&self, agent_id: &str) -> String {
        subject_for(&self.subject_prefix, agent_id)
    }

    /// Publish one record.
    pub async fn publish(&self, record: &AggregateRecord) -> Result<(), AdapterError> {
        let payload = serde_json::to_vec(record)?;
        self.client
            .publish(self.subject(&record.agent_id), payload.into())
            .await
            .map_err(|e| AdapterError::Publish(e.to_string()))
    }
}

#[async_trait]
impl RecordSink for NatsPublisher {
    async fn publish(&self, record: &AggregateRecord) -> Result<(), SinkError> {
        NatsPublisher::publish(self, record).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

impl std::fmt::Debug for NatsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsPublisher")
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

/// Builder for NatsPublisher.
#[derive(Debug, Default)]
pub struct NatsPublisherBuilder {
    url: Option<String>,
    credentials: Option<String>,
    subject_prefix: Option<String>,
}

impl NatsPublisherBuilder {
    /// Set the NATS server URL (default: "nats://localhost:4222").
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the path to a credentials file for authentication.
    pub fn credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials = Some(path.into());
        self
    }

    /// Set the subject prefix (default: "netstats").
    pub fn subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = Some(prefix.into());
        self
    }

    /// Build the publisher.
    ///
    /// The client keeps retrying in the background if the server is not
    /// reachable yet; records published meanwhile are buffered by the client.
    pub async fn build(self) -> Result<NatsPublisher, AdapterError> {
        let url = self
            .url
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        let mut options = async_nats::ConnectOptions::new()
            .name("netprobe-agent")
            .retry_on_initial_connect();
        if let Some(creds) = self.credentials {
            options = options
                .credentials_file(&creds)
                .await
                .map_err(|e| AdapterError::Auth(e.to_string()))?;
        }

        let client = options
            .connect(&url)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        Ok(NatsPublisher {
            client,
            subject_prefix: self
                .subject_prefix
                .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
        })
    }
}
