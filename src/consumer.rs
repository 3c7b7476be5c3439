//! NATS subscriber for incoming payment requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Receives transaction requests from the gateway
pub struct RequestConsumer {
    client: Client,
    subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to payment request subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
