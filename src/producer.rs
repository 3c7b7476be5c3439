//! NATS publisher for decisions

use crate::types::decision::GatewayResponse;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Sends each response back to the requester and to the audit subject
#[derive(Clone)]
pub struct DecisionPublisher {
    client: Client,
    subject: String,
}

impl DecisionPublisher {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Reply on `reply` when the request carried one, then publish on the
    /// decision subject.
    pub async fn publish(&self, response: &GatewayResponse, reply: Option<&Subject>) -> Result<()> {
        let payload = serde_json::to_vec(response)?;

        if let Some(reply) = reply {
            self.client
                .publish(reply.clone(), payload.clone().into())
                .await?;
        }

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            transaction_id = %response.transaction_id(),
            status = %response.status(),
            replied = reply.is_some(),
            "Published decision"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
