//! HTTP delivery adapter.
//!
//! Outbound instructions travel to the delivery adapter as JSON; the
//! adapter owns the phrasebook and the platform session, renders the
//! template for the target language, and answers with the reference of
//! the message the platform created.

use std::time::Duration;

use async_trait::async_trait;
use dossier_engine::reply::{MessageRef, Outbound, Transport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    send_url: String,
}

impl HttpTransport {
    pub fn new(delivery_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            send_url: format!("{}/v1/send", delivery_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, outbound: Outbound) -> Result<MessageRef, TransportError> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&outbound)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            // The adapter refused this delivery (chat gone, bot blocked).
            return Err(TransportError::Rejected(status.to_string()));
        }
        if !status.is_success() {
            return Err(TransportError::Unavailable(status.to_string()));
        }

        response
            .json::<MessageRef>()
            .await
            .map_err(|e| TransportError::Unavailable(format!("bad adapter response: {e}")))
    }
}
