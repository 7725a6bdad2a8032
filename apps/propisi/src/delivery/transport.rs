//! Remote transport: one multipart POST per attempt, no retries here.
//!
//! Retrying is the orchestrator's job: a failed attempt moves on to the next
//! endpoint instead of hammering the same one.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, multipart::Form, Client};
use thiserror::Error;
use tracing::debug;

use crate::delivery::classify::diagnostic_text;
use crate::delivery::{Endpoint, Operation};
use crate::worksheet::WorksheetOptions;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{endpoint} did not answer within {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("could not connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {detail}")]
    Status {
        endpoint: String,
        status: u16,
        detail: String,
    },

    #[error("HTTP error from {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Raw 2xx response, not yet classified.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A remote worksheet generator. Carried by the orchestrator as
/// `Arc<dyn RemoteGenerator>` so tests can script endpoint behaviour.
#[async_trait]
pub trait RemoteGenerator: Send + Sync {
    async fn request(
        &self,
        endpoint: &Endpoint,
        op: Operation,
        options: &WorksheetOptions,
        timeout: Duration,
    ) -> Result<RemoteResponse, TransportError>;
}

/// `reqwest` implementation speaking the multipart protocol.
#[derive(Debug, Clone, Default)]
pub struct HttpGenerator {
    client: Client,
}

impl HttpGenerator {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl RemoteGenerator for HttpGenerator {
    async fn request(
        &self,
        endpoint: &Endpoint,
        op: Operation,
        options: &WorksheetOptions,
        timeout: Duration,
    ) -> Result<RemoteResponse, TransportError> {
        let url = endpoint.join(op.path());
        let form = options
            .to_form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        debug!(%url, operation = %op, "sending multipart request");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(endpoint, timeout, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(endpoint, timeout, e))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                detail: diagnostic_text(&body).unwrap_or_else(|| "no details".to_string()),
            });
        }

        Ok(RemoteResponse { content_type, body })
    }
}

fn map_reqwest_error(endpoint: &Endpoint, timeout: Duration, error: reqwest::Error) -> TransportError {
    let endpoint = endpoint.to_string();
    if error.is_timeout() {
        TransportError::Timeout {
            endpoint,
            after: timeout,
        }
    } else if error.is_connect() {
        TransportError::Connect {
            endpoint,
            reason: error.to_string(),
        }
    } else {
        TransportError::Http {
            endpoint,
            source: error,
        }
    }
}
