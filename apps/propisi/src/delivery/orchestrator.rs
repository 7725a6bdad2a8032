//! Delivery Orchestrator: try every endpoint in order, then fall back locally.
//!
//! # States
//! - `Trying(i)`     → attempt the roster's current endpoint (the i-th tried)
//! - `LocalFallback` → every endpoint failed; compose in-process (`Generate` only)
//! - `Succeeded`     → terminal, carries the accepted artifact
//! - `Failed`        → terminal, carries the collected causes
//!
//! Attempts are strictly sequential and bounded by the roster length, so a
//! failure is always attributable to exactly one endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::delivery::classify::{classify, Classification, MediaType, PayloadError};
use crate::delivery::transport::{RemoteGenerator, TransportError};
use crate::delivery::{Endpoint, EndpointRoster, Operation, Timeouts};
use crate::worksheet::{ComposeError, PageComposer, ValidationError, WorksheetOptions};

/// Default for the smallest 2xx body taken as a real artifact.
pub const DEFAULT_MIN_PAYLOAD_BYTES: usize = 512;

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// Which path produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Endpoint),
    Local,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote(endpoint) => write!(f, "remote {endpoint}"),
            Source::Local => f.write_str("local composer"),
        }
    }
}

/// Consolidated failure: one message for the user, short causes for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DeliveryFailure {
    pub message: String,
    pub causes: Vec<String>,
}

impl DeliveryFailure {
    /// Message followed by the cause chain, one per line.
    pub fn report(&self) -> String {
        let mut report = self.message.clone();
        for cause in &self.causes {
            report.push_str("\n  caused by: ");
            report.push_str(cause);
        }
        report
    }
}

/// Terminal value of one delivery operation. Never retried once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Success {
        bytes: Bytes,
        media_type: MediaType,
        source: Source,
    },
    Failure(DeliveryFailure),
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryResult::Success { .. })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Local synthesis
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LocalSynthesisError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("local composer task failed: {0}")]
    Join(String),
}

/// In-process document generator used once the remote roster is exhausted.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        options: &WorksheetOptions,
        paginate: bool,
    ) -> Result<Bytes, LocalSynthesisError>;
}

#[async_trait]
impl LocalSynthesizer for PageComposer {
    async fn synthesize(
        &self,
        options: &WorksheetOptions,
        paginate: bool,
    ) -> Result<Bytes, LocalSynthesisError> {
        // Composition and serialization are CPU-bound.
        let composer = self.clone();
        let options = options.clone();
        let bytes = tokio::task::spawn_blocking(move || composer.render_pdf(&options, paginate))
            .await
            .map_err(|e| LocalSynthesisError::Join(e.to_string()))??;
        Ok(Bytes::from(bytes))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Trying(usize),
    LocalFallback,
    Succeeded {
        bytes: Bytes,
        media_type: MediaType,
        source: Source,
    },
    Failed,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Trying(i) => write!(f, "Trying({i})"),
            DeliveryState::LocalFallback => f.write_str("LocalFallback"),
            DeliveryState::Succeeded { .. } => f.write_str("Succeeded"),
            DeliveryState::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("rejected payload: {0}")]
    Payload(#[from] PayloadError),
}

impl AttemptError {
    fn diagnostic(&self) -> Option<&str> {
        match self {
            AttemptError::Transport(TransportError::Status { detail, .. }) => Some(detail),
            AttemptError::Transport(_) => None,
            AttemptError::Payload(reason) => reason.diagnostic(),
        }
    }
}

pub struct DeliveryOrchestrator {
    remote: Arc<dyn RemoteGenerator>,
    local: Arc<dyn LocalSynthesizer>,
    timeouts: Timeouts,
    min_payload_bytes: usize,
    paginate: bool,
}

impl DeliveryOrchestrator {
    pub fn new(remote: Arc<dyn RemoteGenerator>, local: Arc<dyn LocalSynthesizer>) -> Self {
        Self {
            remote,
            local,
            timeouts: Timeouts::default(),
            min_payload_bytes: DEFAULT_MIN_PAYLOAD_BYTES,
            paginate: false,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_min_payload_bytes(mut self, min_payload_bytes: usize) -> Self {
        self.min_payload_bytes = min_payload_bytes;
        self
    }

    /// Lets the local fallback split overflowing text across pages.
    pub fn with_pagination(mut self, paginate: bool) -> Self {
        self.paginate = paginate;
        self
    }

    /// Runs one operation over `roster`, which the caller builds fresh.
    ///
    /// Invalid options are rejected before any network call.
    pub async fn run(
        &self,
        op: Operation,
        options: &WorksheetOptions,
        mut roster: EndpointRoster,
    ) -> Result<DeliveryResult, ValidationError> {
        options.validate()?;

        let mut causes: Vec<String> = Vec::new();
        let mut state = DeliveryState::Trying(0);

        loop {
            info!(operation = %op, state = %state, "delivery state");
            state = match state {
                DeliveryState::Trying(i) if i >= roster.len() => {
                    if op.allows_fallback() {
                        DeliveryState::LocalFallback
                    } else {
                        DeliveryState::Failed
                    }
                }
                DeliveryState::Trying(i) => {
                    let endpoint = roster.current().clone();
                    match self.attempt(&endpoint, op, options).await {
                        Ok((bytes, media_type)) => DeliveryState::Succeeded {
                            bytes,
                            media_type,
                            source: Source::Remote(endpoint),
                        },
                        Err(err) => {
                            warn!(
                                operation = %op,
                                endpoint = %endpoint,
                                attempt = i + 1,
                                diagnostic = err.diagnostic().unwrap_or("-"),
                                "attempt rejected: {err}"
                            );
                            causes.push(err.to_string());
                            roster.advance();
                            DeliveryState::Trying(i + 1)
                        }
                    }
                }
                DeliveryState::LocalFallback => {
                    match self.local.synthesize(options, self.paginate).await {
                        Ok(bytes) => DeliveryState::Succeeded {
                            bytes,
                            media_type: MediaType::Pdf,
                            source: Source::Local,
                        },
                        Err(err) => {
                            warn!(operation = %op, "local synthesis failed: {err}");
                            causes.push(format!("local composer: {err}"));
                            DeliveryState::Failed
                        }
                    }
                }
                DeliveryState::Succeeded {
                    bytes,
                    media_type,
                    source,
                } => {
                    info!(
                        operation = %op,
                        source = %source,
                        size = bytes.len(),
                        media_type = media_type.as_str(),
                        "artifact delivered"
                    );
                    return Ok(DeliveryResult::Success {
                        bytes,
                        media_type,
                        source,
                    });
                }
                DeliveryState::Failed => {
                    return Ok(DeliveryResult::Failure(failure(op, roster.len(), causes)));
                }
            };
        }
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        op: Operation,
        options: &WorksheetOptions,
    ) -> Result<(Bytes, MediaType), AttemptError> {
        let timeout = self.timeouts.for_op(op);
        let response = bounded(timeout, endpoint, self.remote.request(endpoint, op, options, timeout))
            .await?;
        match classify(
            response.content_type.as_deref(),
            response.body,
            self.min_payload_bytes,
        ) {
            Classification::Accepted { bytes, media_type } => Ok((bytes, media_type)),
            Classification::Rejected(reason) => Err(AttemptError::Payload(reason)),
        }
    }
}

/// Enforces the per-attempt bound even for generators that ignore it.
async fn bounded<T>(
    timeout: Duration,
    endpoint: &Endpoint,
    call: impl std::future::Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                after: timeout,
            })
        })
}

fn failure(op: Operation, endpoints: usize, causes: Vec<String>) -> DeliveryFailure {
    let message = if op.allows_fallback() {
        format!("Could not generate the worksheet: {endpoints} server(s) and the local composer failed")
    } else {
        format!("Could not build a preview: all {endpoints} server(s) failed")
    };
    DeliveryFailure { message, causes }
}
