// Delivery: getting a rendered worksheet to the user through an unreliable
// set of remote generators, with in-process composition as the last resort.
//
// roster → transport → classify, driven by the orchestrator state machine;
// the session guards shared results against stale completions.

pub mod classify;
pub mod orchestrator;
pub mod probe;
pub mod roster;
pub mod session;
pub mod transport;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use orchestrator::{DeliveryFailure, DeliveryOrchestrator, DeliveryResult, Source};
pub use roster::{Endpoint, EndpointRoster};
pub use session::{DeliverySession, Outcome};
pub use transport::HttpGenerator;

/// The two remote operations. Only `Generate` may fall back to local synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Preview,
    Generate,
}

impl Operation {
    /// API path on a remote generator.
    pub fn path(self) -> &'static str {
        match self {
            Operation::Preview => "/api/preview",
            Operation::Generate => "/api/generate-pdf",
        }
    }

    pub fn allows_fallback(self) -> bool {
        matches!(self, Operation::Generate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Preview => "preview",
            Operation::Generate => "generate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attempt time bounds. Generation is heavier, so it gets the longer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub preview: Duration,
    pub generate: Duration,
}

impl Timeouts {
    pub fn for_op(&self, op: Operation) -> Duration {
        match op {
            Operation::Preview => self.preview,
            Operation::Generate => self.generate,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            preview: Duration::from_secs(15),
            generate: Duration::from_secs(45),
        }
    }
}

/// Scripted generators shared by the delivery tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::oneshot;

    use super::orchestrator::{LocalSynthesisError, LocalSynthesizer};
    use super::transport::{RemoteGenerator, RemoteResponse, TransportError};
    use super::{Endpoint, Operation};
    use crate::worksheet::WorksheetOptions;

    pub fn pdf_response(len: usize, marker: &str) -> RemoteResponse {
        let mut body = format!("%PDF-1.7\n% {marker}\n").into_bytes();
        body.resize(len.max(body.len()), b' ');
        RemoteResponse {
            content_type: Some("application/pdf".to_string()),
            body: Bytes::from(body),
        }
    }

    pub enum Script {
        Respond(RemoteResponse),
        Status(u16, &'static str),
        Refuse,
        Hang,
        Wait(oneshot::Receiver<RemoteResponse>),
    }

    /// Pops one scripted behaviour per request and records the endpoints hit.
    #[derive(Default)]
    pub struct ScriptedRemote {
        script: Mutex<VecDeque<Script>>,
        pub calls: Mutex<Vec<(String, Operation)>>,
    }

    impl ScriptedRemote {
        pub fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn hosts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(host, _)| host.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RemoteGenerator for ScriptedRemote {
        async fn request(
            &self,
            endpoint: &Endpoint,
            op: Operation,
            _options: &WorksheetOptions,
            timeout: Duration,
        ) -> Result<RemoteResponse, TransportError> {
            let host = endpoint
                .join("/")
                .host_str()
                .unwrap_or_default()
                .to_string();
            self.calls.lock().unwrap().push((host, op));
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Respond(response)) => Ok(response),
                Some(Script::Status(status, body)) => Err(TransportError::Status {
                    endpoint: endpoint.to_string(),
                    status,
                    detail: body.to_string(),
                }),
                Some(Script::Refuse) | None => Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                }),
                Some(Script::Hang) => {
                    tokio::time::sleep(timeout * 10).await;
                    Err(TransportError::Timeout {
                        endpoint: endpoint.to_string(),
                        after: timeout,
                    })
                }
                Some(Script::Wait(rx)) => rx.await.map_err(|_| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: "abandoned".to_string(),
                }),
            }
        }
    }

    /// Local synthesizer that counts invocations and returns a marker PDF.
    #[derive(Default)]
    pub struct CountingLocal {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingLocal {
        pub fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocalSynthesizer for CountingLocal {
        async fn synthesize(
            &self,
            _options: &WorksheetOptions,
            _paginate: bool,
        ) -> Result<Bytes, LocalSynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LocalSynthesisError::Join("synthesizer crashed".to_string()));
            }
            Ok(pdf_response(4096, "local").body)
        }
    }
}
