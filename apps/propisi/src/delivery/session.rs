//! Delivery session: one user's view of the latest preview and document.
//!
//! Every operation takes a ticket. A completion is applied only if its ticket
//! is still the newest for its operation kind, so an abandoned operation can
//! never overwrite the result of a later one. The last successful artifact of
//! each kind stays held until a newer success replaces it; a failure leaves
//! it in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::delivery::{DeliveryOrchestrator, DeliveryResult, EndpointRoster, Operation};
use crate::sink::{present, Artifact, Presentation, SinkError};
use crate::worksheet::{ValidationError, WorksheetOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    op: Operation,
    id: u64,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Applied(Presentation),
    /// Superseded by a newer operation or cancelled; the result was dropped.
    Stale,
}

#[derive(Default)]
struct Shared {
    next_id: u64,
    newest: HashMap<Operation, u64>,
    artifacts: HashMap<Operation, Arc<Artifact>>,
}

impl Shared {
    fn issue(&mut self, op: Operation) -> u64 {
        self.next_id += 1;
        self.newest.insert(op, self.next_id);
        self.next_id
    }

    fn is_newest(&self, ticket: Ticket) -> bool {
        self.newest.get(&ticket.op) == Some(&ticket.id)
    }
}

pub struct DeliverySession {
    orchestrator: Arc<DeliveryOrchestrator>,
    roster: EndpointRoster,
    shared: Mutex<Shared>,
}

impl DeliverySession {
    /// `roster` is the template every operation starts from, cursor 0.
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>, roster: EndpointRoster) -> Self {
        Self {
            orchestrator,
            roster,
            shared: Mutex::new(Shared::default()),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new operation of kind `op`, superseding any in flight.
    pub fn begin(&self, op: Operation) -> Ticket {
        Ticket {
            op,
            id: self.shared().issue(op),
        }
    }

    /// Abandons the in-flight operation of kind `op`; its result will be dropped.
    pub fn cancel(&self, op: Operation) {
        let id = self.shared().issue(op);
        debug!(operation = %op, invalidated_before = id, "operation cancelled");
    }

    /// Applies `result` if `ticket` is still the newest for its kind.
    ///
    /// The preview file is written without holding the lock; the ticket is
    /// checked again before the artifact is stored.
    pub fn complete(&self, ticket: Ticket, result: DeliveryResult) -> Result<Outcome, SinkError> {
        if !self.shared().is_newest(ticket) {
            debug!(
                operation = %ticket.op,
                ticket = ticket.id,
                success = result.is_success(),
                "dropping stale completion"
            );
            return Ok(Outcome::Stale);
        }

        let presentation = present(result)?;

        let mut shared = self.shared();
        if !shared.is_newest(ticket) {
            debug!(operation = %ticket.op, ticket = ticket.id, "superseded while presenting");
            return Ok(Outcome::Stale);
        }
        if let Some(artifact) = presentation.artifact() {
            shared.artifacts.insert(ticket.op, artifact.clone());
        }
        Ok(Outcome::Applied(presentation))
    }

    /// Runs `op` end to end on a fresh roster and applies the result.
    pub async fn run(
        &self,
        op: Operation,
        options: &WorksheetOptions,
    ) -> Result<Result<Outcome, SinkError>, ValidationError> {
        let ticket = self.begin(op);
        let result = self
            .orchestrator
            .run(op, options, self.roster.clone())
            .await?;
        Ok(self.complete(ticket, result))
    }

    /// Last successfully delivered artifact for `op`.
    pub fn artifact(&self, op: Operation) -> Option<Arc<Artifact>> {
        self.shared().artifacts.get(&op).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::{pdf_response, CountingLocal, Script, ScriptedRemote};
    use crate::worksheet::{FillMode, Layout, Orientation, StrokeStyle};
    use tokio::sync::oneshot;

    fn options() -> WorksheetOptions {
        WorksheetOptions::new(
            "Task",
            "a",
            FillMode::OneLine,
            Layout::Cells,
            StrokeStyle::Black,
            Orientation::Portrait,
        )
        .unwrap()
    }

    fn session(remote: Arc<ScriptedRemote>) -> Arc<DeliverySession> {
        let orchestrator = DeliveryOrchestrator::new(remote, Arc::new(CountingLocal::default()));
        Arc::new(DeliverySession::new(
            Arc::new(orchestrator),
            EndpointRoster::parse_list("http://only.test").unwrap(),
        ))
    }

    fn held_bytes(session: &DeliverySession, op: Operation) -> Vec<u8> {
        session.artifact(op).unwrap().bytes().to_vec()
    }

    #[tokio::test]
    async fn test_cancelled_result_never_overwrites_newer_one() {
        let (slow_tx, slow_rx) = oneshot::channel();
        let remote = ScriptedRemote::new(vec![
            Script::Wait(slow_rx),
            Script::Respond(pdf_response(2048, "second")),
        ]);
        let session = session(remote.clone());

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.run(Operation::Generate, &options()).await })
        };
        while remote.call_count() < 1 {
            tokio::task::yield_now().await;
        }

        session.cancel(Operation::Generate);
        let second = session.run(Operation::Generate, &options()).await.unwrap().unwrap();
        assert!(matches!(second, Outcome::Applied(_)));

        // The abandoned request resolves only now.
        slow_tx.send(pdf_response(2048, "first")).unwrap();
        let first = first.await.unwrap().unwrap().unwrap();
        assert!(matches!(first, Outcome::Stale));

        let held = held_bytes(&session, Operation::Generate);
        assert!(String::from_utf8_lossy(&held).contains("second"));
    }

    #[tokio::test]
    async fn test_kinds_are_tracked_independently() {
        let remote = ScriptedRemote::new(vec![
            Script::Respond(pdf_response(1024, "preview")),
            Script::Respond(pdf_response(1024, "document")),
        ]);
        let session = session(remote);

        let preview_ticket = session.begin(Operation::Preview);
        let generate = session.run(Operation::Generate, &options()).await.unwrap().unwrap();
        assert!(matches!(generate, Outcome::Applied(_)));

        // A generate started after the preview does not make the preview stale.
        let preview = session
            .complete(
                preview_ticket,
                DeliveryResult::Success {
                    bytes: pdf_response(1024, "late preview").body,
                    media_type: crate::delivery::classify::MediaType::Pdf,
                    source: crate::delivery::Source::Local,
                },
            )
            .unwrap();
        assert!(matches!(preview, Outcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_superseded_ticket_is_stale_even_on_failure() {
        let session = session(ScriptedRemote::new(vec![]));
        let old = session.begin(Operation::Preview);
        let _new = session.begin(Operation::Preview);

        let outcome = session
            .complete(
                old,
                DeliveryResult::Failure(crate::delivery::DeliveryFailure {
                    message: "late failure".into(),
                    causes: vec![],
                }),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Stale));
        assert!(session.artifact(Operation::Preview).is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_the_last_good_artifact() {
        let remote = ScriptedRemote::new(vec![
            Script::Respond(pdf_response(2048, "good preview")),
            Script::Refuse,
        ]);
        let session = session(remote);

        let first = session.run(Operation::Preview, &options()).await.unwrap().unwrap();
        assert!(matches!(first, Outcome::Applied(Presentation::Ready(_))));

        let second = session.run(Operation::Preview, &options()).await.unwrap().unwrap();
        let Outcome::Applied(Presentation::Failed(failure)) = second else {
            panic!("expected an applied failure");
        };
        assert!(!failure.causes.is_empty());

        let held = held_bytes(&session, Operation::Preview);
        assert!(String::from_utf8_lossy(&held).contains("good preview"));
    }

    #[test]
    fn test_cancel_before_completion_drops_the_result() {
        let session = session(ScriptedRemote::new(vec![]));
        let ticket = session.begin(Operation::Generate);
        session.cancel(Operation::Generate);
        let outcome = session
            .complete(
                ticket,
                DeliveryResult::Success {
                    bytes: pdf_response(1024, "late").body,
                    media_type: crate::delivery::classify::MediaType::Pdf,
                    source: crate::delivery::Source::Local,
                },
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Stale));
        assert!(session.artifact(Operation::Generate).is_none());
    }
}
