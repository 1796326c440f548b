//! State, cancellation and message inbox shared by every negotiation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tandem_common::{NegotiationId, PeerId};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::NegotiationRegistry;
use super::{
    CancelOption, CancelledBy, Direction, NegotiationKind, NegotiationOutcome,
    NegotiationRecord, NegotiationState,
};
use crate::progress::ProgressMonitor;
use crate::protocol::NegotiationMessage;
use crate::transport::Transport;

/// Why a negotiation step stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Abort {
    /// A local cancel was requested (by the user, the manager or a timeout).
    Cancelled,
    /// The peer cancelled.
    Remote(String),
    /// Protocol or I/O failure.
    Failed(String),
}

struct Inner {
    state: NegotiationState,
    outcome: Option<NegotiationOutcome>,
    /// A task is driving the negotiation's steps.
    running: bool,
    cancel: Option<(String, CancelOption)>,
    remote_cancel: Option<String>,
}

/// Identity, state and cancellation of one negotiation.
///
/// The registry only holds a weak reference to it. Dropping the last strong
/// reference to a negotiation that never finished removes it from the
/// registry, so an abandoned negotiation cannot stall shutdown.
pub struct NegotiationHandle {
    id: NegotiationId,
    peer: PeerId,
    kind: NegotiationKind,
    direction: Direction,
    inner: Mutex<Inner>,
    token: CancellationToken,
    state_tx: watch::Sender<NegotiationState>,
    inbox_tx: mpsc::UnboundedSender<NegotiationMessage>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<NegotiationMessage>>,
    transport: Arc<dyn Transport>,
    registry: Arc<NegotiationRegistry>,
    poll_interval: Duration,
}

impl NegotiationHandle {
    /// Create a negotiation and add it to `registry`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register(
        registry: &Arc<NegotiationRegistry>,
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
        id: NegotiationId,
        peer: PeerId,
        kind: NegotiationKind,
        direction: Direction,
        initial: NegotiationState,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(initial);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            id,
            peer,
            kind,
            direction,
            inner: Mutex::new(Inner {
                state: initial,
                outcome: None,
                running: false,
                cancel: None,
                remote_cancel: None,
            }),
            token: CancellationToken::new(),
            state_tx,
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            transport,
            registry: Arc::clone(registry),
            poll_interval,
        });
        registry.add(&handle);
        debug!(
            negotiation_id = %handle.id,
            peer = %handle.peer,
            kind = ?kind,
            direction = ?direction,
            "Negotiation registered"
        );
        handle
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- observation --

    pub fn id(&self) -> &NegotiationId {
        &self.id
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn kind(&self) -> NegotiationKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> NegotiationState {
        self.lock().state
    }

    pub fn outcome(&self) -> Option<NegotiationOutcome> {
        self.lock().outcome.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().outcome.is_some()
    }

    pub fn record(&self) -> NegotiationRecord {
        NegotiationRecord {
            id: self.id.clone(),
            peer: self.peer.clone(),
            kind: self.kind,
            direction: self.direction,
            state: self.state(),
        }
    }

    /// Resolves once the negotiation is terminal and deregistered.
    pub async fn wait_terminal(&self) -> NegotiationOutcome {
        let mut rx = self.state_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.outcome().unwrap_or_else(|| NegotiationOutcome::Failed {
            reason: "negotiation state lost".into(),
        })
    }

    // -- cancellation --

    /// Cancel the negotiation. A no-op once terminal or already cancelling.
    ///
    /// An idle negotiation terminates right away. A running one is woken and
    /// terminates from its own task at its next suspension point.
    pub async fn local_cancel(&self, reason: impl Into<String>, option: CancelOption) {
        let reason = reason.into();
        let idle = {
            let mut inner = self.lock();
            if inner.outcome.is_some() || inner.cancel.is_some() {
                return;
            }
            debug!(negotiation_id = %self.id, reason = %reason, ?option, "Cancel requested");
            inner.cancel = Some((reason, option));
            !inner.running
        };
        self.token.cancel();
        if idle {
            self.finish_cancel().await;
        }
    }

    /// Record a cancel request without finishing it. The running task picks
    /// it up at its next suspension point.
    pub(crate) fn request_cancel(&self, reason: impl Into<String>, option: CancelOption) {
        {
            let mut inner = self.lock();
            if inner.outcome.is_some() || inner.cancel.is_some() {
                return;
            }
            inner.cancel = Some((reason.into(), option));
        }
        self.token.cancel();
    }

    async fn finish_cancel(&self) {
        let (reason, option) = self
            .lock()
            .cancel
            .clone()
            .unwrap_or_else(|| ("cancelled".to_string(), CancelOption::SilentlyCancel));
        if option == CancelOption::NotifyPeer && !self.is_terminal() {
            self.notify_peer_cancelled(&reason).await;
        }
        self.terminate(NegotiationOutcome::Cancelled {
            reason,
            by: CancelledBy::Local,
        });
    }

    async fn notify_peer_cancelled(&self, reason: &str) {
        let message = NegotiationMessage::Cancel {
            negotiation_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if let Err(e) = self.transport.send(&self.peer, message).await {
            warn!(negotiation_id = %self.id, peer = %self.peer, error = %e, "Failed to send cancellation");
        }
    }

    // -- state transitions --

    /// Claim the negotiation for a driving task. Returns false if it already
    /// runs, ended, or was cancelled before it started.
    pub(crate) fn begin_run(&self) -> bool {
        let mut inner = self.lock();
        if inner.running || inner.outcome.is_some() || inner.cancel.is_some() {
            return false;
        }
        inner.running = true;
        true
    }

    pub(crate) fn set_state(&self, state: NegotiationState) {
        {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return;
            }
            inner.state = state;
        }
        debug!(negotiation_id = %self.id, state = %state, "Negotiation state changed");
        self.state_tx.send_replace(state);
    }

    /// Enter a terminal state. Only the first call has any effect.
    /// Deregistration happens before waiters are woken.
    pub(crate) fn terminate(&self, outcome: NegotiationOutcome) -> bool {
        let state = outcome.state();
        {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return false;
            }
            inner.state = state;
            inner.running = false;
            inner.outcome = Some(outcome.clone());
        }
        self.token.cancel();
        self.registry.remove(&self.id);
        match &outcome {
            NegotiationOutcome::Completed => {
                info!(negotiation_id = %self.id, peer = %self.peer, kind = ?self.kind, "Negotiation completed");
            }
            NegotiationOutcome::Cancelled { reason, by } => {
                info!(negotiation_id = %self.id, peer = %self.peer, reason = %reason, by = ?by, "Negotiation cancelled");
            }
            NegotiationOutcome::Failed { reason } => {
                warn!(negotiation_id = %self.id, peer = %self.peer, reason = %reason, "Negotiation failed");
            }
        }
        self.state_tx.send_replace(state);
        true
    }

    /// Turn the result of a negotiation's steps into its terminal state.
    pub(crate) async fn conclude(&self, result: Result<(), Abort>) -> NegotiationOutcome {
        match result {
            Ok(()) => {
                self.terminate(NegotiationOutcome::Completed);
            }
            Err(Abort::Cancelled) => self.finish_cancel().await,
            Err(Abort::Remote(reason)) => {
                self.terminate(NegotiationOutcome::Cancelled {
                    reason,
                    by: CancelledBy::Remote,
                });
            }
            Err(Abort::Failed(reason)) => {
                if !self.is_terminal() {
                    self.notify_peer_cancelled(&reason).await;
                }
                self.terminate(NegotiationOutcome::Failed { reason });
            }
        }
        self.outcome().unwrap_or(NegotiationOutcome::Completed)
    }

    // -- inbound messages --

    /// Hand a routed message to this negotiation.
    pub(crate) fn deliver(&self, message: NegotiationMessage) {
        if let NegotiationMessage::Cancel { reason, .. } = message {
            self.deliver_cancel(reason);
            return;
        }
        if self.is_terminal() {
            debug!(negotiation_id = %self.id, kind = message.name(), "Dropping message for finished negotiation");
            return;
        }
        let _ = self.inbox_tx.send(message);
    }

    fn deliver_cancel(&self, reason: String) {
        let idle = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return;
            }
            if inner.running {
                inner.remote_cancel.get_or_insert(reason.clone());
            }
            !inner.running
        };
        if idle {
            self.terminate(NegotiationOutcome::Cancelled {
                reason,
                by: CancelledBy::Remote,
            });
        } else {
            self.token.cancel();
        }
    }

    fn abort_reason(&self) -> Abort {
        let inner = self.lock();
        if inner.cancel.is_some() {
            Abort::Cancelled
        } else if let Some(reason) = &inner.remote_cancel {
            Abort::Remote(reason.clone())
        } else {
            Abort::Cancelled
        }
    }

    /// Fail fast if the negotiation has been cancelled from anywhere.
    pub(crate) fn checkpoint(&self, monitor: &dyn ProgressMonitor) -> Result<(), Abort> {
        if monitor.is_cancelled() {
            self.request_cancel("cancelled by user", CancelOption::NotifyPeer);
        }
        if self.token.is_cancelled() {
            return Err(self.abort_reason());
        }
        Ok(())
    }

    /// Wait for the next message from the peer.
    ///
    /// Times out into a local cancel that notifies the peer. The monitor is
    /// polled while waiting.
    pub(crate) async fn next_message(
        &self,
        timeout: Duration,
        monitor: &dyn ProgressMonitor,
        waiting_for: &str,
    ) -> Result<NegotiationMessage, Abort> {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox_rx.lock().await;
        let mut tick = tokio::time::interval(self.poll_interval);
        loop {
            self.checkpoint(monitor)?;
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(self.abort_reason()),
                message = inbox.recv() => {
                    return message.ok_or_else(|| Abort::Failed("negotiation inbox closed".into()));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.request_cancel(
                        format!("timed out waiting for {waiting_for}"),
                        CancelOption::NotifyPeer,
                    );
                    return Err(Abort::Cancelled);
                }
                _ = tick.tick() => {}
            }
        }
    }
}

impl Drop for NegotiationHandle {
    fn drop(&mut self) {
        let finished = self
            .inner
            .get_mut()
            .map(|inner| inner.outcome.is_some())
            .unwrap_or(false);
        if !finished {
            debug!(negotiation_id = %self.id, "Negotiation dropped before finishing");
            self.registry.remove(&self.id);
        }
    }
}

/// Failure for a message that does not fit the current step.
pub(crate) fn unexpected(message: &NegotiationMessage, waiting_for: &str) -> Abort {
    Abort::Failed(format!(
        "unexpected {} while waiting for {waiting_for}",
        message.name()
    ))
}
