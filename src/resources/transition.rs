//! Outcome of the lifecycle work an `on`/`off` call triggered.

use crate::error::{BindingError, BusError, Result};
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

enum State {
    /// Nothing was issued, or the outcome was already taken.
    Settled,
    /// Work could not be issued at all.
    Failed(BusError),
    /// An enable or disable is in flight.
    Pending {
        resource: String,
        receiver: oneshot::Receiver<std::result::Result<(), BindingError>>,
    },
}

/// Resolves once the enable or disable triggered by a subscription change
/// has completed.
///
/// Dropping a `Transition` does not cancel anything; the lifecycle keeps
/// running and failures are still logged.
pub struct Transition {
    state: State,
}

impl Transition {
    /// A transition that issued no work.
    pub fn settled() -> Self {
        Self {
            state: State::Settled,
        }
    }

    pub(crate) fn failed(error: BusError) -> Self {
        Self {
            state: State::Failed(error),
        }
    }

    pub(crate) fn pending(
        resource: String,
        receiver: oneshot::Receiver<std::result::Result<(), BindingError>>,
    ) -> Self {
        Self {
            state: State::Pending { resource, receiver },
        }
    }

    /// Whether this call issued an enable or disable.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending { .. })
    }

    /// Non-blocking check. Returns `None` while the work is still in flight.
    pub fn try_outcome(&mut self) -> Option<Result<()>> {
        let outcome = match &mut self.state {
            State::Settled => return Some(Ok(())),
            State::Failed(_) => None,
            State::Pending { resource, receiver } => match receiver.try_recv() {
                Ok(None) => return None,
                Ok(Some(result)) => Some(Self::map_result(resource, result)),
                Err(oneshot::Canceled) => Some(Err(BusError::Abandoned(resource.clone()))),
            },
        };
        Some(self.finish(outcome))
    }

    fn map_result(
        resource: &str,
        result: std::result::Result<(), BindingError>,
    ) -> Result<()> {
        result.map_err(|source| BusError::Binding {
            resource: resource.to_string(),
            source,
        })
    }

    /// Move to `Settled`, yielding either the computed outcome or the stored
    /// failure.
    fn finish(&mut self, outcome: Option<Result<()>>) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Settled) {
            State::Failed(error) => Err(error),
            _ => outcome.unwrap_or(Ok(())),
        }
    }
}

impl Future for Transition {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match &mut self.state {
            State::Settled => return Poll::Ready(Ok(())),
            State::Failed(_) => None,
            State::Pending { resource, receiver } => match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(result)) => Some(Self::map_result(resource, result)),
                Poll::Ready(Err(oneshot::Canceled)) => {
                    Some(Err(BusError::Abandoned(resource.clone())))
                }
            },
        };
        Poll::Ready(self.finish(outcome))
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Settled => "settled",
            State::Failed(_) => "failed",
            State::Pending { .. } => "pending",
        };
        f.debug_struct("Transition").field("state", &state).finish()
    }
}
