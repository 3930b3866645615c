//! Dispatcher lifecycle state and run summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Dispatcher lifecycle.
///
/// Idle ⇄ Dispatching → ShuttingDown → Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Idle,
    Dispatching,
    ShuttingDown,
    Terminated,
}

impl DispatcherState {
    /// Whether new events are accepted in this state.
    pub fn is_accepting(self) -> bool {
        matches!(self, DispatcherState::Idle | DispatcherState::Dispatching)
    }

    pub fn is_terminal(self) -> bool {
        self == DispatcherState::Terminated
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: DispatcherState) -> bool {
        match (self, to) {
            (DispatcherState::Idle, DispatcherState::Dispatching) => true,
            (DispatcherState::Dispatching, DispatcherState::Idle) => true,
            (DispatcherState::Idle, DispatcherState::ShuttingDown) => true,
            (DispatcherState::Dispatching, DispatcherState::ShuttingDown) => true,
            (DispatcherState::ShuttingDown, DispatcherState::Terminated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "idle"),
            DispatcherState::Dispatching => write!(f, "dispatching"),
            DispatcherState::ShuttingDown => write!(f, "shutting_down"),
            DispatcherState::Terminated => write!(f, "terminated"),
        }
    }
}

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// The host sent `extension.terminate`.
    Terminate,
    /// The inbound side of the transport closed.
    ChannelClosed,
    /// [`ShutdownHandle::shutdown`] was called.
    Requested,
}

/// Requests a graceful dispatcher shutdown from outside the control path
/// (signal handlers, embedders).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Counters returned by [`Dispatcher::dispatch`](super::Dispatcher::dispatch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Events read from the channel, accepted or not.
    pub events_received: u64,
    /// Events handed to a registered handler.
    pub dispatched: u64,
    /// Events with no registered handler.
    pub ignored: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Events that arrived after shutdown started.
    pub dropped_during_shutdown: u64,
    pub intent_replies: u64,
    /// Handlers (running or backlogged) abandoned when the grace period ran out.
    pub abandoned: u64,
    pub grace_expired: bool,
    pub shutdown_reason: Option<ShutdownReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use DispatcherState::*;
        assert!(Idle.can_transition_to(Dispatching));
        assert!(Dispatching.can_transition_to(Idle));
        assert!(Dispatching.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Terminated));

        assert!(!Terminated.can_transition_to(Idle));
        assert!(!ShuttingDown.can_transition_to(Dispatching));
        assert!(!Idle.can_transition_to(Terminated));
    }

    #[test]
    fn test_accepting_states() {
        assert!(DispatcherState::Idle.is_accepting());
        assert!(DispatcherState::Dispatching.is_accepting());
        assert!(!DispatcherState::ShuttingDown.is_accepting());
        assert!(DispatcherState::Terminated.is_terminal());
        assert_eq!(DispatcherState::ShuttingDown.to_string(), "shutting_down");
    }

    #[test]
    fn test_shutdown_handle_shares_token() {
        let token = CancellationToken::new();
        let handle = ShutdownHandle::new(token.clone());
        let clone = handle.clone();
        assert!(!handle.is_shutdown_requested());
        clone.shutdown();
        assert!(handle.is_shutdown_requested());
        assert!(token.is_cancelled());
    }
}
