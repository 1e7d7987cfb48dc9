//! Connection State Machine
//!
//! Defines the link's states and which lifecycle events may move it between them.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport, or waiting out a reconnect delay
    #[default]
    Disconnected,
    /// A transport is being opened
    Connecting,
    /// Transport open, heartbeat running
    Open,
    /// A deliberate close is in progress
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect was requested, manually or by the reconnect timer
    ConnectRequested,
    /// The transport reported open
    Opened,
    /// The transport could not be created
    ConnectFailed,
    /// A deliberate disconnect was requested
    CloseRequested,
    /// The transport closed, cleanly or not
    Closed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed)
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid { from: ConnectionState, event: LinkEvent },
}

/// The link's state machine
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Force the machine back to Disconnected
    pub fn reset(&mut self) {
        self.current_state = ConnectionState::Disconnected;
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: LinkEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self.current_state, event) {
            (Disconnected | Connecting, ConnectRequested) => Some(Connecting),

            (Connecting, Opened) => Some(Open),
            (Connecting, ConnectFailed) => Some(Disconnected),
            // Aborted before the transport opened
            (Connecting, CloseRequested) => Some(Disconnected),

            (Open, CloseRequested) => Some(Closing),
            (Open | Closing, Closed) => Some(Disconnected),

            // Disconnect is idempotent
            (Disconnected, CloseRequested) => Some(Disconnected),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = ConnectionStateMachine::new();
        assert_eq!(fsm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut fsm = ConnectionStateMachine::new();

        let result = fsm.process_event(LinkEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Connecting));

        let result = fsm.process_event(LinkEvent::Opened);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Open));

        let result = fsm.process_event(LinkEvent::CloseRequested);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Closing));

        let result = fsm.process_event(LinkEvent::Closed);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Disconnected));
    }

    #[test]
    fn test_unexpected_close_from_open() {
        let mut fsm = ConnectionStateMachine::new();
        fsm.process_event(LinkEvent::ConnectRequested);
        fsm.process_event(LinkEvent::Opened);

        let result = fsm.process_event(LinkEvent::Closed);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Disconnected));
    }

    #[test]
    fn test_failed_connect() {
        let mut fsm = ConnectionStateMachine::new();
        fsm.process_event(LinkEvent::ConnectRequested);
        let result = fsm.process_event(LinkEvent::ConnectFailed);
        assert_eq!(result, TransitionResult::Success(ConnectionState::Disconnected));
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = ConnectionStateMachine::new();

        // Can't open without connecting first
        let result = fsm.process_event(LinkEvent::Opened);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut fsm = ConnectionStateMachine::new();
        assert_eq!(
            fsm.process_event(LinkEvent::CloseRequested),
            TransitionResult::Success(ConnectionState::Disconnected)
        );
        assert_eq!(
            fsm.process_event(LinkEvent::CloseRequested),
            TransitionResult::Success(ConnectionState::Disconnected)
        );
    }

    #[test]
    fn test_closing_cannot_reopen() {
        let mut fsm = ConnectionStateMachine::new();
        fsm.process_event(LinkEvent::ConnectRequested);
        fsm.process_event(LinkEvent::Opened);
        fsm.process_event(LinkEvent::CloseRequested);

        let result = fsm.process_event(LinkEvent::Opened);
        assert_eq!(
            result,
            TransitionResult::Invalid {
                from: ConnectionState::Closing,
                event: LinkEvent::Opened,
            }
        );
        assert_eq!(fsm.state(), ConnectionState::Closing);
    }
}
