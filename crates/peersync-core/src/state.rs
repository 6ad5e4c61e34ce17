//! Session lifecycle states and the edges between them.
//!
//! ```text
//! IDLE -> SEARCHING -> PAIRING -> PREPARING_SEND     -> SENDING   -> UP_TO_DATE        -> DISCONNECTED
//!                          |   \-> WAITING_TO_RECEIVE -> RECEIVING -> TRANSFER_COMPLETE -/
//!                          \-> PAIRING_FAILED -> IDLE
//! any (except CANCELLED) -> CANCELLED
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::manifest::{DATA_UP_TO_DATE, SYNC_COMPLETE};

/// Which side of the transfer this device plays. Fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    Sender,
    Receiver,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Sender => f.write_str("sender"),
            DeviceRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalOutcome {
    /// At least one batch was transferred.
    TransferComplete,
    /// Nothing was owed.
    DataUpToDate,
}

impl TerminalOutcome {
    /// Reserved collection name of the matching terminal manifest.
    pub fn marker(&self) -> &'static str {
        match self {
            TerminalOutcome::TransferComplete => SYNC_COMPLETE,
            TerminalOutcome::DataUpToDate => DATA_UP_TO_DATE,
        }
    }

    /// Session state entered once this outcome is processed.
    pub fn state(&self) -> SessionState {
        match self {
            TerminalOutcome::TransferComplete => SessionState::TransferComplete,
            TerminalOutcome::DataUpToDate => SessionState::UpToDate,
        }
    }
}

/// Lifecycle of a single sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Searching,
    Pairing,
    PairingFailed,
    PreparingSend,
    WaitingToReceive,
    Sending,
    Receiving,
    UpToDate,
    TransferComplete,
    Cancelled,
    Disconnected,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Cancelled {
            return self != Cancelled;
        }

        match (self, next) {
            (Idle, Searching) => true,
            (Searching, Pairing) | (Searching, Idle) => true,
            // Peer-initiated pairing lands the non-initiating side here directly.
            (Searching, WaitingToReceive) => true,
            (Pairing, PreparingSend) | (Pairing, WaitingToReceive) | (Pairing, PairingFailed) => {
                true
            }
            (PairingFailed, Idle) => true,
            (PreparingSend, Sending) => true,
            (WaitingToReceive, Receiving) => true,
            (Sending, UpToDate) | (Sending, TransferComplete) => true,
            (Receiving, UpToDate) | (Receiving, TransferComplete) => true,
            (UpToDate, Disconnected) | (TransferComplete, Disconnected) => true,
            (from, Disconnected) if from.is_connected() => true,
            (Disconnected, Idle) | (Cancelled, Idle) => true,
            _ => false,
        }
    }

    /// Validate an edge, returning the target state.
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition { from: self, to: next })
        }
    }

    /// States in which a paired link is (or is being) held.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::PreparingSend
                | SessionState::WaitingToReceive
                | SessionState::Sending
                | SessionState::Receiving
        )
    }

    /// States from which a new session may be started after `reset`.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::PairingFailed
                | SessionState::Cancelled
                | SessionState::Disconnected
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "IDLE",
            SessionState::Searching => "SEARCHING",
            SessionState::Pairing => "PAIRING",
            SessionState::PairingFailed => "PAIRING_FAILED",
            SessionState::PreparingSend => "PREPARING_SEND",
            SessionState::WaitingToReceive => "WAITING_TO_RECEIVE",
            SessionState::Sending => "SENDING",
            SessionState::Receiving => "RECEIVING",
            SessionState::UpToDate => "UP_TO_DATE",
            SessionState::TransferComplete => "TRANSFER_COMPLETE",
            SessionState::Cancelled => "CANCELLED",
            SessionState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 12] = [
        Idle,
        Searching,
        Pairing,
        PairingFailed,
        PreparingSend,
        WaitingToReceive,
        Sending,
        Receiving,
        UpToDate,
        TransferComplete,
        Cancelled,
        Disconnected,
    ];

    #[test]
    fn test_sender_happy_path() {
        let path = [
            Idle,
            Searching,
            Pairing,
            PreparingSend,
            Sending,
            TransferComplete,
            Disconnected,
            Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_receiver_happy_path() {
        let path = [Idle, Searching, WaitingToReceive, Receiving, UpToDate, Disconnected];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_pairing_failure_returns_to_idle() {
        assert!(Pairing.can_transition_to(PairingFailed));
        assert!(PairingFailed.can_transition_to(Idle));
        assert!(!PairingFailed.can_transition_to(Sending));
    }

    #[test]
    fn test_cancel_from_anywhere_but_cancelled() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Cancelled), state != Cancelled);
        }
        assert!(!Cancelled.can_transition_to(Disconnected));
        assert!(Cancelled.can_transition_to(Idle));
    }

    #[test]
    fn test_failures_disconnect_only_when_connected() {
        assert!(Sending.can_transition_to(Disconnected));
        assert!(WaitingToReceive.can_transition_to(Disconnected));
        assert!(!Searching.can_transition_to(Disconnected));
        assert!(!Idle.can_transition_to(Disconnected));
    }

    #[test]
    fn test_roles_do_not_cross() {
        assert!(!PreparingSend.can_transition_to(Receiving));
        assert!(!WaitingToReceive.can_transition_to(Sending));
        assert!(Sending.transition(Receiving).is_err());
    }

    #[test]
    fn test_outcome_maps_to_state() {
        assert_eq!(TerminalOutcome::DataUpToDate.state(), UpToDate);
        assert_eq!(TerminalOutcome::TransferComplete.marker(), SYNC_COMPLETE);
        assert_eq!(WaitingToReceive.to_string(), "WAITING_TO_RECEIVE");
    }
}
