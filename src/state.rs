//! Session finite-state-machine types.
//!
//! The two sides of a connection run different, asymmetric state machines:
//! the client drives the handshake and the first half of the teardown, the
//! server answers both.  Transitions are implemented in
//! [`crate::client`] and [`crate::server`]; this module only defines the
//! states so they can be logged and asserted on without pulling in session
//! plumbing.

/// States of the client session.
///
/// ```text
/// INIT ──SYN sent──▶ SYN_SENT ──SYN-ACK──▶ ESTABLISHED
///                                               │ FIN sent
///                                               ▼
/// CLOSED ◀──linger──  TIME_WAIT ◀──peer FIN── FIN_WAIT_2 ◀──ACK── FIN_WAIT_1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection attempt yet; initial state.
    Init,
    /// SYN sent; waiting for SYN-ACK (resending SYN on timeout).
    SynSent,
    /// Handshake complete; data transfer in progress.
    Established,
    /// FIN sent; waiting for its ACK (resending FIN on timeout).
    FinWait1,
    /// FIN acknowledged; waiting for the peer's FIN.
    FinWait2,
    /// Final ACK sent; lingering to re-answer a retransmitted peer FIN.
    TimeWait,
    /// Session finished.
    Closed,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::Init
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// States of a server-side session handler.
///
/// ```text
/// LISTEN ──SYN──▶ SYN_RECEIVED ──ACK──▶ ESTABLISHED ──FIN──▶ FIN_WAIT ──final ACK──▶ CLOSED
/// ```
///
/// `FIN_WAIT` also reaches `CLOSED` when the FIN retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for the peer's SYN; initial state.
    Listen,
    /// SYN seen, SYN-ACK sent; waiting for the handshake ACK.
    SynReceived,
    /// Handshake complete; accepting in-order data.
    Established,
    /// Own FIN sent; waiting for the final ACK, retrying on a timer.
    FinWait,
    /// Session finished; the handler stops.
    Closed,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::Listen
    }
}

impl ServerState {
    /// `true` once the handshake has completed and until the handler closes.
    pub fn is_established(self) -> bool {
        matches!(self, Self::Established | Self::FinWait)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_initial_states() {
        assert_eq!(ClientState::default(), ClientState::Init);
        assert_eq!(ServerState::default(), ServerState::Listen);
    }

    #[test]
    fn established_covers_data_and_teardown_phases() {
        assert!(!ServerState::Listen.is_established());
        assert!(!ServerState::SynReceived.is_established());
        assert!(ServerState::Established.is_established());
        assert!(ServerState::FinWait.is_established());
        assert!(!ServerState::Closed.is_established());
    }
}
