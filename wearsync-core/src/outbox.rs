//! Outbox delivery state machine.
//!
//! Pure transition rules for the durable outbox queue. The pump feeds
//! events in and executes the resulting state against the store; the
//! store's SQL guards re-apply the same rules atomically.
//!
//! ```text
//! PENDING ─send→ SENDING ─put.ok→ SENT ─ack→ ACKED
//!    ▲              │
//!    │              └─ stuck timeout ─▶ PENDING
//!    │
//!    └── put.err (attempts left) ── / ── attempts exhausted ─▶ FAILED
//! ```

use wearsync_types::OutboxState;

/// Events observed by the pump for a single outbox entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxEvent {
    /// The pump picked the entry up for sending.
    SendStarted,
    /// The bus accepted the put.
    PutSucceeded,
    /// The bus rejected the put; `attempts_exhausted` is true once the
    /// attempt ceiling is reached.
    PutFailed {
        /// Whether the retry budget is spent.
        attempts_exhausted: bool,
    },
    /// The peer acknowledged the operation.
    AckReceived {
        /// Whether the peer applied it successfully.
        success: bool,
    },
    /// The entry sat in `SENDING` past the stuck threshold.
    StuckTimeout,
}

/// Compute the next state for an outbox entry.
///
/// Invalid combinations leave the state unchanged; the bus is
/// at-least-once, so late or duplicate events are expected.
pub fn transition(state: OutboxState, event: &OutboxEvent) -> OutboxState {
    use OutboxState::*;
    match (state, event) {
        (Pending, OutboxEvent::SendStarted) => Sending,
        (Sending, OutboxEvent::PutSucceeded) => Sent,
        (
            Sending,
            OutboxEvent::PutFailed {
                attempts_exhausted: false,
            },
        ) => Pending,
        (
            Sending,
            OutboxEvent::PutFailed {
                attempts_exhausted: true,
            },
        ) => Failed,
        (Sending, OutboxEvent::StuckTimeout) => Pending,
        // An ack can arrive while we still think we are sending (the put
        // succeeded but the process restarted before mark_sent).
        (Sending | Sent, OutboxEvent::AckReceived { success: true }) => Acked,
        (Sending | Sent, OutboxEvent::AckReceived { success: false }) => Failed,
        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OutboxState::*;

    #[test]
    fn happy_path() {
        let mut state = Pending;
        state = transition(state, &OutboxEvent::SendStarted);
        assert_eq!(state, Sending);
        state = transition(state, &OutboxEvent::PutSucceeded);
        assert_eq!(state, Sent);
        state = transition(state, &OutboxEvent::AckReceived { success: true });
        assert_eq!(state, Acked);
    }

    #[test]
    fn put_failure_returns_to_pending() {
        let state = transition(
            Sending,
            &OutboxEvent::PutFailed {
                attempts_exhausted: false,
            },
        );
        assert_eq!(state, Pending);
    }

    #[test]
    fn exhausted_attempts_fail() {
        let state = transition(
            Sending,
            &OutboxEvent::PutFailed {
                attempts_exhausted: true,
            },
        );
        assert_eq!(state, Failed);
    }

    #[test]
    fn stuck_send_resets_to_pending() {
        assert_eq!(transition(Sending, &OutboxEvent::StuckTimeout), Pending);
    }

    #[test]
    fn nack_fails_the_entry() {
        assert_eq!(
            transition(Sent, &OutboxEvent::AckReceived { success: false }),
            Failed
        );
    }

    #[test]
    fn ack_while_sending_is_accepted() {
        assert_eq!(
            transition(Sending, &OutboxEvent::AckReceived { success: true }),
            Acked
        );
    }

    #[test]
    fn terminal_states_ignore_events() {
        for event in [
            OutboxEvent::SendStarted,
            OutboxEvent::PutSucceeded,
            OutboxEvent::StuckTimeout,
            OutboxEvent::AckReceived { success: true },
        ] {
            assert_eq!(transition(Acked, &event), Acked);
            assert_eq!(transition(Failed, &event), Failed);
        }
    }

    #[test]
    fn duplicate_ack_is_idempotent() {
        let state = transition(Sent, &OutboxEvent::AckReceived { success: true });
        let state = transition(state, &OutboxEvent::AckReceived { success: true });
        assert_eq!(state, Acked);
    }
}
