use std::fmt;

use thiserror::Error;

use crate::dao::models::SessionStatus;

/// Events that move a session through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Creator starts the session (idempotent once active).
    Start,
    /// A second participant registered on a planned session.
    AutoActivate,
    /// Creator ends the session.
    End,
    /// Creator reopens a closed session.
    Reopen,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Start => "start",
            SessionEvent::AutoActivate => "auto-activate",
            SessionEvent::End => "end",
            SessionEvent::Reopen => "reopen",
        };
        f.write_str(name)
    }
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {event} a session that is {from}")]
pub struct InvalidTransition {
    /// Status the session was in when the event was received.
    pub from: SessionStatus,
    /// The rejected event.
    pub event: SessionEvent,
}

/// Compute the status reached by applying `event` to a session in `from`.
///
/// `planned -> active -> closed` with `closed -> active` as the only way back.
pub fn compute_transition(
    from: SessionStatus,
    event: SessionEvent,
) -> Result<SessionStatus, InvalidTransition> {
    let next = match (from, event) {
        (SessionStatus::Planned | SessionStatus::Active, SessionEvent::Start) => {
            SessionStatus::Active
        }
        (SessionStatus::Planned, SessionEvent::AutoActivate) => SessionStatus::Active,
        (SessionStatus::Active, SessionEvent::End) => SessionStatus::Closed,
        (SessionStatus::Closed, SessionEvent::Reopen) => SessionStatus::Active,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(from: SessionStatus, event: SessionEvent) -> SessionStatus {
        compute_transition(from, event).unwrap()
    }

    #[test]
    fn full_lifecycle_with_reopen() {
        let mut status = SessionStatus::Planned;

        status = apply(status, SessionEvent::Start);
        assert_eq!(status, SessionStatus::Active);
        status = apply(status, SessionEvent::End);
        assert_eq!(status, SessionStatus::Closed);
        status = apply(status, SessionEvent::Reopen);
        assert_eq!(status, SessionStatus::Active);
        status = apply(status, SessionEvent::End);
        assert_eq!(status, SessionStatus::Closed);
    }

    #[test]
    fn start_is_idempotent_while_active() {
        assert_eq!(
            apply(SessionStatus::Active, SessionEvent::Start),
            SessionStatus::Active
        );
    }

    #[test]
    fn auto_activation_only_applies_to_planned() {
        assert_eq!(
            apply(SessionStatus::Planned, SessionEvent::AutoActivate),
            SessionStatus::Active
        );
        assert!(compute_transition(SessionStatus::Active, SessionEvent::AutoActivate).is_err());
        assert!(compute_transition(SessionStatus::Closed, SessionEvent::AutoActivate).is_err());
    }

    #[test]
    fn planned_session_cannot_skip_to_closed() {
        let err = compute_transition(SessionStatus::Planned, SessionEvent::End).unwrap_err();
        assert_eq!(err.from, SessionStatus::Planned);
        assert_eq!(err.to_string(), "cannot end a session that is planned");
    }

    #[test]
    fn reopen_requires_closed() {
        for from in [SessionStatus::Planned, SessionStatus::Active] {
            let err = compute_transition(from, SessionEvent::Reopen).unwrap_err();
            assert_eq!(err.from, from);
            assert_eq!(err.event, SessionEvent::Reopen);
        }
    }

    #[test]
    fn closed_session_cannot_be_started_or_ended() {
        assert!(compute_transition(SessionStatus::Closed, SessionEvent::Start).is_err());
        let err = compute_transition(SessionStatus::Closed, SessionEvent::End).unwrap_err();
        assert_eq!(err.to_string(), "cannot end a session that is closed");
    }
}
