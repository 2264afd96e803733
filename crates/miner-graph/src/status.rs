//! Method status lifecycle

use crate::error::GraphError;
use miner_protocol::MethodStatus;

/// Validates a method status transition.
///
/// Re-entering the current status is accepted as a no-op. Illegal
/// transitions panic under the `strict-debug` feature.
pub fn validate_transition(from: MethodStatus, to: MethodStatus) -> Result<(), GraphError> {
    if from == to || allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal method status transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(GraphError::IllegalTransition { from, to })
    }
}

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: MethodStatus) -> Vec<MethodStatus> {
    use MethodStatus::{Error, Finished, InQueue, Training};
    match from {
        InQueue => vec![Training, Finished, Error],
        Training => vec![Finished, Error],
        Finished | Error => vec![],
    }
}

fn allowed(from: MethodStatus, to: MethodStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use MethodStatus::{Error, Finished, InQueue, Training};

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(validate_transition(InQueue, Training).is_ok());
        assert!(validate_transition(InQueue, Finished).is_ok());
        assert!(validate_transition(Training, Finished).is_ok());
        assert!(validate_transition(Training, Error).is_ok());
    }

    #[test]
    fn same_status_is_noop() {
        assert!(validate_transition(Training, Training).is_ok());
        assert!(validate_transition(Finished, Finished).is_ok());
    }

    #[cfg(not(feature = "strict-debug"))]
    #[test]
    fn terminal_statuses_never_move() {
        for to in [InQueue, Training, Error] {
            assert!(matches!(
                validate_transition(Finished, to),
                Err(GraphError::IllegalTransition { .. })
            ));
        }
        assert!(validate_transition(Error, Training).is_err());
        assert!(validate_transition(Training, InQueue).is_err());
    }
}
