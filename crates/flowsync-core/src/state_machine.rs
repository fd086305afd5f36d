//! Queue-row status state machine.
//!
//! The status IDs match the 1-based seed order of the `queue_statuses`
//! lookup table. They are intentionally duplicated here as raw `i16`s
//! because this crate must keep zero internal dependencies.

/// Returns the set of valid target status IDs reachable from `from_status`.
///
/// Normal flow is `Pending (1) -> Processing (2) -> Done (3) | Failed (4)`.
/// The single back-edge, `Processing -> Pending`, exists only for the
/// stale-lock scavenger that reclaims rows abandoned by a crashed worker.
pub fn valid_transitions(from_status: i16) -> &'static [i16] {
    match from_status {
        // Pending -> Processing
        1 => &[2],
        // Processing -> Done, Failed, Pending (stale-lock reclaim)
        2 => &[3, 4, 1],
        // Terminal states: Done, Failed
        3 | 4 => &[],
        // Unknown status: no transitions allowed
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: i16, to: i16) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning an error message for invalid ones.
pub fn validate_transition(from: i16, to: i16) -> Result<(), String> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(format!(
            "Invalid queue transition: {} ({from}) -> {} ({to})",
            status_name(from),
            status_name(to)
        ))
    }
}

/// Human-readable name for a status ID (for error messages).
fn status_name(id: i16) -> &'static str {
    match id {
        1 => "Pending",
        2 => "Processing",
        3 => "Done",
        4 => "Failed",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_processing() {
        assert!(can_transition(1, 2));
    }

    #[test]
    fn processing_to_done_and_failed() {
        assert!(can_transition(2, 3));
        assert!(can_transition(2, 4));
    }

    #[test]
    fn processing_back_to_pending_for_reclaim() {
        assert!(can_transition(2, 1));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(valid_transitions(3).is_empty());
        assert!(valid_transitions(4).is_empty());
    }

    #[test]
    fn no_skipping_the_processing_state() {
        assert!(!can_transition(1, 3));
        assert!(!can_transition(1, 4));
    }

    #[test]
    fn done_cannot_fail_afterwards() {
        assert!(!can_transition(3, 4));
    }

    #[test]
    fn validate_transition_err_is_descriptive() {
        let err = validate_transition(3, 2).unwrap_err();
        assert!(err.contains("Done"));
        assert!(err.contains("Processing"));
    }

    #[test]
    fn unknown_status_has_no_transitions() {
        assert!(valid_transitions(99).is_empty());
    }
}
