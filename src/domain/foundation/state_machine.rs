//! State machine trait for status enums.
//!
//! Subscription payment status and backend integration status both
//! implement this so transition tables live next to the enum.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors list the allowed edges; staying in the same state is
/// always permitted and never counts as a transition.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for IntegrationStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         self == target || self.valid_transitions().contains(target)
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             NotStarted => vec![Pending],
///             Pending => vec![Completed, Failed],
///             // ...
///         }
///     }
/// }
///
/// let next = IntegrationStatus::NotStarted.transition_to(IntegrationStatus::Pending)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if moving from self to target is allowed.
    ///
    /// Implementations must return true for `self == target`.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states other than self.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Closed,
        Open,
        Bricked,
    }

    impl StateMachine for Door {
        fn can_transition_to(&self, target: &Self) -> bool {
            self == target || self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Door::Closed => vec![Door::Open, Door::Bricked],
                Door::Open => vec![Door::Closed],
                Door::Bricked => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_listed_edge() {
        assert_eq!(Door::Closed.transition_to(Door::Open), Ok(Door::Open));
    }

    #[test]
    fn transition_to_fails_for_unlisted_edge() {
        assert!(Door::Open.transition_to(Door::Bricked).is_err());
    }

    #[test]
    fn same_state_is_always_allowed() {
        assert_eq!(Door::Bricked.transition_to(Door::Bricked), Ok(Door::Bricked));
    }

    #[test]
    fn terminal_means_no_outgoing_edges() {
        assert!(Door::Bricked.is_terminal());
        assert!(!Door::Closed.is_terminal());
    }
}
