use serde::{Deserialize, Serialize};

/// Lifecycle of one run.
///
/// `Pending`, `Authorizing` and `Validating` only exist inside
/// `RunController::start`; a run is registered, and observable, from `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pending,
    Authorizing,
    Validating,
    Running,
    Aggregating,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    /// Forward-only transitions; any live phase may fail
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Authorizing)
            | (Authorizing, Validating)
            | (Validating, Running)
            | (Running, Aggregating)
            | (Aggregating, Completed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_linear() {
        let path = [
            RunPhase::Pending,
            RunPhase::Authorizing,
            RunPhase::Validating,
            RunPhase::Running,
            RunPhase::Aggregating,
            RunPhase::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(!RunPhase::Running.can_transition_to(RunPhase::Completed));
        assert!(!RunPhase::Running.can_transition_to(RunPhase::Validating));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        for next in [RunPhase::Running, RunPhase::Failed, RunPhase::Completed] {
            assert!(!RunPhase::Completed.can_transition_to(next));
            assert!(!RunPhase::Failed.can_transition_to(next));
        }
        assert!(RunPhase::Running.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Aggregating.is_terminal());
    }
}
