//! Per-table lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a table is in its migration.
///
/// Transitions only move forward: `Init → Started → StepComplete(n) →
/// Success`, with `Error` reachable from any non-terminal state. Step
/// numbers strictly increase. Once `Success` or `Error` is reached the state
/// is frozen for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state", content = "step")]
pub enum PhaseState {
    #[default]
    Init,
    Started,
    StepComplete(u32),
    Success,
    Error,
}

impl PhaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseState::Success | PhaseState::Error)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_advance_to(self, next: PhaseState) -> bool {
        use PhaseState::*;
        match (self, next) {
            (Success | Error, _) => false,
            (_, Error) => true,
            (Init, Started) => true,
            (Started, StepComplete(_)) | (Started, Success) => true,
            (StepComplete(current), StepComplete(n)) => n > current,
            (StepComplete(_), Success) => true,
            _ => false,
        }
    }

    /// Apply `next` if it is a legal transition. Returns whether it was applied.
    pub fn advance(&mut self, next: PhaseState) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseState::Init => write!(f, "INIT"),
            PhaseState::Started => write!(f, "STARTED"),
            PhaseState::StepComplete(n) => write!(f, "STEP_COMPLETE({n})"),
            PhaseState::Success => write!(f, "SUCCESS"),
            PhaseState::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut phase = PhaseState::default();
        assert!(phase.advance(PhaseState::Started));
        assert!(phase.advance(PhaseState::StepComplete(1)));
        assert!(phase.advance(PhaseState::StepComplete(2)));
        assert!(phase.advance(PhaseState::Success));
        assert_eq!(phase, PhaseState::Success);
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let all = [
            PhaseState::Init,
            PhaseState::Started,
            PhaseState::StepComplete(1),
            PhaseState::Success,
            PhaseState::Error,
        ];
        for terminal in [PhaseState::Success, PhaseState::Error] {
            for next in all {
                let mut phase = terminal;
                assert!(!phase.advance(next), "{terminal} -> {next}");
                assert_eq!(phase, terminal);
            }
        }
    }

    #[test]
    fn test_steps_only_move_forward() {
        let mut phase = PhaseState::StepComplete(2);
        assert!(!phase.advance(PhaseState::StepComplete(2)));
        assert!(!phase.advance(PhaseState::StepComplete(1)));
        assert!(!phase.advance(PhaseState::Started));
        assert!(!phase.advance(PhaseState::Init));
        assert!(phase.advance(PhaseState::Error));
    }

    #[test]
    fn test_init_cannot_skip_to_success() {
        let mut phase = PhaseState::Init;
        assert!(!phase.advance(PhaseState::Success));
        assert!(phase.advance(PhaseState::Error));
    }

    #[test]
    fn test_display() {
        assert_eq!(PhaseState::StepComplete(3).to_string(), "STEP_COMPLETE(3)");
    }
}
