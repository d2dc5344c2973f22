//! Per employee-artifact state machine.
//!
//! ```text
//! pending → fetching → normalizing → writing → success
//!    │          │           │           │
//!    └──────────┴───────────┴───────────┴────→ failed
//! pending → skipped
//! ```
//!
//! `success`, `failed` and `skipped` are terminal.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Fetching,
    Normalizing,
    Writing,
    Success,
    Failed,
    Skipped,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Success | UnitState::Failed | UnitState::Skipped)
    }

    fn allows(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Fetching, Normalizing)
                | (Fetching, Failed)
                | (Normalizing, Writing)
                | (Normalizing, Failed)
                | (Writing, Success)
                | (Writing, Failed)
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Pending => "pending",
            UnitState::Fetching => "fetching",
            UnitState::Normalizing => "normalizing",
            UnitState::Writing => "writing",
            UnitState::Success => "success",
            UnitState::Failed => "failed",
            UnitState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid unit transition {from} -> {to}")]
pub struct TransitionError {
    pub from: UnitState,
    pub to: UnitState,
}

/// One employee-artifact unit moving through [`UnitState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    label: String,
    state: UnitState,
}

impl Unit {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: UnitState::Pending,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn advance(&mut self, next: UnitState) -> Result<(), TransitionError> {
        if !self.state.allows(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.label, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            tracing::trace!("{}: {} -> failed", self.label, self.state);
            self.state = UnitState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_success() {
        let mut unit = Unit::new("e1/photo");
        for next in [
            UnitState::Fetching,
            UnitState::Normalizing,
            UnitState::Writing,
            UnitState::Success,
        ] {
            unit.advance(next).unwrap();
        }
        assert_eq!(unit.state(), UnitState::Success);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut unit = Unit::new("e1/photo");
        unit.advance(UnitState::Skipped).unwrap();
        let err = unit.advance(UnitState::Fetching).unwrap_err();
        assert_eq!(err.to_string(), "invalid unit transition skipped -> fetching");

        unit.fail();
        assert_eq!(unit.state(), UnitState::Skipped);
    }

    #[test]
    fn only_pending_units_can_be_skipped() {
        let mut unit = Unit::new("e1/documents");
        unit.advance(UnitState::Skipped).unwrap();
        assert!(unit.state().is_terminal());

        let mut fetching = Unit::new("e2/documents");
        fetching.advance(UnitState::Fetching).unwrap();
        let err = fetching.advance(UnitState::Skipped).unwrap_err();
        assert_eq!(err.from, UnitState::Fetching);
    }

    #[test]
    fn cannot_skip_writing() {
        let mut unit = Unit::new("e1/photo");
        unit.advance(UnitState::Fetching).unwrap();
        assert!(unit.advance(UnitState::Success).is_err());
        unit.fail();
        assert_eq!(unit.state(), UnitState::Failed);
    }
}
