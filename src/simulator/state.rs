//! Simulator state counters and the validation gate that guards every
//! scenario. A violated invariant fails fast; nothing rolls back partial
//! progress from an earlier crashed run.

use crate::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insertion,
    Update,
    Delete,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Insertion => "insertion",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Counters for one simulator instance. The lifecycle is linear:
/// `Fresh -> Inserted -> Updated -> Deleted`; re-running insertion requires
/// an external reset through `setup()` or `ensure_empty()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorState {
    pub total_records: u64,
    pub inserted: u64,
    pub modified: u64,
    pub deleted: u64,
}

impl SimulatorState {
    pub fn new(total_records: u64) -> Self {
        SimulatorState {
            total_records,
            ..Default::default()
        }
    }

    /// Zero the counters, keeping the target.
    pub fn reset(&mut self) {
        self.inserted = 0;
        self.modified = 0;
        self.deleted = 0;
    }

    pub fn set_total_records(&mut self, total_records: u64) {
        self.total_records = total_records;
    }

    pub fn validate_before_executing(&self, action: Action) -> Result<(), StateError> {
        log::debug!("validating simulator state before '{}'", action.name());
        let ok = match action {
            Action::Insertion => self.inserted == 0 && self.modified == 0 && self.deleted == 0,
            Action::Update => {
                self.modified == 0 && self.inserted == self.total_records && self.deleted == 0
            }
            Action::Delete => self.inserted == self.total_records && self.deleted == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(StateError::InvariantViolated {
                action: action.name(),
                expected_inserted: match action {
                    Action::Insertion => 0,
                    Action::Update | Action::Delete => self.total_records,
                },
                inserted: self.inserted,
                modified: self.modified,
                deleted: self.deleted,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_allows_insertion() {
        let state = SimulatorState::new(10);
        assert!(state.validate_before_executing(Action::Insertion).is_ok());
    }

    #[test]
    fn insertion_rejected_when_any_counter_nonzero() {
        for (inserted, modified, deleted) in [(1, 0, 0), (0, 1, 0), (0, 0, 1)] {
            let state = SimulatorState {
                total_records: 10,
                inserted,
                modified,
                deleted,
            };
            assert!(state.validate_before_executing(Action::Insertion).is_err());
        }
    }

    #[test]
    fn update_requires_full_insertion_and_clean_counters() {
        let mut state = SimulatorState::new(10);
        assert!(state.validate_before_executing(Action::Update).is_err());

        state.inserted = 10;
        assert!(state.validate_before_executing(Action::Update).is_ok());

        state.modified = 1;
        assert!(state.validate_before_executing(Action::Update).is_err());

        state.modified = 0;
        state.deleted = 1;
        assert!(state.validate_before_executing(Action::Update).is_err());
    }

    #[test]
    fn delete_allows_prior_modifications() {
        let state = SimulatorState {
            total_records: 10,
            inserted: 10,
            modified: 10,
            deleted: 0,
        };
        assert!(state.validate_before_executing(Action::Delete).is_ok());
    }

    #[test]
    fn delete_rejected_after_partial_insertion_or_prior_deletes() {
        let mut state = SimulatorState::new(10);
        state.inserted = 5;
        assert!(state.validate_before_executing(Action::Delete).is_err());

        state.inserted = 10;
        state.deleted = 1;
        assert!(state.validate_before_executing(Action::Delete).is_err());
    }

    #[test]
    fn violation_message_names_action_and_counters() {
        let state = SimulatorState {
            total_records: 10,
            inserted: 3,
            modified: 0,
            deleted: 0,
        };
        let err = state
            .validate_before_executing(Action::Update)
            .unwrap_err()
            .to_string();
        assert!(err.contains("'update'"));
        assert!(err.contains("inserted=3"));
        assert!(err.contains("expected inserted=10"));
    }

    #[test]
    fn reset_keeps_target() {
        let mut state = SimulatorState::new(10);
        state.inserted = 10;
        state.modified = 4;
        state.deleted = 10;
        state.reset();
        assert_eq!(state, SimulatorState::new(10));
    }
}
