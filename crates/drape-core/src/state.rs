//! Extraction progress as an explicit state machine.
//!
//! ```text
//! NotStarted --Start--> TryingStrategy(0)            (or Exhausted if no strategies)
//! TryingStrategy(i) --AttemptSucceeded--> Succeeded(i)
//! TryingStrategy(i) --AttemptFailed-----> TryingStrategy(i + 1) | Exhausted
//! Succeeded / Exhausted are absorbing.
//! ```
//!
//! Only one strategy is ever in flight, and a success ends the run.

/// Where an extraction currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    NotStarted,
    TryingStrategy(usize),
    Succeeded(usize),
    Exhausted,
}

/// Input to [`ExtractionState::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Start,
    AttemptSucceeded,
    AttemptFailed,
}

impl ExtractionState {
    /// Apply `event` given `strategy_count` configured strategies.
    ///
    /// Events that make no sense in the current state leave it unchanged.
    pub fn next(self, event: StateEvent, strategy_count: usize) -> ExtractionState {
        match (self, event) {
            (ExtractionState::NotStarted, StateEvent::Start) => {
                if strategy_count == 0 {
                    ExtractionState::Exhausted
                } else {
                    ExtractionState::TryingStrategy(0)
                }
            }
            (ExtractionState::TryingStrategy(i), StateEvent::AttemptSucceeded) => {
                ExtractionState::Succeeded(i)
            }
            (ExtractionState::TryingStrategy(i), StateEvent::AttemptFailed) => {
                if i + 1 < strategy_count {
                    ExtractionState::TryingStrategy(i + 1)
                } else {
                    ExtractionState::Exhausted
                }
            }
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExtractionState::Succeeded(_) | ExtractionState::Exhausted
        )
    }
}
