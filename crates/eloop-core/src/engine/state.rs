use super::error::EngineError;
use tracing::debug;

/// Lifecycle of one rank during a sweep.
///
/// The happy path is strictly linear; `Failed` is reachable from every non-terminal state.
/// Worker ranks pass through `Merged` and `Saved` without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Prepared,
    LocalCompute,
    Gathering,
    Merged,
    Saved,
    Done,
    Failed,
}

impl SweepState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SweepState::Done | SweepState::Failed)
    }

    fn successor(self) -> Option<SweepState> {
        use SweepState::*;
        match self {
            Idle => Some(Prepared),
            Prepared => Some(LocalCompute),
            LocalCompute => Some(Gathering),
            Gathering => Some(Merged),
            Merged => Some(Saved),
            Saved => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn can_transition_to(self, next: SweepState) -> bool {
        if next == SweepState::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

#[derive(Debug)]
pub struct SweepLifecycle {
    rank: usize,
    state: SweepState,
}

impl SweepLifecycle {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            state: SweepState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn advance(&mut self, next: SweepState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(rank = self.rank, from = ?self.state, to = ?next, "Sweep state transition.");
        self.state = next;
        Ok(())
    }

    /// Moves to `Failed` unless the lifecycle already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!(rank = self.rank, from = ?self.state, "Sweep state transition to Failed.");
            self.state = SweepState::Failed;
        }
    }
}
