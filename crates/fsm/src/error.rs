use thiserror::Error;

/// Errors raised by rule tables and state machines.
///
/// Transition failures leave the machine in the state it was in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError<S, E> {
    /// No rule exists for the event in the current state.
    #[error("Unsupported transition: {event} is not allowed in state {state}")]
    UnsupportedTransition { state: S, event: E },

    /// A rule matched but its guard vetoed the transition.
    #[error("Guard rejected {event} in state {state}")]
    GuardRejected { state: S, event: E },

    /// A rule table declares more than one rule for the same state and event.
    #[error("Ambiguous rules: more than one transition for {event} in state {state}")]
    AmbiguousRule { state: S, event: E },
}

impl<S: Copy, E: Copy> FsmError<S, E> {
    /// The state the machine was in (or the rule was declared for).
    pub fn state(&self) -> S {
        match self {
            Self::UnsupportedTransition { state, .. }
            | Self::GuardRejected { state, .. }
            | Self::AmbiguousRule { state, .. } => *state,
        }
    }

    /// The event that was rejected.
    pub fn event(&self) -> E {
        match self {
            Self::UnsupportedTransition { event, .. }
            | Self::GuardRejected { event, .. }
            | Self::AmbiguousRule { event, .. } => *event,
        }
    }
}

/// Convenience type alias for state machine results.
pub type Result<T, S, E> = std::result::Result<T, FsmError<S, E>>;
