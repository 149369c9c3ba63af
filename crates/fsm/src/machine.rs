//! State machine execution.

use std::fmt;
use std::sync::Arc;

use crate::delta::Label;
use crate::error::FsmError;
use crate::rules::RuleTable;

/// The current state of one aggregate, bound to its rule table.
///
/// The state only changes through [`exec`](Self::exec). The machine does no
/// locking; callers serialize access per aggregate.
pub struct StateMachine<S, E, C = ()> {
    current: S,
    rules: Arc<RuleTable<S, E, C>>,
    context: C,
}

impl<S: Label, E: Label, C> StateMachine<S, E, C> {
    pub fn new(initial: S, rules: Arc<RuleTable<S, E, C>>, context: C) -> Self {
        Self {
            current: initial,
            rules,
            context,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Mutable access to the context. The state itself stays read-only.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn rules(&self) -> &RuleTable<S, E, C> {
        &self.rules
    }

    /// True if `event` would transition from the current state.
    pub fn permits(&self, event: E) -> bool {
        self.rules
            .find(self.current, event)
            .is_some_and(|delta| delta.permits(&self.context))
    }

    /// True if no rule leaves the current state.
    pub fn is_terminal(&self) -> bool {
        self.rules.is_terminal(self.current)
    }

    /// Fires `event` and returns the new state.
    ///
    /// Fails with [`FsmError::UnsupportedTransition`] when no rule matches and
    /// [`FsmError::GuardRejected`] when the rule's guard vetoes it. On failure
    /// neither the state nor the context is touched.
    pub fn exec(&mut self, event: E) -> Result<S, FsmError<S, E>> {
        let state = self.current;
        let Some(delta) = self.rules.find(state, event) else {
            tracing::debug!(%state, %event, "unsupported transition");
            return Err(FsmError::UnsupportedTransition { state, event });
        };

        if !delta.permits(&self.context) {
            tracing::debug!(%state, %event, "guard rejected transition");
            return Err(FsmError::GuardRejected { state, event });
        }

        delta.apply(&mut self.context);
        self.current = delta.next;
        tracing::trace!(from = %state, %event, to = %self.current, "transition");
        Ok(self.current)
    }

    pub fn into_parts(self) -> (S, C) {
        (self.current, self.context)
    }
}

impl<S: Copy, E, C: Clone> Clone for StateMachine<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            current: self.current,
            rules: Arc::clone(&self.rules),
            context: self.context.clone(),
        }
    }
}

impl<S: fmt::Debug, E, C: fmt::Debug> fmt::Debug for StateMachine<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
