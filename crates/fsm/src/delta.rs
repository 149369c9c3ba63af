//! State machine rules.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Bounds shared by state and event types.
pub trait Label: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> Label for T where T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Predicate deciding whether a rule may fire for the given context.
pub type Guard<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Callback run on the context just before the state changes.
pub type SideEffect<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

/// One row of a rule table: `current --event--> next`.
pub struct Delta<S, E, C = ()> {
    pub current: S,
    pub event: E,
    pub next: S,
    guard: Option<Guard<C>>,
    side_effect: Option<SideEffect<C>>,
}

impl<S: Label, E: Label, C> Delta<S, E, C> {
    pub fn new(current: S, event: E, next: S) -> Self {
        Self {
            current,
            event,
            next,
            guard: None,
            side_effect: None,
        }
    }

    /// Only allow the transition when `guard` returns true.
    pub fn with_guard(mut self, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Run `effect` on the context when the transition fires.
    pub fn with_side_effect(mut self, effect: impl Fn(&mut C) + Send + Sync + 'static) -> Self {
        self.side_effect = Some(Arc::new(effect));
        self
    }

    pub fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    pub fn has_side_effect(&self) -> bool {
        self.side_effect.is_some()
    }

    /// Evaluates the guard. A rule without a guard always passes.
    pub fn permits(&self, context: &C) -> bool {
        self.guard.as_ref().is_none_or(|guard| guard(context))
    }

    pub(crate) fn apply(&self, context: &mut C) {
        if let Some(effect) = &self.side_effect {
            effect(context);
        }
    }
}

impl<S: Clone, E: Clone, C> Clone for Delta<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
            event: self.event.clone(),
            next: self.next.clone(),
            guard: self.guard.clone(),
            side_effect: self.side_effect.clone(),
        }
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C> fmt::Debug for Delta<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delta")
            .field("current", &self.current)
            .field("event", &self.event)
            .field("next", &self.next)
            .field("guard", &self.guard.is_some())
            .field("side_effect", &self.side_effect.is_some())
            .finish()
    }
}

impl<S: fmt::Display, E: fmt::Display, C> fmt::Display for Delta<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.current, self.event, self.next)?;
        if self.guard.is_some() {
            f.write_str(" [guarded]")?;
        }
        Ok(())
    }
}
