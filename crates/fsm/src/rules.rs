//! Validated rule tables.

use std::collections::HashMap;
use std::fmt;

use crate::delta::{Delta, Label};
use crate::error::FsmError;

/// The full lifecycle of one aggregate type.
///
/// Each `(state, event)` pair has at most one rule; [`RuleTable::new`]
/// rejects tables that declare a pair twice. Tables are immutable and are
/// usually built once and shared behind an `Arc`.
pub struct RuleTable<S, E, C = ()> {
    deltas: Vec<Delta<S, E, C>>,
    index: HashMap<(S, E), usize>,
}

impl<S: Label, E: Label, C> RuleTable<S, E, C> {
    pub fn new(deltas: Vec<Delta<S, E, C>>) -> Result<Self, FsmError<S, E>> {
        let mut index = HashMap::with_capacity(deltas.len());
        for (position, delta) in deltas.iter().enumerate() {
            if index.insert((delta.current, delta.event), position).is_some() {
                return Err(FsmError::AmbiguousRule {
                    state: delta.current,
                    event: delta.event,
                });
            }
        }
        Ok(Self { deltas, index })
    }

    /// The rule for `event` in `state`, if one exists.
    pub fn find(&self, state: S, event: E) -> Option<&Delta<S, E, C>> {
        self.index
            .get(&(state, event))
            .map(|&position| &self.deltas[position])
    }

    /// Rules leaving `state`, in declaration order.
    pub fn transitions_from(&self, state: S) -> impl Iterator<Item = &Delta<S, E, C>> {
        self.deltas.iter().filter(move |delta| delta.current == state)
    }

    /// True when no rule leaves `state`.
    pub fn is_terminal(&self, state: S) -> bool {
        self.transitions_from(state).next().is_none()
    }

    pub fn deltas(&self) -> &[Delta<S, E, C>] {
        &self.deltas
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C> fmt::Debug for RuleTable<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTable")
            .field("deltas", &self.deltas)
            .finish()
    }
}
