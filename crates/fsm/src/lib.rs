//! Guarded finite-state machine engine.
//!
//! A lifecycle is declared as a [`RuleTable`] of [`Delta`] rows: current
//! state, trigger event, next state, and an optional guard and side effect
//! over a shared context. A [`StateMachine`] binds one aggregate's current
//! state and context to a table and moves it only through those rows.
//!
//! ```
//! use std::sync::Arc;
//! use fsm::{Delta, RuleTable, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Light { Off, On }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Switch { Flip }
//!
//! # impl std::fmt::Display for Light {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{self:?}") }
//! # }
//! # impl std::fmt::Display for Switch {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{self:?}") }
//! # }
//! let rules = RuleTable::new(vec![
//!     Delta::new(Light::Off, Switch::Flip, Light::On),
//!     Delta::new(Light::On, Switch::Flip, Light::Off),
//! ])
//! .unwrap();
//!
//! let mut light = StateMachine::new(Light::Off, Arc::new(rules), ());
//! assert_eq!(light.exec(Switch::Flip).unwrap(), Light::On);
//! ```

pub mod delta;
pub mod error;
pub mod machine;
pub mod rules;

pub use delta::{Delta, Guard, Label, SideEffect};
pub use error::{FsmError, Result};
pub use machine::StateMachine;
pub use rules::RuleTable;
