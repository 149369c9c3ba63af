//! Delivery aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use fsm::{FsmError, StateMachine};

use crate::aggregate::Aggregate;
use crate::error::{DomainError, Result};

use super::{DeliveryAction, DeliveryState, delivery_rules};

/// Data the delivery lifecycle guards and side effects work on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryDetails {
    pub restaurant_id: i64,
    pub delivery_address: String,
    pub courier_id: Option<AggregateId>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Delivery aggregate root.
///
/// Shares its id with the order it delivers. The state only changes through
/// [`Delivery::exec`].
#[derive(Debug, Clone)]
pub struct Delivery {
    id: AggregateId,
    machine: StateMachine<DeliveryState, DeliveryAction, DeliveryDetails>,
}

impl Aggregate for Delivery {
    fn aggregate_type() -> &'static str {
        "Delivery"
    }

    fn id(&self) -> AggregateId {
        self.id
    }
}

impl Delivery {
    /// Creates a pending delivery for an order.
    pub fn create(
        id: AggregateId,
        restaurant_id: i64,
        delivery_address: impl Into<String>,
    ) -> Self {
        let details = DeliveryDetails {
            restaurant_id,
            delivery_address: delivery_address.into(),
            ..DeliveryDetails::default()
        };
        Self {
            id,
            machine: StateMachine::new(DeliveryState::Pending, delivery_rules(), details),
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.machine.current()
    }

    pub fn details(&self) -> &DeliveryDetails {
        self.machine.context()
    }

    pub fn courier_id(&self) -> Option<AggregateId> {
        self.details().courier_id
    }

    /// Returns true if `action` would succeed now.
    pub fn permits(&self, action: DeliveryAction) -> bool {
        self.machine.permits(action)
    }

    /// Returns true if the delivery has reached the end of its lifecycle.
    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal()
    }

    /// Runs `action` through the lifecycle and returns the new state.
    pub fn exec(
        &mut self,
        action: DeliveryAction,
    ) -> std::result::Result<DeliveryState, FsmError<DeliveryState, DeliveryAction>> {
        let state = self.machine.exec(action)?;
        metrics::counter!(
            "delivery_transitions_total",
            "action" => action.as_str(),
            "state" => state.as_str()
        )
        .increment(1);
        Ok(state)
    }

    /// Assigns the courier who will pick the order up.
    ///
    /// Allowed until the order has been picked up. Reassigning replaces the
    /// previous courier.
    pub fn assign_courier(&mut self, courier_id: AggregateId) -> Result<()> {
        let state = self.state();
        if !state.accepts_courier() {
            return Err(DomainError::InvalidOperation {
                aggregate_type: Self::aggregate_type(),
                id: self.id,
                operation: "assign a courier to",
                state: state.as_str(),
            });
        }
        self.machine.context_mut().courier_id = Some(courier_id);
        Ok(())
    }
}
