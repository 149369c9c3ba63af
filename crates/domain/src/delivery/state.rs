//! Delivery lifecycle.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use fsm::{Delta, RuleTable};

use super::DeliveryDetails;

/// The state of a delivery in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► InProgress ──► ReadyForPickup ──[courier]──► OnRoute ──► Completed
///    │
///    ├──► Canceled
///    └──► Declined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryState {
    /// Created from an order, kitchen has not started.
    #[default]
    Pending,

    /// The kitchen is preparing the order.
    InProgress,

    /// Food is waiting at the restaurant.
    ReadyForPickup,

    /// A courier has picked the order up.
    OnRoute,

    /// Delivered (terminal state).
    Completed,

    /// Order was canceled before preparation (terminal state).
    Canceled,

    /// Delivery service declined the job (terminal state).
    Declined,
}

impl DeliveryState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Pending => "Pending",
            DeliveryState::InProgress => "InProgress",
            DeliveryState::ReadyForPickup => "ReadyForPickup",
            DeliveryState::OnRoute => "OnRoute",
            DeliveryState::Completed => "Completed",
            DeliveryState::Canceled => "Canceled",
            DeliveryState::Declined => "Declined",
        }
    }

    /// Returns true while a courier may still be assigned.
    pub fn accepts_courier(&self) -> bool {
        matches!(
            self,
            DeliveryState::Pending | DeliveryState::InProgress | DeliveryState::ReadyForPickup
        )
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events that drive the delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryAction {
    BeginPreparingDelivery,
    ReadyDeliveryForPickup,
    PickUpDelivery,
    CompleteDelivery,
    CancelDelivery,
    DeclineDelivery,
}

impl DeliveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryAction::BeginPreparingDelivery => "BeginPreparingDelivery",
            DeliveryAction::ReadyDeliveryForPickup => "ReadyDeliveryForPickup",
            DeliveryAction::PickUpDelivery => "PickUpDelivery",
            DeliveryAction::CompleteDelivery => "CompleteDelivery",
            DeliveryAction::CancelDelivery => "CancelDelivery",
            DeliveryAction::DeclineDelivery => "DeclineDelivery",
        }
    }
}

impl std::fmt::Display for DeliveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type DeliveryRules = RuleTable<DeliveryState, DeliveryAction, DeliveryDetails>;

static DELIVERY_RULES: LazyLock<Arc<DeliveryRules>> = LazyLock::new(|| {
    use DeliveryAction::*;
    use DeliveryState::*;

    let rules = RuleTable::new(vec![
        Delta::new(Pending, BeginPreparingDelivery, InProgress),
        Delta::new(InProgress, ReadyDeliveryForPickup, ReadyForPickup),
        Delta::new(ReadyForPickup, PickUpDelivery, OnRoute)
            .with_guard(|details: &DeliveryDetails| details.courier_id.is_some())
            .with_side_effect(|details: &mut DeliveryDetails| {
                details.picked_up_at = Some(Utc::now());
            }),
        Delta::new(OnRoute, CompleteDelivery, Completed).with_side_effect(
            |details: &mut DeliveryDetails| {
                details.delivered_at = Some(Utc::now());
            },
        ),
        Delta::new(Pending, CancelDelivery, Canceled),
        Delta::new(Pending, DeclineDelivery, Declined),
    ])
    .expect("delivery rule table has one rule per state and action");
    Arc::new(rules)
});

/// The shared delivery rule table.
pub fn delivery_rules() -> Arc<DeliveryRules> {
    Arc::clone(&DELIVERY_RULES)
}
