//! Ticket aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use fsm::{FsmError, StateMachine};

use crate::aggregate::Aggregate;
use crate::events::LineItem;

use super::{TicketAction, TicketState, ticket_rules};

/// Data the ticket lifecycle side effects stamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketDetails {
    pub restaurant_id: i64,
    pub line_items: Vec<LineItem>,
    /// Time the restaurant promised the food for, set on acceptance.
    pub ready_by: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Kitchen ticket aggregate root. Shares its id with the order.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: AggregateId,
    machine: StateMachine<TicketState, TicketAction, TicketDetails>,
}

impl Aggregate for Ticket {
    fn aggregate_type() -> &'static str {
        "Ticket"
    }

    fn id(&self) -> AggregateId {
        self.id
    }
}

impl Ticket {
    /// Creates a ticket waiting for the restaurant to accept it.
    pub fn create(id: AggregateId, restaurant_id: i64, line_items: Vec<LineItem>) -> Self {
        let details = TicketDetails {
            restaurant_id,
            line_items,
            ..TicketDetails::default()
        };
        Self {
            id,
            machine: StateMachine::new(TicketState::CreatePending, ticket_rules(), details),
        }
    }

    pub fn state(&self) -> TicketState {
        self.machine.current()
    }

    pub fn details(&self) -> &TicketDetails {
        self.machine.context()
    }

    pub fn permits(&self, action: TicketAction) -> bool {
        self.machine.permits(action)
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal()
    }

    /// Runs `action` through the lifecycle and returns the new state.
    pub fn exec(
        &mut self,
        action: TicketAction,
    ) -> Result<TicketState, FsmError<TicketState, TicketAction>> {
        let state = self.machine.exec(action)?;
        metrics::counter!(
            "ticket_transitions_total",
            "action" => action.as_str(),
            "state" => state.as_str()
        )
        .increment(1);
        Ok(state)
    }

    /// Accepts the ticket, promising the food by `ready_by`.
    ///
    /// The promise is only kept if the ticket could be accepted.
    pub fn approve(
        &mut self,
        ready_by: DateTime<Utc>,
    ) -> Result<TicketState, FsmError<TicketState, TicketAction>> {
        let previous = self.machine.context_mut().ready_by.replace(ready_by);
        self.exec(TicketAction::ApproveTicket).inspect_err(|_| {
            self.machine.context_mut().ready_by = previous;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket() -> Ticket {
        Ticket::create(
            AggregateId::new(7),
            11,
            vec![LineItem {
                menu_item_id: "pad-thai".into(),
                name: "Pad Thai".into(),
                quantity: 1,
            }],
        )
    }

    #[test]
    fn test_create_starts_create_pending() {
        let ticket = ticket();
        assert_eq!(ticket.id(), AggregateId::new(7));
        assert_eq!(ticket.state(), TicketState::CreatePending);
        assert_eq!(ticket.details().line_items.len(), 1);
        assert!(ticket.permits(TicketAction::ApproveTicket));
        assert!(!ticket.permits(TicketAction::BeginPreparing));
    }

    #[test]
    fn test_approve_records_promise() {
        let mut ticket = ticket();
        let ready_by = Utc::now() + Duration::minutes(15);

        assert_eq!(ticket.approve(ready_by), Ok(TicketState::Created));
        assert_eq!(ticket.details().ready_by, Some(ready_by));
        assert!(ticket.details().accepted_at.is_some());
    }

    #[test]
    fn test_failed_approve_keeps_previous_promise() {
        let mut ticket = ticket();
        ticket.exec(TicketAction::RejectTicket).unwrap();

        let err = ticket.approve(Utc::now()).unwrap_err();
        assert_eq!(err.state(), TicketState::Rejected);
        assert!(ticket.details().ready_by.is_none());
        assert!(ticket.is_terminal());
    }
}
