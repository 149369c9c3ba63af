//! Ticket lifecycle.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use fsm::{Delta, RuleTable};

use super::TicketDetails;

/// The state of a kitchen ticket.
///
/// State transitions:
/// ```text
/// CreatePending ──► Created ──► InProgress ──► ReadyForPickup ──► CompletePending ──► Completed
///    │    │            │                             ▲                  │
///    │    │            └──► Declined                 └──────────────────┘
///    │    └──► Rejected                                (completion rejected)
///    └──(also from Created)──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TicketState {
    /// Created from an order, waiting for the restaurant to accept.
    #[default]
    CreatePending,

    /// Accepted with a promised ready time.
    Created,

    /// Being cooked.
    InProgress,

    /// Food is waiting at the counter.
    ReadyForPickup,

    /// Handed to the courier, waiting for delivery to confirm the pickup.
    CompletePending,

    /// Picked up (terminal state).
    Completed,

    /// Restaurant refused the order (terminal state).
    Rejected,

    /// Order was canceled (terminal state).
    Canceled,

    /// Restaurant dropped an accepted order (terminal state).
    Declined,
}

impl TicketState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::CreatePending => "CreatePending",
            TicketState::Created => "Created",
            TicketState::InProgress => "InProgress",
            TicketState::ReadyForPickup => "ReadyForPickup",
            TicketState::CompletePending => "CompletePending",
            TicketState::Completed => "Completed",
            TicketState::Rejected => "Rejected",
            TicketState::Canceled => "Canceled",
            TicketState::Declined => "Declined",
        }
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events that drive the ticket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketAction {
    ApproveTicket,
    RejectTicket,
    BeginPreparing,
    FinishPreparing,
    CompleteTicket,
    CompleteConfirmed,
    CompleteRejected,
    CancelTicket,
    DeclineTicket,
}

impl TicketAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketAction::ApproveTicket => "ApproveTicket",
            TicketAction::RejectTicket => "RejectTicket",
            TicketAction::BeginPreparing => "BeginPreparing",
            TicketAction::FinishPreparing => "FinishPreparing",
            TicketAction::CompleteTicket => "CompleteTicket",
            TicketAction::CompleteConfirmed => "CompleteConfirmed",
            TicketAction::CompleteRejected => "CompleteRejected",
            TicketAction::CancelTicket => "CancelTicket",
            TicketAction::DeclineTicket => "DeclineTicket",
        }
    }
}

impl std::fmt::Display for TicketAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type TicketRules = RuleTable<TicketState, TicketAction, TicketDetails>;

static TICKET_RULES: LazyLock<Arc<TicketRules>> = LazyLock::new(|| {
    use TicketAction::*;
    use TicketState::*;

    let rules = RuleTable::new(vec![
        Delta::new(CreatePending, ApproveTicket, Created).with_side_effect(
            |details: &mut TicketDetails| {
                details.accepted_at = Some(Utc::now());
            },
        ),
        Delta::new(Created, BeginPreparing, InProgress),
        Delta::new(InProgress, FinishPreparing, ReadyForPickup).with_side_effect(
            |details: &mut TicketDetails| {
                details.ready_at = Some(Utc::now());
            },
        ),
        Delta::new(ReadyForPickup, CompleteTicket, CompletePending),
        Delta::new(CompletePending, CompleteConfirmed, Completed).with_side_effect(
            |details: &mut TicketDetails| {
                details.completed_at = Some(Utc::now());
            },
        ),
        Delta::new(CompletePending, CompleteRejected, ReadyForPickup),
        Delta::new(CreatePending, RejectTicket, Rejected),
        Delta::new(CreatePending, CancelTicket, Canceled),
        Delta::new(Created, CancelTicket, Canceled),
        Delta::new(Created, DeclineTicket, Declined),
    ])
    .expect("ticket rule table has one rule per state and action");
    Arc::new(rules)
});

/// The shared ticket rule table.
pub fn ticket_rules() -> Arc<TicketRules> {
    Arc::clone(&TICKET_RULES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsm::{FsmError, StateMachine};

    const STATES: [TicketState; 9] = [
        TicketState::CreatePending,
        TicketState::Created,
        TicketState::InProgress,
        TicketState::ReadyForPickup,
        TicketState::CompletePending,
        TicketState::Completed,
        TicketState::Rejected,
        TicketState::Canceled,
        TicketState::Declined,
    ];

    const ACTIONS: [TicketAction; 9] = [
        TicketAction::ApproveTicket,
        TicketAction::RejectTicket,
        TicketAction::BeginPreparing,
        TicketAction::FinishPreparing,
        TicketAction::CompleteTicket,
        TicketAction::CompleteConfirmed,
        TicketAction::CompleteRejected,
        TicketAction::CancelTicket,
        TicketAction::DeclineTicket,
    ];

    fn machine(state: TicketState) -> StateMachine<TicketState, TicketAction, TicketDetails> {
        StateMachine::new(state, ticket_rules(), TicketDetails::default())
    }

    #[test]
    fn test_happy_path_to_completed() {
        let mut ticket = machine(TicketState::CreatePending);
        let path = [
            (TicketAction::ApproveTicket, TicketState::Created),
            (TicketAction::BeginPreparing, TicketState::InProgress),
            (TicketAction::FinishPreparing, TicketState::ReadyForPickup),
            (TicketAction::CompleteTicket, TicketState::CompletePending),
            (TicketAction::CompleteConfirmed, TicketState::Completed),
        ];

        for (action, expected) in path {
            assert_eq!(ticket.exec(action), Ok(expected));
            assert_eq!(ticket.current(), expected);
        }

        let details = ticket.context();
        assert!(details.accepted_at.is_some());
        assert!(details.ready_at.is_some());
        assert!(details.completed_at.is_some());
        assert!(ticket.is_terminal());
    }

    #[test]
    fn test_every_rule_reaches_its_next_state() {
        for delta in ticket_rules().deltas() {
            let mut ticket = machine(delta.current);
            assert_eq!(ticket.exec(delta.event), Ok(delta.next), "{delta}");
            assert_eq!(ticket.current(), delta.next);
        }
    }

    #[test]
    fn test_undeclared_pairs_are_unsupported() {
        let rules = ticket_rules();
        for state in STATES {
            for action in ACTIONS {
                if rules.find(state, action).is_some() {
                    continue;
                }
                let mut ticket = machine(state);
                assert_eq!(
                    ticket.exec(action),
                    Err(FsmError::UnsupportedTransition { state, event: action })
                );
                assert_eq!(ticket.current(), state);
            }
        }
    }

    #[test]
    fn test_completion_handshake_can_bounce_back() {
        let mut ticket = machine(TicketState::CompletePending);
        assert_eq!(
            ticket.exec(TicketAction::CompleteRejected),
            Ok(TicketState::ReadyForPickup)
        );
        assert_eq!(
            ticket.exec(TicketAction::CompleteTicket),
            Ok(TicketState::CompletePending)
        );
        assert!(ticket.context().completed_at.is_none());
    }

    #[test]
    fn test_approve_with_default_details() {
        let mut ticket = StateMachine::new(
            TicketState::CreatePending,
            ticket_rules(),
            TicketDetails::default(),
        );

        assert_eq!(ticket.exec(TicketAction::ApproveTicket), Ok(TicketState::Created));
        assert!(ticket.context().accepted_at.is_some());
    }

    #[test]
    fn test_cancel_only_before_preparation() {
        assert!(machine(TicketState::CreatePending).permits(TicketAction::CancelTicket));
        assert!(machine(TicketState::Created).permits(TicketAction::CancelTicket));

        let mut ticket = machine(TicketState::InProgress);
        assert_eq!(
            ticket.exec(TicketAction::CancelTicket),
            Err(FsmError::UnsupportedTransition {
                state: TicketState::InProgress,
                event: TicketAction::CancelTicket,
            })
        );
    }

    #[test]
    fn test_terminal_states_reject_every_action() {
        let rules = ticket_rules();
        for state in [
            TicketState::Completed,
            TicketState::Rejected,
            TicketState::Canceled,
            TicketState::Declined,
        ] {
            assert!(rules.is_terminal(state));
            let mut ticket = machine(state);
            for action in ACTIONS {
                assert!(matches!(
                    ticket.exec(action),
                    Err(FsmError::UnsupportedTransition { .. })
                ));
            }
            assert_eq!(ticket.current(), state);
        }
    }

    #[test]
    fn test_transitions_from_created() {
        let mut events: Vec<_> = ticket_rules()
            .transitions_from(TicketState::Created)
            .map(|delta| delta.event)
            .collect();
        events.sort_by_key(|action| action.as_str());
        assert_eq!(
            events,
            vec![
                TicketAction::BeginPreparing,
                TicketAction::CancelTicket,
                TicketAction::DeclineTicket
            ]
        );
    }

    #[test]
    fn test_rule_count() {
        assert_eq!(ticket_rules().len(), 10);
    }
}
