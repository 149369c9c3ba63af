//! Kitchen bounded context: tickets and the service that runs them.

mod aggregate;
mod service;
mod state;

pub use aggregate::{Ticket, TicketDetails};
pub use service::KitchenService;
pub use state::{TicketAction, TicketRules, TicketState, ticket_rules};
