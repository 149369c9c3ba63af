//! Fulfillment domain for the food delivery system.
//!
//! This crate provides:
//! - The event catalogue shared by the services ([`events`])
//! - [`Repository`] and [`CommandHandler`] for loading, mutating and saving aggregates
//! - The [`Delivery`] and [`Ticket`] aggregates, each driven by a lifecycle rule table
//! - [`DeliveryService`] and [`KitchenService`], which react to events and publish their own

pub mod aggregate;
pub mod command;
pub mod delivery;
pub mod error;
pub mod events;
pub mod kitchen;
pub mod repository;

pub use aggregate::Aggregate;
pub use command::CommandHandler;
pub use delivery::{
    Courier, CourierRoster, Delivery, DeliveryAction, DeliveryDetails, DeliveryService,
    DeliveryState,
};
pub use error::{DomainError, Result};
pub use kitchen::{KitchenService, Ticket, TicketAction, TicketDetails, TicketState};
pub use repository::{InMemoryRepository, Repository, RepositoryError};
