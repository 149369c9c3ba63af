//! Domain error types.

use common::AggregateId;
use event_bus::{HandlerError, PublishError};
use fsm::FsmError;
use thiserror::Error;

use crate::delivery::{DeliveryAction, DeliveryState};
use crate::kitchen::{TicketAction, TicketState};
use crate::repository::RepositoryError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The delivery lifecycle does not allow the action.
    #[error("Delivery transition rejected: {0}")]
    Delivery(#[from] FsmError<DeliveryState, DeliveryAction>),

    /// The ticket lifecycle does not allow the action.
    #[error("Ticket transition rejected: {0}")]
    Ticket(#[from] FsmError<TicketState, TicketAction>),

    /// An error occurred in the repository.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The resulting event could not be published.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// No courier with this id is on the roster.
    #[error("Unknown courier: {0}")]
    UnknownCourier(AggregateId),

    /// The courier exists but is not taking deliveries.
    #[error("Courier {0} is not available")]
    CourierUnavailable(AggregateId),

    /// A command precondition that is not a lifecycle transition failed.
    #[error("Cannot {operation} {aggregate_type} {id} in state {state}")]
    InvalidOperation {
        aggregate_type: &'static str,
        id: AggregateId,
        operation: &'static str,
        state: &'static str,
    },
}

impl DomainError {
    /// True for lifecycle rejections: the aggregate is in a state where the
    /// requested transition does not apply.
    pub fn is_transition_rejected(&self) -> bool {
        matches!(self, Self::Delivery(_) | Self::Ticket(_))
    }

    /// True when a creation raced with an earlier one for the same id.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::AlreadyExists { .. }))
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Settles the outcome of an event-triggered operation for the consumer.
///
/// Lifecycle rejections come from duplicate or out-of-order events; they are
/// logged and the message is acknowledged. Redelivered creation events are
/// acknowledged too. Every other error is returned so the message is
/// redelivered.
pub(crate) fn acknowledge<T>(result: Result<T>) -> std::result::Result<(), HandlerError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_transition_rejected() => {
            tracing::warn!(error = %err, "event does not apply to current state, skipping");
            Ok(())
        }
        Err(err) if err.is_already_exists() => {
            tracing::debug!(error = %err, "aggregate already created, skipping");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
