//! Kitchen service: turns orders into tickets and follows them through the
//! restaurant.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use event_bus::{
    Envelope, EventHandler, HandlerError, Producer, Publisher, RegistryBuilder, RegistryError,
};

use crate::command::CommandHandler;
use crate::error::{Result, acknowledge};
use crate::events::{
    DeliveryEvent, DeliveryPickedUp, DeliveryPickupRejected, KitchenEvent, OrderCanceled,
    OrderCreated, OrderEvent, TicketAccepted, TicketCanceled, TicketCompleted, TicketCreated,
    TicketPreparationStarted, TicketReadyForPickup,
};
use crate::repository::Repository;

use super::{Ticket, TicketAction, TicketState};

pub struct KitchenService<R, P: Producer> {
    tickets: CommandHandler<Ticket, R>,
    publisher: Publisher<P>,
}

impl<R, P> KitchenService<R, P>
where
    R: Repository<Ticket>,
    P: Producer + 'static,
{
    /// Consumer group the service reads its topics with.
    pub const GROUP_ID: &'static str = "kitchen-svc";

    pub fn new(repository: R, publisher: Publisher<P>) -> Self {
        Self {
            tickets: CommandHandler::new(repository),
            publisher,
        }
    }

    pub fn publisher(&self) -> &Publisher<P> {
        &self.publisher
    }

    pub async fn ticket(&self, id: AggregateId) -> Result<Ticket> {
        self.tickets.load(id).await
    }

    /// Registers the service's event handlers.
    pub fn register(
        service: &Arc<Self>,
        builder: &mut RegistryBuilder,
    ) -> std::result::Result<(), RegistryError> {
        builder
            .register::<OrderEvent, OrderCreated, _>(OrderEvent::ORDER_CREATED, Arc::clone(service))?
            .register::<OrderEvent, OrderCanceled, _>(
                OrderEvent::ORDER_CANCELED,
                Arc::clone(service),
            )?
            .register::<DeliveryEvent, DeliveryPickedUp, _>(
                DeliveryEvent::DELIVERY_PICKED_UP,
                Arc::clone(service),
            )?
            .register::<DeliveryEvent, DeliveryPickupRejected, _>(
                DeliveryEvent::DELIVERY_PICKUP_REJECTED,
                Arc::clone(service),
            )?;
        Ok(())
    }

    /// Opens a ticket for a new order.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn create_ticket(&self, order: &OrderCreated) -> Result<Ticket> {
        let ticket = self
            .tickets
            .create(Ticket::create(
                order.id,
                order.restaurant_id,
                order.items.clone(),
            ))
            .await?;

        self.emit(
            order.id,
            TicketCreated {
                id: order.id,
                restaurant_id: order.restaurant_id,
            },
        )
        .await?;

        tracing::info!(ticket_id = %order.id, items = order.items.len(), "ticket created");
        Ok(ticket)
    }

    /// The restaurant accepts the order and promises it by `ready_by`.
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, id: AggregateId, ready_by: DateTime<Utc>) -> Result<Ticket> {
        let ticket = self
            .tickets
            .execute(id, |ticket| {
                ticket.approve(ready_by)?;
                Ok(())
            })
            .await?;
        tracing::info!(ticket_id = %id, %ready_by, "ticket accepted");
        self.emit(id, TicketAccepted { id, ready_by }).await?;
        Ok(ticket)
    }

    /// The restaurant refuses the order.
    #[tracing::instrument(skip(self))]
    pub async fn reject(&self, id: AggregateId) -> Result<Ticket> {
        self.transition(id, TicketAction::RejectTicket).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn begin_preparing(&self, id: AggregateId) -> Result<Ticket> {
        let ticket = self.transition(id, TicketAction::BeginPreparing).await?;
        self.emit(id, TicketPreparationStarted { id }).await?;
        Ok(ticket)
    }

    #[tracing::instrument(skip(self))]
    pub async fn finish_preparing(&self, id: AggregateId) -> Result<Ticket> {
        let ticket = self.transition(id, TicketAction::FinishPreparing).await?;
        self.emit(id, TicketReadyForPickup { id }).await?;
        Ok(ticket)
    }

    /// Hands the food over. The ticket completes once delivery confirms
    /// the pickup.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, id: AggregateId) -> Result<Ticket> {
        self.transition(id, TicketAction::CompleteTicket).await
    }

    /// Delivery confirmed the pickup.
    ///
    /// A ticket still waiting at the counter was handed over without
    /// `complete`, so the handover is applied first.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_completion(&self, id: AggregateId) -> Result<Ticket> {
        let ticket = self
            .tickets
            .execute(id, |ticket| {
                if ticket.state() == TicketState::ReadyForPickup {
                    ticket.exec(TicketAction::CompleteTicket)?;
                }
                ticket.exec(TicketAction::CompleteConfirmed)?;
                Ok(())
            })
            .await?;
        tracing::info!(ticket_id = %id, state = %ticket.state(), "ticket pickup confirmed");
        self.emit(id, TicketCompleted { id }).await?;
        Ok(ticket)
    }

    /// Takes the ticket back after the courier refused the handover.
    #[tracing::instrument(skip(self))]
    pub async fn reject_completion(&self, id: AggregateId) -> Result<Ticket> {
        self.transition(id, TicketAction::CompleteRejected).await
    }

    /// The restaurant drops an order it had accepted.
    #[tracing::instrument(skip(self))]
    pub async fn decline(&self, id: AggregateId) -> Result<Ticket> {
        self.transition(id, TicketAction::DeclineTicket).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: AggregateId) -> Result<Ticket> {
        let ticket = self.transition(id, TicketAction::CancelTicket).await?;
        self.emit(id, TicketCanceled { id }).await?;
        Ok(ticket)
    }

    async fn transition(&self, id: AggregateId, action: TicketAction) -> Result<Ticket> {
        let ticket = self
            .tickets
            .execute(id, |ticket| {
                ticket.exec(action)?;
                Ok(())
            })
            .await?;
        tracing::info!(ticket_id = %id, %action, state = %ticket.state(), "ticket transitioned");
        Ok(ticket)
    }

    async fn emit(&self, id: AggregateId, event: impl Into<KitchenEvent>) -> Result<()> {
        self.publisher.publish_event(id, &event.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl<R, P> EventHandler<OrderCreated> for KitchenService<R, P>
where
    R: Repository<Ticket>,
    P: Producer + 'static,
{
    async fn handle(&self, event: Envelope<OrderCreated>) -> std::result::Result<(), HandlerError> {
        acknowledge(self.create_ticket(event.payload()).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<OrderCanceled> for KitchenService<R, P>
where
    R: Repository<Ticket>,
    P: Producer + 'static,
{
    async fn handle(&self, event: Envelope<OrderCanceled>) -> std::result::Result<(), HandlerError> {
        acknowledge(self.cancel(event.payload().id).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<DeliveryPickedUp> for KitchenService<R, P>
where
    R: Repository<Ticket>,
    P: Producer + 'static,
{
    async fn handle(
        &self,
        event: Envelope<DeliveryPickedUp>,
    ) -> std::result::Result<(), HandlerError> {
        acknowledge(self.confirm_completion(event.payload().id).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<DeliveryPickupRejected> for KitchenService<R, P>
where
    R: Repository<Ticket>,
    P: Producer + 'static,
{
    async fn handle(
        &self,
        event: Envelope<DeliveryPickupRejected>,
    ) -> std::result::Result<(), HandlerError> {
        let rejected = event.payload();
        tracing::info!(ticket_id = %rejected.id, reason = %rejected.reason, "courier refused pickup");
        acknowledge(self.reject_completion(rejected.id).await)
    }
}
