//! Delivery service: reacts to order, kitchen and courier events and runs
//! delivery commands.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::AggregateId;
use event_bus::{
    Envelope, EventHandler, HandlerError, Producer, Publisher, RegistryBuilder, RegistryError,
};

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::{DomainError, Result, acknowledge};
use crate::events::{
    CourierAssigned, CourierAvailabilityChanged, CourierCreated, CourierEvent, DeliveryCanceled,
    DeliveryCompleted, DeliveryCreated, DeliveryEvent, DeliveryPickedUp, DeliveryPickupRejected,
    KitchenEvent, OrderCanceled, OrderCreated, OrderEvent, TicketPreparationStarted,
    TicketReadyForPickup,
};
use crate::repository::Repository;

use super::{CourierRoster, Delivery, DeliveryAction, DeliveryState};

/// Owns the deliveries and the courier roster.
///
/// Every successful command is saved before its event is published.
pub struct DeliveryService<R, P: Producer> {
    deliveries: CommandHandler<Delivery, R>,
    couriers: CourierRoster,
    publisher: Publisher<P>,
}

impl<R, P> DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    /// Consumer group the service reads its topics with.
    pub const GROUP_ID: &'static str = "delivery-svc";

    pub fn new(repository: R, publisher: Publisher<P>) -> Self {
        Self {
            deliveries: CommandHandler::new(repository),
            couriers: CourierRoster::new(),
            publisher,
        }
    }

    pub fn couriers(&self) -> &CourierRoster {
        &self.couriers
    }

    pub fn publisher(&self) -> &Publisher<P> {
        &self.publisher
    }

    pub async fn delivery(&self, id: AggregateId) -> Result<Delivery> {
        self.deliveries.load(id).await
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
            .register::<KitchenEvent, TicketPreparationStarted, _>(
                KitchenEvent::TICKET_PREPARATION_STARTED,
                Arc::clone(service),
            )?
            .register::<KitchenEvent, TicketReadyForPickup, _>(
                KitchenEvent::TICKET_READY_FOR_PICKUP,
                Arc::clone(service),
            )?
            .register::<CourierEvent, CourierCreated, _>(
                CourierEvent::COURIER_CREATED,
                Arc::clone(service),
            )?
            .register::<CourierEvent, CourierAvailabilityChanged, _>(
                CourierEvent::COURIER_AVAILABILITY_CHANGED,
                Arc::clone(service),
            )?;
        Ok(())
    }

    /// Creates a pending delivery for a new order.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn create_delivery(&self, order: &OrderCreated) -> Result<Delivery> {
        let delivery = self
            .deliveries
            .create(Delivery::create(
                order.id,
                order.restaurant_id,
                order.delivery_address.clone(),
            ))
            .await?;

        let details = delivery.details();
        self.emit(
            order.id,
            DeliveryCreated {
                id: order.id,
                restaurant_id: details.restaurant_id,
                delivery_address: details.delivery_address.clone(),
            },
        )
        .await?;

        tracing::info!(delivery_id = %order.id, "delivery created");
        Ok(delivery)
    }

    /// Assigns an available courier to the delivery.
    ///
    /// A courier assigned earlier is released back to the roster. Assigning
    /// the courier who already holds the delivery changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn assign_courier(&self, id: AggregateId, courier_id: AggregateId) -> Result<Delivery> {
        let current = self.deliveries.load(id).await?;
        if current.courier_id() == Some(courier_id) && current.state().accepts_courier() {
            tracing::debug!(delivery_id = %id, %courier_id, "courier already assigned");
            return Ok(current);
        }

        self.couriers.reserve(courier_id).await?;

        let mut previous = None;
        let assigned = self
            .deliveries
            .execute(id, |delivery| {
                previous = delivery.courier_id();
                delivery.assign_courier(courier_id)
            })
            .await;

        let delivery = match assigned {
            Ok(delivery) => delivery,
            Err(err) => {
                self.release(courier_id).await;
                return Err(err);
            }
        };
        if let Some(previous) = previous.filter(|previous| *previous != courier_id) {
            self.release(previous).await;
        }

        self.emit(id, CourierAssigned { id, courier_id }).await?;
        tracing::info!(delivery_id = %id, %courier_id, "courier assigned");
        Ok(delivery)
    }

    /// The assigned courier has collected the order.
    #[tracing::instrument(skip(self))]
    pub async fn pick_up(&self, id: AggregateId) -> Result<Delivery> {
        let delivery = self.transition(id, DeliveryAction::PickUpDelivery).await?;
        let picked_up_at = delivery.details().picked_up_at.unwrap_or_else(Utc::now);
        self.emit(id, DeliveryPickedUp { id, picked_up_at }).await?;
        Ok(delivery)
    }

    /// The courier refused the handover at the restaurant.
    ///
    /// The delivery stays ready for pickup; the kitchen takes the ticket back.
    #[tracing::instrument(skip(self, reason))]
    pub async fn reject_pickup(&self, id: AggregateId, reason: impl Into<String>) -> Result<Delivery> {
        let delivery = self.deliveries.load(id).await?;
        let state = delivery.state();
        if state != DeliveryState::ReadyForPickup {
            return Err(DomainError::InvalidOperation {
                aggregate_type: Delivery::aggregate_type(),
                id,
                operation: "reject pickup of",
                state: state.as_str(),
            });
        }

        let reason = reason.into();
        tracing::info!(delivery_id = %id, %reason, "pickup rejected");
        self.emit(id, DeliveryPickupRejected { id, reason }).await?;
        Ok(delivery)
    }

    /// The order reached the customer. The courier becomes available again.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, id: AggregateId) -> Result<Delivery> {
        let delivery = self.transition(id, DeliveryAction::CompleteDelivery).await?;
        self.release_assigned(&delivery).await;

        let delivered_at = delivery.details().delivered_at.unwrap_or_else(Utc::now);
        self.emit(id, DeliveryCompleted { id, delivered_at }).await?;
        Ok(delivery)
    }

    /// The delivery service will not take the job.
    #[tracing::instrument(skip(self))]
    pub async fn decline(&self, id: AggregateId) -> Result<Delivery> {
        let delivery = self.transition(id, DeliveryAction::DeclineDelivery).await?;
        self.release_assigned(&delivery).await;
        Ok(delivery)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: AggregateId) -> Result<Delivery> {
        let delivery = self.transition(id, DeliveryAction::CancelDelivery).await?;
        self.release_assigned(&delivery).await;
        self.emit(id, DeliveryCanceled { id }).await?;
        Ok(delivery)
    }

    async fn transition(&self, id: AggregateId, action: DeliveryAction) -> Result<Delivery> {
        let delivery = self
            .deliveries
            .execute(id, |delivery| {
                delivery.exec(action)?;
                Ok(())
            })
            .await?;
        tracing::info!(delivery_id = %id, %action, state = %delivery.state(), "delivery transitioned");
        Ok(delivery)
    }

    async fn emit(&self, id: AggregateId, event: impl Into<DeliveryEvent>) -> Result<()> {
        self.publisher.publish_event(id, &event.into()).await?;
        Ok(())
    }

    async fn release_assigned(&self, delivery: &Delivery) {
        if let Some(courier_id) = delivery.courier_id() {
            self.release(courier_id).await;
        }
    }

    async fn release(&self, courier_id: AggregateId) {
        if let Err(err) = self.couriers.set_available(courier_id, true).await {
            tracing::warn!(%courier_id, error = %err, "could not release courier");
        }
    }
}

#[async_trait]
impl<R, P> EventHandler<OrderCreated> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(&self, event: Envelope<OrderCreated>) -> std::result::Result<(), HandlerError> {
        acknowledge(self.create_delivery(event.payload()).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<OrderCanceled> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(&self, event: Envelope<OrderCanceled>) -> std::result::Result<(), HandlerError> {
        acknowledge(self.cancel(event.payload().id).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<TicketPreparationStarted> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(
        &self,
        event: Envelope<TicketPreparationStarted>,
    ) -> std::result::Result<(), HandlerError> {
        let id = event.payload().id;
        acknowledge(self.transition(id, DeliveryAction::BeginPreparingDelivery).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<TicketReadyForPickup> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(
        &self,
        event: Envelope<TicketReadyForPickup>,
    ) -> std::result::Result<(), HandlerError> {
        let id = event.payload().id;
        acknowledge(self.transition(id, DeliveryAction::ReadyDeliveryForPickup).await)
    }
}

#[async_trait]
impl<R, P> EventHandler<CourierCreated> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(&self, event: Envelope<CourierCreated>) -> std::result::Result<(), HandlerError> {
        let courier = event.into_payload();
        tracing::debug!(courier_id = %courier.id, name = %courier.name, "courier joined");
        self.couriers.upsert(courier.id, courier.name).await;
        Ok(())
    }
}

#[async_trait]
impl<R, P> EventHandler<CourierAvailabilityChanged> for DeliveryService<R, P>
where
    R: Repository<Delivery>,
    P: Producer + 'static,
{
    async fn handle(
        &self,
        event: Envelope<CourierAvailabilityChanged>,
    ) -> std::result::Result<(), HandlerError> {
        let change = event.payload();
        match self.couriers.set_available(change.id, change.available).await {
            Err(DomainError::UnknownCourier(id)) => {
                tracing::warn!(courier_id = %id, "availability change for unknown courier");
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }
}
