//! Event catalogue shared by the fulfillment services.
//!
//! Every topic carries one payload union. Kind codes are scoped to their
//! topic, so the same code may appear on several topics. Field names follow
//! the wire format (`"ID"`, `"OrderID"`, PascalCase elsewhere).

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_bus::topic_events;
use serde::{Deserialize, Serialize};

/// A line of an order as the kitchen sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "MenuItemID")]
    pub menu_item_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
}

/// An order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "ConsumerID")]
    pub consumer_id: i64,
    #[serde(rename = "RestaurantID")]
    pub restaurant_id: i64,
    #[serde(rename = "Items", default)]
    pub items: Vec<LineItem>,
    #[serde(rename = "DeliveryAddress")]
    pub delivery_address: String,
}

/// An order was canceled by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCanceled {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "Reason", default)]
    pub reason: String,
}

topic_events! {
    /// Events published by the order service.
    pub enum OrderEvent: "order-events-topic" {
        OrderCreated(OrderCreated) = 1 => ORDER_CREATED,
        OrderCanceled(OrderCanceled) = 2 => ORDER_CANCELED,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCreated {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "RestaurantID")]
    pub restaurant_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAccepted {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "ReadyBy")]
    pub ready_by: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPreparationStarted {
    #[serde(rename = "ID")]
    pub id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReadyForPickup {
    #[serde(rename = "ID")]
    pub id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCompleted {
    #[serde(rename = "ID")]
    pub id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCanceled {
    #[serde(rename = "ID")]
    pub id: AggregateId,
}

topic_events! {
    /// Events published by the kitchen service.
    pub enum KitchenEvent: "kitchen-events-topic" {
        TicketCreated(TicketCreated) = 1 => TICKET_CREATED,
        TicketAccepted(TicketAccepted) = 2 => TICKET_ACCEPTED,
        TicketPreparationStarted(TicketPreparationStarted) = 3 => TICKET_PREPARATION_STARTED,
        TicketReadyForPickup(TicketReadyForPickup) = 4 => TICKET_READY_FOR_PICKUP,
        TicketCompleted(TicketCompleted) = 5 => TICKET_COMPLETED,
        TicketCanceled(TicketCanceled) = 6 => TICKET_CANCELED,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierCreated {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierAvailabilityChanged {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "Available")]
    pub available: bool,
}

topic_events! {
    /// Events published by the courier service.
    pub enum CourierEvent: "courier-events-topic" {
        CourierCreated(CourierCreated) = 1 => COURIER_CREATED,
        CourierAvailabilityChanged(CourierAvailabilityChanged) = 2 => COURIER_AVAILABILITY_CHANGED,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCreated {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "RestaurantID")]
    pub restaurant_id: i64,
    #[serde(rename = "DeliveryAddress")]
    pub delivery_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierAssigned {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "CourierID")]
    pub courier_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPickedUp {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "PickedUpAt")]
    pub picked_up_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCompleted {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "DeliveredAt")]
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCanceled {
    #[serde(rename = "ID")]
    pub id: AggregateId,
}

/// The courier refused the handover at the restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPickupRejected {
    #[serde(rename = "ID")]
    pub id: AggregateId,
    #[serde(rename = "Reason")]
    pub reason: String,
}

topic_events! {
    /// Events published by the delivery service.
    pub enum DeliveryEvent: "delivery-events-topic" {
        DeliveryCreated(DeliveryCreated) = 1 => DELIVERY_CREATED,
        CourierAssigned(CourierAssigned) = 2 => COURIER_ASSIGNED,
        DeliveryPickedUp(DeliveryPickedUp) = 3 => DELIVERY_PICKED_UP,
        DeliveryCompleted(DeliveryCompleted) = 4 => DELIVERY_COMPLETED,
        DeliveryCanceled(DeliveryCanceled) = 5 => DELIVERY_CANCELED,
        DeliveryPickupRejected(DeliveryPickupRejected) = 6 => DELIVERY_PICKUP_REJECTED,
    }
}
