//! Delivery bounded context: the delivery aggregate, its lifecycle, the
//! courier roster and the service reacting to order and kitchen events.

mod aggregate;
mod courier;
mod service;
mod state;

pub use aggregate::{Delivery, DeliveryDetails};
pub use courier::{Courier, CourierRoster};
pub use service::DeliveryService;
pub use state::{DeliveryAction, DeliveryRules, DeliveryState, delivery_rules};
