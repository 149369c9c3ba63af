//! Identifier types shared by every fulfillment service.

mod types;

pub use types::AggregateId;
