//! Core aggregate trait.

use common::AggregateId;

/// An entity persisted and addressed as a unit.
///
/// Delivery and ticket aggregates share the id of the order they belong to,
/// so all their events land on the same partition.
pub trait Aggregate: Clone + Send + Sync + 'static {
    /// Returns the aggregate type name, used in errors and logs.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier.
    fn id(&self) -> AggregateId;
}
