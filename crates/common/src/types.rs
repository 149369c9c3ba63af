use serde::{Deserialize, Serialize};

/// Identifier of an aggregate instance (delivery, ticket, order, courier).
///
/// Aggregate ids are integers on the wire (`"AggregateID": 42`). The newtype
/// keeps them from being mixed up with offsets, partitions or event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(i64);

impl AggregateId {
    /// Creates an aggregate ID from its raw integer value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AggregateId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<AggregateId> for i64 {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}
