//! Couriers known to the delivery service.

use std::collections::HashMap;
use std::sync::Arc;

use common::AggregateId;
use tokio::sync::RwLock;

use crate::error::{DomainError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Courier {
    pub id: AggregateId,
    pub name: String,
    pub available: bool,
}

/// Local view of the courier service, fed by courier events.
///
/// Cloning shares the roster.
#[derive(Debug, Clone, Default)]
pub struct CourierRoster {
    couriers: Arc<RwLock<HashMap<AggregateId, Courier>>>,
}

impl CourierRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a courier, or renames one already known. New couriers start
    /// available; a known courier keeps its availability.
    pub async fn upsert(&self, id: AggregateId, name: impl Into<String>) {
        let name = name.into();
        let mut couriers = self.couriers.write().await;
        couriers
            .entry(id)
            .and_modify(|courier| courier.name.clone_from(&name))
            .or_insert(Courier {
                id,
                name,
                available: true,
            });
    }

    pub async fn set_available(&self, id: AggregateId, available: bool) -> Result<()> {
        let mut couriers = self.couriers.write().await;
        let courier = couriers
            .get_mut(&id)
            .ok_or(DomainError::UnknownCourier(id))?;
        courier.available = available;
        Ok(())
    }

    pub async fn get(&self, id: AggregateId) -> Option<Courier> {
        self.couriers.read().await.get(&id).cloned()
    }

    /// Available couriers, ordered by id.
    pub async fn available(&self) -> Vec<Courier> {
        let mut available: Vec<_> = self
            .couriers
            .read()
            .await
            .values()
            .filter(|courier| courier.available)
            .cloned()
            .collect();
        available.sort_by_key(|courier| courier.id);
        available
    }

    /// Marks an available courier as busy and returns it.
    pub async fn reserve(&self, id: AggregateId) -> Result<Courier> {
        let mut couriers = self.couriers.write().await;
        let courier = couriers
            .get_mut(&id)
            .ok_or(DomainError::UnknownCourier(id))?;
        if !courier.available {
            return Err(DomainError::CourierUnavailable(id));
        }
        courier.available = false;
        Ok(courier.clone())
    }
}
