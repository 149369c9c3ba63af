//! Aggregate storage.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregate::Aggregate;

/// Errors returned by a [`Repository`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// An aggregate with this id has already been created.
    #[error("Aggregate already exists: {aggregate_type} with id {id}")]
    AlreadyExists {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Storage contract used by the domain services.
#[async_trait]
pub trait Repository<A: Aggregate>: Send + Sync + 'static {
    /// Returns the aggregate with `id`, if stored.
    async fn find(&self, id: AggregateId) -> Result<Option<A>, RepositoryError>;

    /// Stores `aggregate`, replacing any previous version.
    async fn save(&self, aggregate: &A) -> Result<(), RepositoryError>;

    /// Stores a new aggregate. Fails if one with the same id exists.
    async fn insert(&self, aggregate: &A) -> Result<(), RepositoryError>;

    /// Returns the aggregate with `id` or [`RepositoryError::NotFound`].
    async fn load(&self, id: AggregateId) -> Result<A, RepositoryError> {
        self.find(id)
            .await?
            .ok_or(RepositoryError::NotFound {
                aggregate_type: A::aggregate_type(),
                id,
            })
    }
}

/// In-memory repository implementation for testing and the demo worker.
///
/// Cloning shares the underlying storage.
pub struct InMemoryRepository<A> {
    aggregates: Arc<RwLock<HashMap<AggregateId, A>>>,
    _phantom: PhantomData<fn() -> A>,
}

impl<A: Aggregate> InMemoryRepository<A> {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self {
            aggregates: Arc::new(RwLock::new(HashMap::new())),
            _phantom: PhantomData,
        }
    }

    /// Returns the number of stored aggregates.
    pub async fn len(&self) -> usize {
        self.aggregates.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.aggregates.read().await.is_empty()
    }
}

impl<A: Aggregate> Default for InMemoryRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for InMemoryRepository<A> {
    fn clone(&self) -> Self {
        Self {
            aggregates: Arc::clone(&self.aggregates),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<A: Aggregate> Repository<A> for InMemoryRepository<A> {
    async fn find(&self, id: AggregateId) -> Result<Option<A>, RepositoryError> {
        Ok(self.aggregates.read().await.get(&id).cloned())
    }

    async fn save(&self, aggregate: &A) -> Result<(), RepositoryError> {
        self.aggregates
            .write()
            .await
            .insert(aggregate.id(), aggregate.clone());
        Ok(())
    }

    async fn insert(&self, aggregate: &A) -> Result<(), RepositoryError> {
        let mut aggregates = self.aggregates.write().await;
        if aggregates.contains_key(&aggregate.id()) {
            return Err(RepositoryError::AlreadyExists {
                aggregate_type: A::aggregate_type(),
                id: aggregate.id(),
            });
        }
        aggregates.insert(aggregate.id(), aggregate.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Parcel {
        id: AggregateId,
        weight: u32,
    }

    impl Aggregate for Parcel {
        fn aggregate_type() -> &'static str {
            "Parcel"
        }

        fn id(&self) -> AggregateId {
            self.id
        }
    }

    fn parcel(id: i64, weight: u32) -> Parcel {
        Parcel {
            id: AggregateId::new(id),
            weight,
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = InMemoryRepository::new();
        repo.save(&parcel(1, 3)).await.unwrap();

        assert_eq!(repo.load(AggregateId::new(1)).await.unwrap(), parcel(1, 3));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let repo: InMemoryRepository<Parcel> = InMemoryRepository::new();
        let err = repo.load(AggregateId::new(9)).await.unwrap_err();

        assert_eq!(
            err,
            RepositoryError::NotFound {
                aggregate_type: "Parcel",
                id: AggregateId::new(9)
            }
        );
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_rejects_existing_id() {
        let repo = InMemoryRepository::new();
        repo.insert(&parcel(1, 3)).await.unwrap();

        let err = repo.insert(&parcel(1, 5)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
        assert_eq!(repo.load(AggregateId::new(1)).await.unwrap().weight, 3);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let repo = InMemoryRepository::new();
        let other = repo.clone();
        repo.save(&parcel(2, 1)).await.unwrap();

        assert!(other.find(AggregateId::new(2)).await.unwrap().is_some());
    }
}
