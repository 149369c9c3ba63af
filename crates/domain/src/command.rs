//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use tokio::sync::Mutex;

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::repository::Repository;

/// Applies commands to aggregates stored in a repository.
///
/// Each command loads the aggregate, mutates a copy, and saves it only if
/// the command succeeded. Commands are applied one at a time, so a handler
/// and an external command cannot interleave on the same aggregate.
pub struct CommandHandler<A, R> {
    repository: R,
    serial: Mutex<()>,
    _phantom: PhantomData<fn() -> A>,
}

impl<A, R> CommandHandler<A, R>
where
    A: Aggregate,
    R: Repository<A>,
{
    /// Creates a new command handler over `repository`.
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            serial: Mutex::new(()),
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Stores a newly created aggregate.
    pub async fn create(&self, aggregate: A) -> Result<A> {
        let _guard = self.serial.lock().await;
        self.repository.insert(&aggregate).await?;
        Ok(aggregate)
    }

    /// Loads the aggregate, runs `command` on it and saves the result.
    ///
    /// Nothing is saved when `command` fails.
    pub async fn execute<F>(&self, id: AggregateId, command: F) -> Result<A>
    where
        F: FnOnce(&mut A) -> Result<()>,
    {
        let _guard = self.serial.lock().await;
        let mut aggregate = self.repository.load(id).await?;
        command(&mut aggregate)?;
        self.repository.save(&aggregate).await?;
        Ok(aggregate)
    }

    /// Loads an aggregate without modifying it.
    pub async fn load(&self, id: AggregateId) -> Result<A> {
        Ok(self.repository.load(id).await?)
    }
}
