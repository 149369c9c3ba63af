//! Handler registration and dispatch.
//!
//! Handlers are registered per `(topic, event kind)` on a [`RegistryBuilder`],
//! which is then sealed into an immutable [`Registry`]. The registry is what
//! the consumer runtime consults for every message, so nothing can be
//! registered once consumption has started.

use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{Envelope, RawEnvelope};
use crate::error::{DispatchError, RegistryError};
use crate::topic::{EventKind, TopicEvent};

/// Error type returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Key of a registry entry: a topic plus an event kind scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryKey {
    topic: String,
    kind: EventKind,
}

impl RegistryKey {
    pub fn new(topic: impl Into<String>, kind: EventKind) -> Self {
        Self {
            topic: topic.into(),
            kind,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl std::fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.topic, self.kind)
    }
}

/// A statically typed application handler for payload `P`.
#[async_trait]
pub trait EventHandler<P>: Send + Sync + 'static {
    async fn handle(&self, event: Envelope<P>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<P, H> EventHandler<P> for Arc<H>
where
    P: Send + 'static,
    H: EventHandler<P>,
{
    async fn handle(&self, event: Envelope<P>) -> Result<(), HandlerError> {
        (**self).handle(event).await
    }
}

/// A handler operating on undecoded envelopes.
///
/// This is what the registry stores. [`wrap`] turns an [`EventHandler`] into one.
#[async_trait]
pub trait RawHandler: Send + Sync {
    /// Name of the payload type the handler expects.
    fn expected_shape(&self) -> &'static str;

    async fn call(&self, key: &RegistryKey, envelope: RawEnvelope) -> Result<(), DispatchError>;
}

/// Adapter from a typed [`EventHandler`] to a [`RawHandler`].
///
/// `T` is the topic's payload union, `P` the variant the handler accepts.
pub struct TypedHandler<T, P, H> {
    handler: H,
    _marker: PhantomData<fn() -> (T, P)>,
}

/// Wraps a typed handler so it accepts raw envelopes.
///
/// The wrapped handler decodes the payload through `T`, then narrows it to
/// `P`. A payload that decodes to any other variant of `T` fails with
/// [`DispatchError::TypeMismatch`].
pub fn wrap<T, P, H>(handler: H) -> TypedHandler<T, P, H>
where
    T: TopicEvent,
    P: TryFrom<T, Error = T> + Send + 'static,
    H: EventHandler<P>,
{
    TypedHandler {
        handler,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<T, P, H> RawHandler for TypedHandler<T, P, H>
where
    T: TopicEvent,
    P: TryFrom<T, Error = T> + Send + 'static,
    H: EventHandler<P>,
{
    fn expected_shape(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    async fn call(&self, key: &RegistryKey, envelope: RawEnvelope) -> Result<(), DispatchError> {
        let decoded = T::decode(envelope.event_kind(), envelope.payload())?;
        let payload = P::try_from(decoded).map_err(|other| DispatchError::TypeMismatch {
            key: key.clone(),
            expected: self.expected_shape(),
            found: other.shape(),
        })?;

        self.handler
            .handle(envelope.with_payload(payload))
            .await
            .map_err(|source| DispatchError::Handler {
                key: key.clone(),
                source,
            })
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler was found and completed.
    Handled,
    /// No handler is registered for the `(topic, kind)` pair; nothing ran.
    Unrouted,
}

struct Entry {
    handler: Box<dyn RawHandler>,
}

/// Collects handler registrations before the consumer starts.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<RegistryKey, Entry>,
    topics: BTreeSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind` on `T`'s topic.
    ///
    /// The handler receives payloads narrowed to `P`. Registering the same
    /// `(topic, kind)` twice fails with [`RegistryError::DuplicateRegistration`].
    pub fn register<T, P, H>(
        &mut self,
        kind: EventKind,
        handler: H,
    ) -> Result<&mut Self, RegistryError>
    where
        T: TopicEvent,
        P: TryFrom<T, Error = T> + Send + 'static,
        H: EventHandler<P>,
    {
        self.register_raw(T::TOPIC, kind, wrap::<T, P, H>(handler))
    }

    /// Registers an already wrapped handler under an explicit topic name.
    pub fn register_raw(
        &mut self,
        topic: &str,
        kind: EventKind,
        handler: impl RawHandler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let key = RegistryKey::new(topic, kind);
        if let Some(existing) = self.entries.get(&key) {
            return Err(RegistryError::DuplicateRegistration {
                key,
                existing: existing.handler.expected_shape(),
            });
        }

        tracing::debug!(%key, shape = handler.expected_shape(), "handler registered");
        self.topics.insert(topic.to_string());
        self.entries.insert(
            key,
            Entry {
                handler: Box::new(handler),
            },
        );
        Ok(self)
    }

    /// Seals the builder into an immutable registry.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
            topics: self.topics.into_iter().collect(),
        }
    }
}

/// An immutable `(topic, kind)` → handler table.
pub struct Registry {
    entries: HashMap<RegistryKey, Entry>,
    topics: Vec<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Topics with at least one registered handler, sorted.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, topic: &str, kind: EventKind) -> bool {
        self.entries.contains_key(&RegistryKey::new(topic, kind))
    }

    /// Payload type expected by the handler for `(topic, kind)`, if any.
    pub fn expected_shape(&self, topic: &str, kind: EventKind) -> Option<&'static str> {
        self.entries
            .get(&RegistryKey::new(topic, kind))
            .map(|entry| entry.handler.expected_shape())
    }

    /// Routes an envelope received on `topic` to its handler.
    ///
    /// Returns [`Dispatched::Unrouted`] when nothing is registered for the
    /// envelope's kind on this topic; that is not an error.
    pub async fn dispatch(
        &self,
        topic: &str,
        envelope: RawEnvelope,
    ) -> Result<Dispatched, DispatchError> {
        let key = RegistryKey::new(topic, envelope.event_kind());
        let Some(entry) = self.entries.get(&key) else {
            tracing::debug!(%key, "no handler registered, skipping");
            return Ok(Dispatched::Unrouted);
        };

        entry.handler.call(&key, envelope).await?;
        Ok(Dispatched::Handled)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("Registry")
            .field("topics", &self.topics)
            .field("keys", &keys)
            .finish()
    }
}
