//! Event kinds and per-topic payload unions.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::PayloadError;

/// Identifies the semantic type of an event within one topic.
///
/// Kinds are only unique per topic: `courier-events-topic` and
/// `order-events-topic` may both use kind `1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventKind(i32);

impl EventKind {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for EventKind {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// The closed set of payloads carried on one topic.
///
/// Implementors are tagged unions with one variant per event kind. Each
/// variant knows its own kind code and decodes itself from raw JSON, so
/// routing never needs runtime type inspection. Serializing a value yields
/// the bare payload object (no variant tag); the kind travels in the envelope.
///
/// Use [`topic_events!`](crate::topic_events) rather than implementing this
/// by hand.
pub trait TopicEvent: Serialize + Send + Sync + Sized + 'static {
    /// Broker topic the payloads are published on.
    const TOPIC: &'static str;

    /// The event kind of this payload.
    fn kind(&self) -> EventKind;

    /// Name of the variant, used in diagnostics.
    fn shape(&self) -> &'static str;

    /// Decodes the payload declared for `kind`.
    fn decode(kind: EventKind, payload: &RawValue) -> Result<Self, PayloadError>;
}

/// Declares a topic's payload union.
///
/// ```ignore
/// topic_events! {
///     /// Events published by the courier service.
///     pub enum CourierEvent: "courier-events-topic" {
///         CourierCreated(CourierCreated) = 1 => COURIER_CREATED,
///         CourierAvailabilityChanged(CourierAvailabilityChanged) = 2 => COURIER_AVAILABILITY_CHANGED,
///     }
/// }
/// ```
///
/// This generates the enum, an associated [`EventKind`] constant per variant,
/// the [`TopicEvent`] impl, and `From`/`TryFrom` conversions between the enum
/// and each payload type. Payload types must be distinct within one topic and
/// implement `Serialize`, `DeserializeOwned`, `Debug`, `Clone` and `PartialEq`.
#[macro_export]
macro_rules! topic_events {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $topic:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident($payload:ty) = $code:literal => $konst:ident
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, ::serde::Serialize)]
        #[serde(untagged)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant($payload),
            )+
        }

        impl $name {
            $(
                pub const $konst: $crate::EventKind = $crate::EventKind::new($code);
            )+
        }

        impl $crate::TopicEvent for $name {
            const TOPIC: &'static str = $topic;

            fn kind(&self) -> $crate::EventKind {
                match self {
                    $( $name::$variant(_) => $crate::EventKind::new($code), )+
                }
            }

            fn shape(&self) -> &'static str {
                match self {
                    $( $name::$variant(_) => stringify!($variant), )+
                }
            }

            fn decode(
                kind: $crate::EventKind,
                payload: &::serde_json::value::RawValue,
            ) -> ::std::result::Result<Self, $crate::PayloadError> {
                match kind.as_i32() {
                    $(
                        $code => ::serde_json::from_str::<$payload>(payload.get())
                            .map($name::$variant)
                            .map_err(|source| $crate::PayloadError::Malformed {
                                topic: $topic,
                                kind,
                                source,
                            }),
                    )+
                    _ => Err($crate::PayloadError::UnknownKind { topic: $topic, kind }),
                }
            }
        }

        $(
            impl ::std::convert::From<$payload> for $name {
                fn from(payload: $payload) -> Self {
                    $name::$variant(payload)
                }
            }

            impl ::std::convert::TryFrom<$name> for $payload {
                type Error = $name;

                #[allow(unreachable_patterns)]
                fn try_from(event: $name) -> ::std::result::Result<Self, $name> {
                    match event {
                        $name::$variant(payload) => Ok(payload),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct CourierCreated {
        #[serde(rename = "ID")]
        pub id: i64,
        #[serde(rename = "Name")]
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct CourierRetired {
        #[serde(rename = "ID")]
        pub id: i64,
    }

    crate::topic_events! {
        pub(crate) enum CourierEvent: "courier-events-topic" {
            CourierCreated(CourierCreated) = 1 => COURIER_CREATED,
            CourierRetired(CourierRetired) = 2 => COURIER_RETIRED,
        }
    }

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    #[test]
    fn kind_constants_match_variants() {
        let created = CourierEvent::from(CourierCreated {
            id: 1,
            name: "Volen".into(),
        });
        assert_eq!(created.kind(), CourierEvent::COURIER_CREATED);
        assert_eq!(created.shape(), "CourierCreated");
        assert_eq!(CourierEvent::TOPIC, "courier-events-topic");
    }

    #[test]
    fn decode_selects_variant_by_kind() {
        let event =
            CourierEvent::decode(EventKind::new(1), &raw(r#"{"ID":1,"Name":"Volen"}"#)).unwrap();
        assert_eq!(
            event,
            CourierEvent::CourierCreated(CourierCreated {
                id: 1,
                name: "Volen".into()
            })
        );

        let event = CourierEvent::decode(EventKind::new(2), &raw(r#"{"ID":7}"#)).unwrap();
        assert_eq!(event.shape(), "CourierRetired");
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let result = CourierEvent::decode(EventKind::new(99), &raw("{}"));
        assert!(matches!(
            result,
            Err(PayloadError::UnknownKind { kind, .. }) if kind == EventKind::new(99)
        ));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let result = CourierEvent::decode(EventKind::new(1), &raw(r#"{"ID":"one"}"#));
        assert!(matches!(result, Err(PayloadError::Malformed { .. })));
    }

    #[test]
    fn serializes_as_bare_payload() {
        let event = CourierEvent::from(CourierRetired { id: 7 });
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"ID":7}"#);
    }

    #[test]
    fn try_from_narrows_to_payload() {
        let event = CourierEvent::from(CourierRetired { id: 7 });
        assert_eq!(
            CourierRetired::try_from(event.clone()).unwrap(),
            CourierRetired { id: 7 }
        );
        assert_eq!(CourierCreated::try_from(event.clone()), Err(event));
    }
}
