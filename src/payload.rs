//! Auxiliary payloads and the "maybe" encoding used to carry them.
//!
//! The bus has no optional type, so a payload always travels as a presence
//! flag plus a value slot. An absent payload still fills the slot with a
//! well-typed placeholder to keep every method fixed-arity.

use serde::{Deserialize, Serialize};

/// A typed value of the kind the bus can carry in a variant slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<PayloadValue>),
    Array(Vec<PayloadValue>),
    Variant(Box<PayloadValue>),
    /// Not transmittable. Recording calls reject payloads containing one.
    Maybe(Option<Box<PayloadValue>>),
}

impl PayloadValue {
    pub fn variant(inner: PayloadValue) -> Self {
        PayloadValue::Variant(Box::new(inner))
    }

    /// Type string in the bus's signature alphabet.
    pub fn type_signature(&self) -> String {
        match self {
            PayloadValue::Bool(_) => "b".to_string(),
            PayloadValue::Byte(_) => "y".to_string(),
            PayloadValue::Int32(_) => "i".to_string(),
            PayloadValue::Uint32(_) => "u".to_string(),
            PayloadValue::Int64(_) => "x".to_string(),
            PayloadValue::Uint64(_) => "t".to_string(),
            PayloadValue::Double(_) => "d".to_string(),
            PayloadValue::Str(_) => "s".to_string(),
            PayloadValue::Bytes(_) => "ay".to_string(),
            PayloadValue::Tuple(items) => {
                let inner: String = items.iter().map(PayloadValue::type_signature).collect();
                format!("({inner})")
            }
            // Elements share one type; an empty array is typed as an array of variants.
            PayloadValue::Array(items) => match items.first() {
                Some(first) => format!("a{}", first.type_signature()),
                None => "av".to_string(),
            },
            PayloadValue::Variant(_) => "v".to_string(),
            PayloadValue::Maybe(Some(inner)) => format!("m{}", inner.type_signature()),
            PayloadValue::Maybe(None) => "mv".to_string(),
        }
    }

    pub fn contains_maybe(&self) -> bool {
        match self {
            PayloadValue::Maybe(_) => true,
            PayloadValue::Tuple(items) | PayloadValue::Array(items) => {
                items.iter().any(PayloadValue::contains_maybe)
            }
            PayloadValue::Variant(inner) => inner.contains_maybe(),
            _ => false,
        }
    }
}

macro_rules! payload_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PayloadValue {
                fn from(value: $ty) -> Self {
                    PayloadValue::$variant(value.into())
                }
            }
        )*
    };
}

payload_from! {
    bool => Bool,
    u8 => Byte,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
    String => Str,
    &str => Str,
    Vec<u8> => Bytes,
}

pub type OptionalPayload = Option<PayloadValue>;

/// What goes in the `(payload_present, payload_value)` argument pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    pub present: bool,
    pub value: PayloadValue,
}

/// Placeholder occupying the value slot when there is no payload.
pub fn empty_placeholder() -> PayloadValue {
    PayloadValue::Bool(false)
}

pub fn encode_optional(payload: OptionalPayload) -> WirePayload {
    match payload {
        Some(value) => WirePayload {
            present: true,
            value,
        },
        None => WirePayload {
            present: false,
            value: empty_placeholder(),
        },
    }
}

/// Inverse of [`encode_optional`]; the placeholder is discarded.
pub fn decode_optional(wire: WirePayload) -> OptionalPayload {
    wire.present.then_some(wire.value)
}
