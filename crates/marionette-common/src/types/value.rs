//! The tagged remote value union
//!
//! Every argument and result on the wire is exactly one of these
//! variants. Consumers must branch on the tag before reading payload
//! fields; an incoming address token of zero is the null sentinel.

use crate::primitives::PrimitiveValue;
use serde::{Deserialize, Serialize};

/// A value crossing the wire in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteValue {
    /// Encoded primitive or primitive-array payload
    Primitive { type_name: String, payload: String },
    /// Address token for an object pinned in the target
    Remote { address: u64, type_name: String },
    /// A bare type reference passed as a value
    TypeRef {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        full_name: String,
    },
    /// The null sentinel (address token value zero)
    Null,
}

impl RemoteValue {
    /// Wrap an encoded primitive
    pub fn primitive(value: &PrimitiveValue) -> Self {
        RemoteValue::Primitive {
            type_name: value.type_name(),
            payload: value.encode(),
        }
    }

    /// True for `Null` and for a `Remote` token with address zero
    pub fn is_null(&self) -> bool {
        match self {
            RemoteValue::Null => true,
            RemoteValue::Remote { address, .. } => *address == 0,
            _ => false,
        }
    }
}
