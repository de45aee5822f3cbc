//! Binary trace decoding: container framing, generic message conversion and
//! identity de-duplication.

pub mod dedupe;
pub mod frame;
pub mod message;

use serde::Serialize;
use thiserror::Error;

use crate::schema::SchemaError;

pub use dedupe::dedupe_identities;
pub use frame::{ContainerFormat, RawEntry, decode_frames};
pub use message::{decode_entry, message_to_node};

/// Fatal for the file or entry being decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid format: buffer does not start with magic {expected:02x?}")]
    InvalidFormat { expected: Vec<u8> },
    #[error("malformed container at byte {offset}: {reason}")]
    MalformedContainer { offset: usize, reason: &'static str },
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("protobuf: {0}")]
    Protobuf(#[from] protobuf::Error),
}

/// Recoverable conditions attached to a decoded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DecodeWarning {
    DuplicateIdentity {
        numeric_id: Option<i64>,
        name: String,
        renamed: String,
    },
}

impl std::fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentity {
                numeric_id,
                name,
                renamed,
            } => match numeric_id {
                Some(id) => write!(f, "duplicate identity {id} {name}, shown as {renamed:?}"),
                None => write!(f, "duplicate identity {name}, shown as {renamed:?}"),
            },
        }
    }
}
