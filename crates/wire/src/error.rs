//! Wire decoding errors.
//!
//! Every variant is recoverable: the session layer logs the error and drops
//! the envelope.

use thiserror::Error;

use crate::MessageKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WireError {
    #[error("Malformed envelope: {0}")]
    Envelope(#[from] prost::DecodeError),

    #[error("Unknown message kind {0}")]
    UnknownKind(i32),

    #[error("Malformed {kind:?} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Envelope has no sender id")]
    MissingSender,

    #[error("Envelope timestamp is not finite")]
    InvalidTimestamp,
}
