//! Transport-layer errors.

use thiserror::Error;

use downlink_core::CodecError;

/// Errors from the transaction layer and the manager.
///
/// None of these are retried at this layer; higher layers decide whether to
/// re-request a fragment or abandon the transaction.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transaction manager is full ({max} active)")]
    ManagerFull { max: usize },

    #[error("transaction id {0} is already in use")]
    TidAlreadyInUse(u8),

    #[error("transaction id {0} does not fit the 3-bit id space")]
    TidOutOfRange(u8),

    #[error("no transaction with id {0}")]
    UnknownTransaction(u8),

    #[error("fragment {seq} missing at write time")]
    MissingFragmentAtWrite { seq: u16 },

    #[error("sequence {seq} out of range for {count} fragments")]
    SequenceOutOfRange { seq: u16, count: u32 },

    #[error("transaction has no file path")]
    NoFilePath,

    #[error("fragment count unknown; INIT_TRANS not applied yet")]
    UnknownFragmentCount,

    #[error("file splits into {fragments} fragments, sequence field holds {max}")]
    TooManyFragments { fragments: u64, max: u32 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
