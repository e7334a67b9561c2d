//! downlink-transport — the reliable file-transfer layer on top of the
//! frame codec: per-transfer state machines, missing-set bitmap
//! synchronization, SHA-1 integrity, and the process-wide transaction
//! registry.

pub mod error;
pub mod link;
pub mod manager;
pub mod transaction;

pub use error::TransportError;
pub use manager::{Direction, ManagerStats, TransactionManager, MAX_TRANSACTIONS};
pub use transaction::{
    combine_bitmap_words, TransState, Transaction, BITMAP_WINDOW_BITS, MAX_FRAGMENTS,
};
