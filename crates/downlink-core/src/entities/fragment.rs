//! File-transfer fragment entity.

use bytes::Bytes;

/// One packet of a file-transfer transaction.
///
/// Carries no length field: the record boundary of the underlying reliable
/// stream delimits the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    tid: u8,
    seq_number: u16,
    payload: Bytes,
}

impl Fragment {
    pub fn new(tid: u8, seq_number: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            tid,
            seq_number,
            payload: payload.into(),
        }
    }

    pub fn tid(&self) -> u8 {
        self.tid
    }

    pub fn seq_number(&self) -> u16 {
        self.seq_number
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
