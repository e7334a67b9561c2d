//! Acknowledgement entity.

/// A small status reply, optionally carrying a UTF-8 message.
///
/// The status must fit the 5-bit header field (0..=31); the bound is
/// enforced at pack time so a constructed Ack can still be inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    response_status: u8,
    payload: Option<String>,
}

impl Ack {
    pub fn new(response_status: u8) -> Self {
        Self {
            response_status,
            payload: None,
        }
    }

    /// An ack with a message. Non-string payloads go through `ToString`,
    /// matching the wire's text-only payload.
    pub fn with_payload(response_status: u8, payload: impl ToString) -> Self {
        Self {
            response_status,
            payload: Some(payload.to_string()),
        }
    }

    pub fn response_status(&self) -> u8 {
        self.response_status
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}
