//! Command response entity.
//!
//! The response wire format does not carry the command id; the responder
//! must know from context which command it is answering, so responses are
//! decoded through `codec::unpack_response` rather than the universal
//! unpacker. The format is frozen at header byte + status byte.

use crate::defs::defs;
use crate::error::CodecError;

/// A minimal typed reply to a specific command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: &'static str,
    status: u8,
}

impl Response {
    pub fn new(command: &str, status: u8) -> Result<Self, CodecError> {
        let d = defs();
        let id = d
            .command_id(command)
            .ok_or_else(|| CodecError::UnknownCommand(command.to_string()))?;
        Ok(Self {
            command: d.command_name(id).unwrap_or_default(),
            status,
        })
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn status(&self) -> u8 {
        self.status
    }
}
