//! downlink-core — definition tables, runtime entities, and the frame codec
//! for the satellite ↔ ground-station telemetry link.
//! The transport layer and the demo binaries build on this crate.

pub mod codec;
pub mod defs;
pub mod entities;
pub mod error;
pub mod scalar;

pub use codec::{pack, unpack, unpack_response, Message};
pub use entities::{Ack, Command, Fragment, Report, Response, Variable};
pub use error::{CodecError, SchemaError};
pub use scalar::{Endian, Scalar, Value};
