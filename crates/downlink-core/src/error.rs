//! Error types for the definition tables and the frame codec.

use thiserror::Error;

use crate::scalar::Scalar;

/// Errors detected while building the derived maps from the static tables.
///
/// These indicate a misconfigured definition module and are raised once, at
/// table-load time, never on the packet path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("subsystem '{subsystem}' id {id} does not fit in {bits} bits")]
    SubsystemIdTooWide { subsystem: String, id: u8, bits: u32 },

    #[error("{count} reports defined, report id field holds at most {max}")]
    TooManyReports { count: usize, max: usize },

    #[error("{count} commands defined, command id field holds at most {max}")]
    TooManyCommands { count: usize, max: usize },

    #[error("subsystem '{subsystem}' has {count} variables, id field holds at most {max}")]
    TooManyVariables {
        subsystem: String,
        count: usize,
        max: usize,
    },

    #[error("variable '{variable}' references unknown subsystem '{subsystem}'")]
    UnknownSubsystem { variable: String, subsystem: String },

    #[error("report '{report}' references unknown variable '{variable}'")]
    UnknownReportVariable { report: String, variable: String },

    #[error("report '{report}': variable '{variable}' belongs to subsystem '{actual}', not '{declared}'")]
    ReportSubsystemMismatch {
        report: String,
        variable: String,
        declared: String,
        actual: String,
    },

    #[error("command '{command}' references unknown argument '{argument}'")]
    UnknownCommandArgument { command: String, argument: String },

    #[error("command '{command}': variable-length argument '{argument}' must be the last argument")]
    VariableArgumentNotLast { command: String, argument: String },

    #[error("report '{report}' is {size} bytes on the wire, limit is {max}")]
    ReportTooLarge {
        report: String,
        size: usize,
        max: usize,
    },

    #[error("command '{command}' fixed portion is {size} bytes on the wire, limit is {max}")]
    CommandTooLarge {
        command: String,
        size: usize,
        max: usize,
    },
}

/// Errors raised while constructing entities or packing/unpacking frames.
#[derive(Debug, Error)]
pub enum CodecError {
    // Schema lookups (entity constructors, unpack id resolution)
    #[error("unknown report '{0}'")]
    UnknownReport(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("variable '{variable}' is not part of report '{report}'")]
    VariableNotInReport { report: String, variable: String },

    #[error("argument '{argument}' is not valid for command '{command}'")]
    ArgumentNotInCommand { command: String, argument: String },

    // Encoding
    #[error("argument '{argument}' not set for command '{command}'")]
    MissingArgument { command: String, argument: String },

    #[error("field '{field}' value {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },

    #[error("field '{field}' expected a {expected:?} value, got {got}")]
    WrongValueType {
        field: String,
        expected: Scalar,
        got: &'static str,
    },

    #[error("blob argument is {len} bytes, limit is {max}")]
    BlobTooLarge { len: usize, max: usize },

    #[error("variable '{0}' has no value set")]
    MissingValue(String),

    #[error("payload is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("variable-length scalar has no fixed-width encoding")]
    VariableLengthScalar,

    // Decoding
    #[error("unknown message type tag {0}")]
    UnknownMessageType(u8),

    #[error("unknown report id {0}")]
    UnknownReportId(u8),

    #[error("unknown command id {0}")]
    UnknownCommandId(u16),

    #[error("unknown variable id {variable_id} in subsystem {subsystem_id}")]
    UnknownVariableId { subsystem_id: u8, variable_id: u16 },

    #[error("frame truncated: needed {needed} bytes, got {got}")]
    TruncatedFrame { needed: usize, got: usize },

    #[error("payload is not valid UTF-8")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    #[error("response frames require the command name from context; use unpack_response")]
    ResponseContextRequired,
}
