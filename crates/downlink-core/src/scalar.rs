//! Scalar type tags and runtime values.
//!
//! Every wire field is described by a [`Scalar`] tag in the definition
//! tables and carried at runtime as a [`Value`]. The fixed-width tags
//! encode/decode through the configured endianness; the two variable-length
//! tags (`TrailingUtf8`, `Blob`) are argument-only and handled by the
//! command codec directly.

use bytes::Bytes;

use crate::error::CodecError;

/// Byte order used for all multi-byte scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Wire type of a telemetry variable or command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    I16,
    U16,
    I32,
    U32,
    U64,
    F32,
    F64,
    /// UTF-8 bytes with no length prefix, consuming the remainder of the
    /// frame. Only valid as the last argument of a command.
    TrailingUtf8,
    /// One length byte followed by that many opaque bytes. Only valid as
    /// the last argument of a command.
    Blob,
}

impl Scalar {
    /// Encoded size in bytes, or `None` for the variable-length tags.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Scalar::U8 => Some(1),
            Scalar::I16 | Scalar::U16 => Some(2),
            Scalar::I32 | Scalar::U32 | Scalar::F32 => Some(4),
            Scalar::U64 | Scalar::F64 => Some(8),
            Scalar::TrailingUtf8 | Scalar::Blob => None,
        }
    }

    /// Whether this tag occupies the variable-length tail of a frame.
    pub fn is_variable(self) -> bool {
        self.fixed_size().is_none()
    }

    /// The all-zero value of this type, used for unset report slots.
    pub fn zero(self) -> Value {
        match self {
            Scalar::U8 => Value::U8(0),
            Scalar::I16 => Value::I16(0),
            Scalar::U16 => Value::U16(0),
            Scalar::I32 => Value::I32(0),
            Scalar::U32 => Value::U32(0),
            Scalar::U64 => Value::U64(0),
            Scalar::F32 => Value::F32(0.0),
            Scalar::F64 => Value::F64(0.0),
            Scalar::TrailingUtf8 => Value::Str(String::new()),
            Scalar::Blob => Value::Bytes(Bytes::new()),
        }
    }

    /// Append `value` to `out` in this type's wire encoding.
    ///
    /// The value variant must match the tag exactly; no implicit numeric
    /// coercion happens on the wire path.
    pub fn encode(
        self,
        field: &str,
        value: &Value,
        endian: Endian,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        macro_rules! put {
            ($v:expr) => {
                match endian {
                    Endian::Big => out.extend_from_slice(&$v.to_be_bytes()),
                    Endian::Little => out.extend_from_slice(&$v.to_le_bytes()),
                }
            };
        }

        match (self, value) {
            (Scalar::U8, Value::U8(v)) => out.push(*v),
            (Scalar::I16, Value::I16(v)) => put!(v),
            (Scalar::U16, Value::U16(v)) => put!(v),
            (Scalar::I32, Value::I32(v)) => put!(v),
            (Scalar::U32, Value::U32(v)) => put!(v),
            (Scalar::U64, Value::U64(v)) => put!(v),
            (Scalar::F32, Value::F32(v)) => put!(v),
            (Scalar::F64, Value::F64(v)) => put!(v),
            _ => {
                return Err(CodecError::WrongValueType {
                    field: field.to_string(),
                    expected: self,
                    got: value.type_name(),
                })
            }
        }
        Ok(())
    }

    /// Decode one value of this type from the front of `bytes`.
    /// Returns the value and the number of bytes consumed.
    pub fn decode(self, bytes: &[u8], endian: Endian) -> Result<(Value, usize), CodecError> {
        let size = self.fixed_size().ok_or(CodecError::VariableLengthScalar)?;
        if bytes.len() < size {
            return Err(CodecError::TruncatedFrame {
                needed: size,
                got: bytes.len(),
            });
        }

        macro_rules! get {
            ($ty:ty) => {{
                let raw: [u8; std::mem::size_of::<$ty>()] =
                    bytes[..size].try_into().unwrap_or_default();
                match endian {
                    Endian::Big => <$ty>::from_be_bytes(raw),
                    Endian::Little => <$ty>::from_le_bytes(raw),
                }
            }};
        }

        let value = match self {
            Scalar::U8 => Value::U8(bytes[0]),
            Scalar::I16 => Value::I16(get!(i16)),
            Scalar::U16 => Value::U16(get!(u16)),
            Scalar::I32 => Value::I32(get!(i32)),
            Scalar::U32 => Value::U32(get!(u32)),
            Scalar::U64 => Value::U64(get!(u64)),
            Scalar::F32 => Value::F32(get!(f32)),
            Scalar::F64 => Value::F64(get!(f64)),
            Scalar::TrailingUtf8 | Scalar::Blob => return Err(CodecError::VariableLengthScalar),
        };
        Ok((value, size))
    }
}

/// A runtime value for a report slot or command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Bytes),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Integer view of the value, for callers that treat wire integers
    /// uniformly (command handlers, mostly). Floats and strings are `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            Value::I16(v) => u64::try_from(*v).ok(),
            Value::I32(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}
