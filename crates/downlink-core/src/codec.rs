//! Frame codec: entities ↔ byte-exact frames.
//!
//! Every frame starts with a 1-byte prefix whose top 3 bits are the
//! message-type tag; the remaining header bits belong to the next field and
//! may straddle into the following bytes. The unpacker reads exactly the
//! first byte to dispatch and assumes nothing more until the family decoder
//! runs.
//!
//! Header layouts:
//!
//! ```text
//! Report    [tag:3][report_id:5]                   1 byte
//! Variable  [tag:3][subsystem_id:3][variable_id:10] 2 bytes
//! Command   [tag:3][command_id:13]                  2 bytes
//! Response  [tag:3][reserved:5]                     1 byte
//! Ack       [tag:3][response_status:5]              1 byte
//! Fragment  [tag:3][tid:3][sequence:13]             3 bytes (19 bits, left-aligned)
//! ```

use bytes::Bytes;

use crate::defs::{defs, MsgType, ENDIANNESS, FRAGMENT_SEQ_SIZE, FRAGMENT_TID_SIZE, MAX_PACKET_SIZE};
use crate::entities::{Ack, Command, Fragment, Report, Response, Variable};
use crate::error::CodecError;
use crate::scalar::{Scalar, Value};

/// A decoded frame, discriminated by the wire tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Report(Report),
    Variable(Variable),
    Command(Command),
    Ack(Ack),
    Fragment(Fragment),
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Report(_) => MsgType::Report,
            Message::Variable(_) => MsgType::Variable,
            Message::Command(_) => MsgType::Command,
            Message::Ack(_) => MsgType::Ack,
            Message::Fragment(_) => MsgType::Fragment,
        }
    }
}

// ── Universal dispatch ────────────────────────────────────────────────────────

/// Pack any message into its frame.
pub fn pack(message: &Message) -> Result<Vec<u8>, CodecError> {
    match message {
        Message::Report(r) => pack_report(r),
        Message::Variable(v) => pack_variable(v),
        Message::Command(c) => pack_command(c),
        Message::Ack(a) => pack_ack(a),
        Message::Fragment(f) => pack_fragment(f),
    }
}

/// Decode a frame by its first-byte tag.
///
/// Response frames (tag 3) need the command name from context and must go
/// through [`unpack_response`]; the reserved tags 4 and 5 have no codec.
pub fn unpack(data: &[u8]) -> Result<Message, CodecError> {
    let first = *data.first().ok_or(CodecError::TruncatedFrame {
        needed: 1,
        got: 0,
    })?;
    let tag = first >> 5;
    match MsgType::from_tag(tag) {
        Some(MsgType::Report) => Ok(Message::Report(unpack_report(data)?)),
        Some(MsgType::Variable) => Ok(Message::Variable(unpack_variable(data)?)),
        Some(MsgType::Command) => Ok(Message::Command(unpack_command(data)?)),
        Some(MsgType::Ack) => Ok(Message::Ack(unpack_ack(data)?)),
        Some(MsgType::Fragment) => Ok(Message::Fragment(unpack_fragment(data)?)),
        Some(MsgType::Response) => Err(CodecError::ResponseContextRequired),
        Some(MsgType::Ota) | Some(MsgType::ImageData) | None => {
            Err(CodecError::UnknownMessageType(tag))
        }
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Pack a report: 1 header byte, then each slot in canonical order.
/// Unset slots encode as zero of their declared type.
pub fn pack_report(report: &Report) -> Result<Vec<u8>, CodecError> {
    let d = defs();
    let slots = d
        .ordered_report(report.name())
        .ok_or_else(|| CodecError::UnknownReport(report.name().to_string()))?;

    let header = (MsgType::Report.tag() << 5) | report.report_id();
    let mut out = Vec::with_capacity(1 + d.report_payload_size(report.name()).unwrap_or(0));
    out.push(header);

    for (slot, value) in slots.iter().zip(report.slot_values()) {
        match value {
            Some(v) => slot.var.scalar.encode(slot.var.name, v, ENDIANNESS, &mut out)?,
            None => {
                let zero = slot.var.scalar.zero();
                slot.var.scalar.encode(slot.var.name, &zero, ENDIANNESS, &mut out)?;
            }
        }
    }
    Ok(out)
}

/// Decode a report frame. Every slot of the result is populated.
pub fn unpack_report(data: &[u8]) -> Result<Report, CodecError> {
    let first = *data.first().ok_or(CodecError::TruncatedFrame {
        needed: 1,
        got: 0,
    })?;
    let report_id = first & 0x1F;
    let d = defs();
    let name = d
        .report_name(report_id)
        .ok_or(CodecError::UnknownReportId(report_id))?;
    let slots = d.ordered_report(name).unwrap_or_default();

    let mut report = Report::new(name)?;
    let mut rest = &data[1..];
    for (index, slot) in slots.iter().enumerate() {
        let (value, consumed) = slot.var.scalar.decode(rest, ENDIANNESS)?;
        report.set_slot(index, value);
        rest = &rest[consumed..];
    }
    Ok(report)
}

// ── Variable ──────────────────────────────────────────────────────────────────

/// Pack a variable: 2 header bytes, then its scalar value.
pub fn pack_variable(variable: &Variable) -> Result<Vec<u8>, CodecError> {
    let value = variable
        .value()
        .ok_or_else(|| CodecError::MissingValue(variable.name().to_string()))?;

    let header: u16 = (u16::from(MsgType::Variable.tag()) << 13)
        | (u16::from(variable.subsystem_id()) << 10)
        | variable.variable_id();

    let mut out = Vec::with_capacity(2 + variable.scalar().fixed_size().unwrap_or(0));
    out.extend_from_slice(&header.to_be_bytes());
    variable
        .scalar()
        .encode(variable.name(), value, ENDIANNESS, &mut out)?;
    Ok(out)
}

/// Decode a variable frame.
pub fn unpack_variable(data: &[u8]) -> Result<Variable, CodecError> {
    if data.len() < 2 {
        return Err(CodecError::TruncatedFrame {
            needed: 2,
            got: data.len(),
        });
    }
    let header = u16::from_be_bytes([data[0], data[1]]);
    let subsystem_id = ((header >> 10) & 0x07) as u8;
    let variable_id = header & 0x03FF;

    let def = defs()
        .variable_by_id(subsystem_id, variable_id)
        .ok_or(CodecError::UnknownVariableId {
            subsystem_id,
            variable_id,
        })?;

    let (value, _) = def.scalar.decode(&data[2..], ENDIANNESS)?;
    let mut variable = Variable::new(def.name)?;
    variable.set_value(value);
    Ok(variable)
}

// ── Command ───────────────────────────────────────────────────────────────────

/// Pack a command: 2 header bytes, fixed-width arguments in declaration
/// order, then the optional variable-length tail. Unset arguments fail.
pub fn pack_command(command: &Command) -> Result<Vec<u8>, CodecError> {
    let d = defs();
    let def = d
        .command_def(command.name())
        .ok_or_else(|| CodecError::UnknownCommand(command.name().to_string()))?;

    let header: u16 = (u16::from(MsgType::Command.tag()) << 13) | command.command_id();
    let mut out = Vec::new();
    out.extend_from_slice(&header.to_be_bytes());

    for (&arg, value) in def.args.iter().zip(command.slot_values()) {
        let value = value.as_ref().ok_or_else(|| CodecError::MissingArgument {
            command: command.name().to_string(),
            argument: arg.to_string(),
        })?;
        let scalar = d
            .argument_type(arg)
            .expect("argument types validated at table load");
        match scalar {
            Scalar::TrailingUtf8 => match value {
                Value::Str(s) => out.extend_from_slice(s.as_bytes()),
                other => {
                    return Err(CodecError::WrongValueType {
                        field: arg.to_string(),
                        expected: scalar,
                        got: other.type_name(),
                    })
                }
            },
            Scalar::Blob => match value {
                Value::Bytes(b) => {
                    if b.len() > MAX_PACKET_SIZE {
                        return Err(CodecError::BlobTooLarge {
                            len: b.len(),
                            max: MAX_PACKET_SIZE,
                        });
                    }
                    out.push(b.len() as u8);
                    out.extend_from_slice(b);
                }
                other => {
                    return Err(CodecError::WrongValueType {
                        field: arg.to_string(),
                        expected: scalar,
                        got: other.type_name(),
                    })
                }
            },
            fixed => fixed.encode(arg, value, ENDIANNESS, &mut out)?,
        }
    }
    Ok(out)
}

/// Decode a command frame. The fixed portion must be complete; any
/// remainder feeds the trailing argument when the schema declares one.
pub fn unpack_command(data: &[u8]) -> Result<Command, CodecError> {
    if data.len() < 2 {
        return Err(CodecError::TruncatedFrame {
            needed: 2,
            got: data.len(),
        });
    }
    let header = u16::from_be_bytes([data[0], data[1]]);
    let command_id = header & 0x1FFF;
    let d = defs();
    let name = d
        .command_name(command_id)
        .ok_or(CodecError::UnknownCommandId(command_id))?;
    let def = d.command_def(name).expect("id resolved above");

    let mut command = Command::new(name)?;
    let mut rest = &data[2..];
    for (index, &arg) in def.args.iter().enumerate() {
        let scalar = d
            .argument_type(arg)
            .expect("argument types validated at table load");
        match scalar {
            Scalar::TrailingUtf8 => {
                let text = String::from_utf8(rest.to_vec())?;
                command.set_slot(index, Value::Str(text));
                rest = &[];
            }
            Scalar::Blob => {
                let len = *rest.first().ok_or(CodecError::TruncatedFrame {
                    needed: 1,
                    got: 0,
                })? as usize;
                if rest.len() < 1 + len {
                    return Err(CodecError::TruncatedFrame {
                        needed: 1 + len,
                        got: rest.len(),
                    });
                }
                command.set_slot(index, Value::Bytes(Bytes::copy_from_slice(&rest[1..1 + len])));
                rest = &rest[1 + len..];
            }
            fixed => {
                let (value, consumed) = fixed.decode(rest, ENDIANNESS)?;
                command.set_slot(index, value);
                rest = &rest[consumed..];
            }
        }
    }
    Ok(command)
}

// ── Ack ───────────────────────────────────────────────────────────────────────

/// Pack an ack: `[tag:3][response_status:5]`, then the optional UTF-8
/// payload truncated to fit the frame bound.
pub fn pack_ack(ack: &Ack) -> Result<Vec<u8>, CodecError> {
    if ack.response_status() > 0x1F {
        return Err(CodecError::FieldOverflow {
            field: "response_status",
            value: u64::from(ack.response_status()),
            bits: 5,
        });
    }

    let mut out = vec![(MsgType::Ack.tag() << 5) | ack.response_status()];
    if let Some(payload) = ack.payload() {
        out.extend_from_slice(truncate_utf8(payload, MAX_PACKET_SIZE - 1).as_bytes());
    }
    Ok(out)
}

/// Decode an ack frame; the payload must be valid UTF-8.
pub fn unpack_ack(data: &[u8]) -> Result<Ack, CodecError> {
    let first = *data.first().ok_or(CodecError::TruncatedFrame {
        needed: 1,
        got: 0,
    })?;
    let response_status = first & 0x1F;
    if data.len() > 1 {
        let payload = String::from_utf8(data[1..].to_vec())?;
        Ok(Ack::with_payload(response_status, payload))
    } else {
        Ok(Ack::new(response_status))
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a
/// code point.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── Fragment ──────────────────────────────────────────────────────────────────

/// Pack a fragment: 19 header bits left-aligned into 3 bytes, then the
/// opaque payload.
pub fn pack_fragment(fragment: &Fragment) -> Result<Vec<u8>, CodecError> {
    if fragment.tid() > 0x07 {
        return Err(CodecError::FieldOverflow {
            field: "tid",
            value: u64::from(fragment.tid()),
            bits: FRAGMENT_TID_SIZE,
        });
    }
    if fragment.seq_number() > 0x1FFF {
        return Err(CodecError::FieldOverflow {
            field: "sequence",
            value: u64::from(fragment.seq_number()),
            bits: FRAGMENT_SEQ_SIZE,
        });
    }
    if fragment.payload().len() > MAX_PACKET_SIZE {
        return Err(CodecError::PayloadTooLarge {
            len: fragment.payload().len(),
            max: MAX_PACKET_SIZE,
        });
    }

    let header: u32 = ((u32::from(MsgType::Fragment.tag()) << 16)
        | (u32::from(fragment.tid()) << 13)
        | u32::from(fragment.seq_number()))
        << 5;
    let header_bytes = header.to_be_bytes();

    let mut out = Vec::with_capacity(3 + fragment.payload().len());
    out.extend_from_slice(&header_bytes[1..4]);
    out.extend_from_slice(fragment.payload());
    Ok(out)
}

/// Decode a fragment frame; everything past the 3 header bytes is payload.
pub fn unpack_fragment(data: &[u8]) -> Result<Fragment, CodecError> {
    if data.len() < 3 {
        return Err(CodecError::TruncatedFrame {
            needed: 3,
            got: data.len(),
        });
    }
    let header = u32::from_be_bytes([0, data[0], data[1], data[2]]) >> 5;
    let tid = ((header >> 13) & 0x07) as u8;
    let seq_number = (header & 0x1FFF) as u16;
    Ok(Fragment::new(
        tid,
        seq_number,
        Bytes::copy_from_slice(&data[3..]),
    ))
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Pack a response: header byte (tag 3, low bits zero) + status byte.
/// This path is frozen; see the module notes on `entities::Response`.
pub fn pack_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    Ok(vec![MsgType::Response.tag() << 5, response.status()])
}

/// Decode a response frame. The command name is not on the wire and must
/// come from the caller's context.
pub fn unpack_response(cmd_name: &str, data: &[u8]) -> Result<Response, CodecError> {
    if data.len() < 2 {
        return Err(CodecError::TruncatedFrame {
            needed: 2,
            got: data.len(),
        });
    }
    let tag = data[0] >> 5;
    if tag != MsgType::Response.tag() {
        return Err(CodecError::UnknownMessageType(tag));
    }
    Response::new(cmd_name, data[1])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // Report frames.

    #[test]
    fn tm_test_frame_is_byte_exact() {
        let mut report = Report::new("TM_TEST").unwrap();
        report.set_variable("TIME", 1_700_000_000u32).unwrap();
        report.set_variable("SC_STATE", 2u8).unwrap();
        report.set_variable("GPS_MESSAGE_ID", 1u8).unwrap();

        let frame = pack_report(&report).unwrap();
        // Header: tag 0, report id 4. Payload in canonical order:
        // SC_STATE (CDH,4), TIME (CDH,6), GPS_MESSAGE_ID (GPS,13).
        assert_eq!(
            frame,
            [0x04, 0x02, 0x65, 0x53, 0xF1, 0x00, 0x01]
        );
        assert_eq!(frame.len(), 1 + 6);
    }

    #[test]
    fn report_round_trip() {
        let mut report = Report::new("TM_HAL").unwrap();
        report.set_variable("TIME", 123_456u32).unwrap();
        report.set_variable("REBOOT_COUNT", 9u8).unwrap();

        let frame = pack_report(&report).unwrap();
        let decoded = unpack_report(&frame).unwrap();
        assert_eq!(decoded.name(), "TM_HAL");
        assert_eq!(
            decoded.variable("TIME").unwrap(),
            Some(&Value::U32(123_456))
        );
        assert_eq!(decoded.variable("REBOOT_COUNT").unwrap(), Some(&Value::U8(9)));
        // Unset slots come back as zero, not as gaps.
        assert_eq!(decoded.variable("SC_STATE").unwrap(), Some(&Value::U8(0)));
    }

    #[test]
    fn unknown_report_id_rejected() {
        // Tag 0, report id 31: no such report.
        let err = unpack_report(&[0x1F]).unwrap_err();
        assert!(matches!(err, CodecError::UnknownReportId(31)));
    }

    #[test]
    fn truncated_report_rejected() {
        let mut report = Report::new("TM_TEST").unwrap();
        report.set_variable("TIME", 1u32).unwrap();
        let mut frame = pack_report(&report).unwrap();
        frame.truncate(3);
        assert!(matches!(
            unpack_report(&frame),
            Err(CodecError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn canonical_offset_ignores_declaration_order() {
        // Whatever order values are set in, the wire offsets are fixed.
        let mut a = Report::new("TM_TEST").unwrap();
        a.set_variable("TIME", 7u32).unwrap();
        a.set_variable("SC_STATE", 1u8).unwrap();

        let mut b = Report::new("TM_TEST").unwrap();
        b.set_variable("SC_STATE", 1u8).unwrap();
        b.set_variable("TIME", 7u32).unwrap();

        assert_eq!(pack_report(&a).unwrap(), pack_report(&b).unwrap());
    }

    // Variable frames.

    #[test]
    fn variable_round_trip() {
        let variable = Variable::with_value("GPS_LATITUDE", 404_123_456i32).unwrap();
        let frame = pack_variable(&variable).unwrap();
        // Header: tag 1 in top 3 bits.
        assert_eq!(frame[0] >> 5, 1);
        assert_eq!(frame.len(), 2 + 4);

        let decoded = unpack_variable(&frame).unwrap();
        assert_eq!(decoded.name(), "GPS_LATITUDE");
        assert_eq!(decoded.value(), Some(&Value::I32(404_123_456)));
    }

    #[test]
    fn variable_header_bit_layout() {
        let variable = Variable::with_value("GPS_MESSAGE_ID", 1u8).unwrap();
        let frame = pack_variable(&variable).unwrap();
        let header = u16::from_be_bytes([frame[0], frame[1]]);
        assert_eq!(header >> 13, 1); // tag
        assert_eq!((header >> 10) & 0x07, 3); // GPS
        assert_eq!(header & 0x03FF, 13); // variable id
    }

    #[test]
    fn unset_variable_does_not_pack() {
        let variable = Variable::new("TIME").unwrap();
        assert!(matches!(
            pack_variable(&variable),
            Err(CodecError::MissingValue(_))
        ));
    }

    #[test]
    fn unknown_variable_id_rejected() {
        // Tag 1, subsystem COMMS (5) which has no variables.
        let header: u16 = (1 << 13) | (5 << 10) | 1;
        let frame = header.to_be_bytes();
        assert!(matches!(
            unpack_variable(&frame),
            Err(CodecError::UnknownVariableId { .. })
        ));
    }

    // Command frames.

    #[test]
    fn sum_command_is_byte_exact() {
        let mut cmd = Command::new("SUM").unwrap();
        cmd.set_argument("op1", 300u32).unwrap();
        cmd.set_argument("op2", 300u32).unwrap();

        let frame = pack_command(&cmd).unwrap();
        assert_eq!(frame.len(), 2 + 8);
        let header = u16::from_be_bytes([frame[0], frame[1]]);
        assert_eq!(header >> 13, 2);
        assert_eq!(header & 0x1FFF, cmd.command_id());
        assert_eq!(&frame[2..6], &300u32.to_be_bytes());
        assert_eq!(&frame[6..10], &300u32.to_be_bytes());

        let decoded = unpack_command(&frame).unwrap();
        assert_eq!(decoded.name(), "SUM");
        assert_eq!(decoded.arg_u64("op1"), Some(300));
        assert_eq!(decoded.arg_u64("op2"), Some(300));
    }

    #[test]
    fn create_trans_with_trailing_string() {
        let mut cmd = Command::new("CREATE_TRANS").unwrap();
        cmd.set_argument("tid", 0u8).unwrap();
        cmd.set_argument("string_command", "image_test.jpg").unwrap();

        let frame = pack_command(&cmd).unwrap();
        assert_eq!(frame.len(), 2 + 1 + 14);
        assert_eq!(&frame[3..], b"image_test.jpg");

        let decoded = unpack_command(&frame).unwrap();
        assert_eq!(decoded.arg_u64("tid"), Some(0));
        assert_eq!(decoded.arg_str("string_command"), Some("image_test.jpg"));
    }

    #[test]
    fn trailing_string_preserves_nul_bytes() {
        let text = "a\0b\0c";
        let mut cmd = Command::new("CREATE_TRANS").unwrap();
        cmd.set_argument("tid", 1u8).unwrap();
        cmd.set_argument("string_command", text).unwrap();

        let frame = pack_command(&cmd).unwrap();
        let decoded = unpack_command(&frame).unwrap();
        assert_eq!(decoded.arg_str("string_command"), Some(text));
    }

    #[test]
    fn blob_argument_round_trip() {
        let blob = Bytes::from_static(&[0x00, 0xFF, 0x10, 0x20]);
        let mut cmd = Command::new("UPLINK_FRAGMENT").unwrap();
        cmd.set_argument("tid", 2u8).unwrap();
        cmd.set_argument("seq_number", 7u16).unwrap();
        cmd.set_argument("payload_frag", blob.clone()).unwrap();

        let frame = pack_command(&cmd).unwrap();
        // Header + tid + seq + length byte + contents.
        assert_eq!(frame.len(), 2 + 1 + 2 + 1 + 4);
        assert_eq!(frame[5], 4);

        let decoded = unpack_command(&frame).unwrap();
        assert_eq!(decoded.arg_bytes("payload_frag"), Some(&blob));
    }

    #[test]
    fn missing_argument_fails_pack() {
        let mut cmd = Command::new("SUM").unwrap();
        cmd.set_argument("op1", 1u32).unwrap();
        let err = pack_command(&cmd).unwrap_err();
        assert!(matches!(err, CodecError::MissingArgument { .. }));
    }

    #[test]
    fn init_trans_round_trip() {
        let mut cmd = Command::new("INIT_TRANS").unwrap();
        cmd.set_argument("tid", 3u8).unwrap();
        cmd.set_argument("number_of_packets", 42u16).unwrap();
        cmd.set_argument("hash_MSB", 0x0102_0304_0506_0708u64).unwrap();
        cmd.set_argument("hash_middlesb", 0x090A_0B0C_0D0E_0F10u64)
            .unwrap();
        cmd.set_argument("hash_LSB", 0x1112_1314u32).unwrap();

        let frame = pack_command(&cmd).unwrap();
        assert_eq!(frame.len(), 2 + 23);
        let decoded = unpack_command(&frame).unwrap();
        assert_eq!(decoded.arg_u64("number_of_packets"), Some(42));
        assert_eq!(decoded.arg_u64("hash_MSB"), Some(0x0102_0304_0506_0708));
    }

    #[test]
    fn short_fixed_portion_rejected() {
        let mut cmd = Command::new("SUM").unwrap();
        cmd.set_argument("op1", 1u32).unwrap();
        cmd.set_argument("op2", 2u32).unwrap();
        let mut frame = pack_command(&cmd).unwrap();
        frame.truncate(7);
        assert!(matches!(
            unpack_command(&frame),
            Err(CodecError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn unknown_command_id_rejected() {
        let header: u16 = (2 << 13) | 0x1F00;
        assert!(matches!(
            unpack_command(&header.to_be_bytes()),
            Err(CodecError::UnknownCommandId(0x1F00))
        ));
    }

    // Ack frames.

    #[test]
    fn ack_ok_is_byte_exact() {
        let ack = Ack::with_payload(1, "OK");
        let frame = pack_ack(&ack).unwrap();
        assert_eq!(frame, [0b1100_0001, b'O', b'K']);
    }

    #[test]
    fn ack_status_31_packs_32_fails() {
        assert!(pack_ack(&Ack::new(31)).is_ok());
        let err = pack_ack(&Ack::new(32)).unwrap_err();
        assert!(matches!(err, CodecError::FieldOverflow { bits: 5, .. }));
    }

    #[test]
    fn oversize_ack_payload_truncates() {
        let long = "x".repeat(MAX_PACKET_SIZE * 2);
        let frame = pack_ack(&Ack::with_payload(0, long)).unwrap();
        assert_eq!(frame.len(), MAX_PACKET_SIZE);
        let decoded = unpack_ack(&frame).unwrap();
        assert_eq!(decoded.payload().unwrap().len(), MAX_PACKET_SIZE - 1);
    }

    #[test]
    fn ack_round_trip_without_payload() {
        let frame = pack_ack(&Ack::new(5)).unwrap();
        assert_eq!(frame.len(), 1);
        let decoded = unpack_ack(&frame).unwrap();
        assert_eq!(decoded.response_status(), 5);
        assert!(decoded.payload().is_none());
    }

    #[test]
    fn ack_invalid_utf8_rejected() {
        let frame = [0b1100_0000, 0xFF, 0xFE];
        assert!(matches!(
            unpack_ack(&frame),
            Err(CodecError::InvalidEncoding(_))
        ));
    }

    // Fragment frames.

    #[test]
    fn fragment_header_bit_layout() {
        let fragment = Fragment::new(2, 5, Bytes::from_static(&[0xAA, 0xBB, 0xCC]));
        let frame = pack_fragment(&fragment).unwrap();
        assert_eq!(&frame[..3], &[0xE8, 0x00, 0xA0]);
        assert_eq!(&frame[3..], &[0xAA, 0xBB, 0xCC]);

        let decoded = unpack_fragment(&frame).unwrap();
        assert_eq!(decoded.tid(), 2);
        assert_eq!(decoded.seq_number(), 5);
        assert_eq!(decoded.payload().as_ref(), &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn fragment_max_sequence_round_trips() {
        let fragment = Fragment::new(7, 0x1FFF, Bytes::new());
        let frame = pack_fragment(&fragment).unwrap();
        let decoded = unpack_fragment(&frame).unwrap();
        assert_eq!(decoded.tid(), 7);
        assert_eq!(decoded.seq_number(), 0x1FFF);
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn fragment_field_overflow() {
        let fragment = Fragment::new(8, 0, Bytes::new());
        assert!(matches!(
            pack_fragment(&fragment),
            Err(CodecError::FieldOverflow { field: "tid", .. })
        ));
    }

    #[test]
    fn fragment_oversize_payload_rejected() {
        let fragment = Fragment::new(0, 0, Bytes::from(vec![0u8; MAX_PACKET_SIZE + 1]));
        assert!(matches!(
            pack_fragment(&fragment),
            Err(CodecError::PayloadTooLarge { .. })
        ));
    }

    // Dispatch.

    #[test]
    fn dispatch_routes_every_family() {
        let mut report = Report::new("TM_TEST").unwrap();
        report.set_variable("TIME", 1u32).unwrap();
        report.set_variable("SC_STATE", 3u8).unwrap();
        report.set_variable("GPS_MESSAGE_ID", 4u8).unwrap();
        let variable = Variable::with_value("TIME", 2u32).unwrap();
        let mut command = Command::new("GENERATE_ALL_PACKETS").unwrap();
        command.set_argument("tid", 0u8).unwrap();
        let ack = Ack::with_payload(0, "hi");
        let fragment = Fragment::new(1, 2, Bytes::from_static(b"abc"));

        for message in [
            Message::Report(report),
            Message::Variable(variable),
            Message::Command(command),
            Message::Ack(ack),
            Message::Fragment(fragment),
        ] {
            let frame = pack(&message).unwrap();
            let decoded = unpack(&frame).unwrap();
            assert_eq!(decoded.msg_type(), message.msg_type());
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn reserved_tags_rejected() {
        for tag in [4u8, 5u8] {
            let frame = [tag << 5, 0, 0];
            assert!(matches!(
                unpack(&frame),
                Err(CodecError::UnknownMessageType(t)) if t == tag
            ));
        }
    }

    #[test]
    fn response_tag_needs_context() {
        let frame = [3u8 << 5, 1];
        assert!(matches!(
            unpack(&frame),
            Err(CodecError::ResponseContextRequired)
        ));
    }

    #[test]
    fn empty_frame_rejected() {
        assert!(matches!(
            unpack(&[]),
            Err(CodecError::TruncatedFrame { needed: 1, got: 0 })
        ));
    }

    // Response path.

    #[test]
    fn response_round_trip_with_context() {
        let response = Response::new("SUM", 1).unwrap();
        let frame = pack_response(&response).unwrap();
        assert_eq!(frame, [0b0110_0000, 1]);
        let decoded = unpack_response("SUM", &frame).unwrap();
        assert_eq!(decoded, response);
    }
}
