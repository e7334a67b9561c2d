//! Static definition tables and the derived identifier maps.
//!
//! The tables below ARE the protocol schema. Two peers that share identical
//! tables derive identical identifiers, because every id comes from an
//! alphabetical sort of the table entries, never from declaration order.
//! Changing a name, adding a variable, or reordering a report changes the
//! wire format for every peer.
//!
//! The derived maps are built once behind [`defs`] and validated on the way
//! in; a malformed table set never reaches the packet path.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::SchemaError;
use crate::scalar::{Endian, Scalar};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Byte order of every multi-byte scalar on the wire.
pub const ENDIANNESS: Endian = Endian::Big;

/// Fragment payload size and the upper bound on any frame's payload.
pub const MAX_PACKET_SIZE: usize = 230;

/// Header field widths, in bits.
pub const MSG_TYPE_SIZE: u32 = 3;
pub const REPORT_ID_SIZE: u32 = 5;
pub const VARIABLE_SS_SIZE: u32 = 3;
pub const VARIABLE_ID_SIZE: u32 = 10;
pub const COMMAND_ID_SIZE: u32 = 13;
pub const FRAGMENT_TID_SIZE: u32 = 3;
pub const FRAGMENT_SEQ_SIZE: u32 = 13;

// ── Message-type tags ─────────────────────────────────────────────────────────

/// The 3-bit tag in the top bits of every frame's first byte.
///
/// `Ota` and `ImageData` are reserved: the tag values are allocated but no
/// codec is defined for them and the unpacker rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Report = 0,
    Variable = 1,
    Command = 2,
    Response = 3,
    Ota = 4,
    ImageData = 5,
    Ack = 6,
    Fragment = 7,
}

impl MsgType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MsgType::Report),
            1 => Some(MsgType::Variable),
            2 => Some(MsgType::Command),
            3 => Some(MsgType::Response),
            4 => Some(MsgType::Ota),
            5 => Some(MsgType::ImageData),
            6 => Some(MsgType::Ack),
            7 => Some(MsgType::Fragment),
            _ => None,
        }
    }
}

// ── Table row types ───────────────────────────────────────────────────────────

/// A telemetry point: name, owning subsystem, wire type, optional SI divisor.
/// The scale is carried for presentation layers; values cross the wire
/// unscaled.
#[derive(Debug)]
pub struct VarDef {
    pub name: &'static str,
    pub subsystem: &'static str,
    pub scalar: Scalar,
    pub scale: Option<u32>,
}

/// A named bundle of variables serialized together.
/// Declaration order is irrelevant; the wire order is canonical.
#[derive(Debug)]
pub struct ReportDef {
    pub name: &'static str,
    pub variables: &'static [(&'static str, &'static str)],
}

/// A ground→satellite request with typed arguments.
#[derive(Debug)]
pub struct CommandDef {
    pub name: &'static str,
    pub precondition: Option<&'static str>,
    pub args: &'static [&'static str],
    pub handler: &'static str,
}

// ── Subsystems ────────────────────────────────────────────────────────────────

pub const SUBSYSTEMS: &[(&str, u8)] = &[
    ("CDH", 0),
    ("EPS", 1),
    ("ADCS", 2),
    ("GPS", 3),
    ("STORAGE", 4),
    ("COMMS", 5),
    ("PAYLOAD_TM", 6),
];

// ── Variables ─────────────────────────────────────────────────────────────────

macro_rules! var {
    ($name:literal, $ss:literal, $scalar:ident) => {
        VarDef {
            name: $name,
            subsystem: $ss,
            scalar: Scalar::$scalar,
            scale: None,
        }
    };
    ($name:literal, $ss:literal, $scalar:ident, $scale:literal) => {
        VarDef {
            name: $name,
            subsystem: $ss,
            scalar: Scalar::$scalar,
            scale: Some($scale),
        }
    };
}

pub const VARIABLES: &[VarDef] = &[
    // CDH / system health
    var!("TIME", "CDH", U32),
    var!("SC_STATE", "CDH", U8),
    var!("SD_USAGE", "CDH", U32),
    var!("CURRENT_RAM_USAGE", "CDH", U8),
    var!("REBOOT_COUNT", "CDH", U8),
    var!("WATCHDOG_TIMER", "CDH", U8),
    var!("HAL_BITFLAGS", "CDH", U8),
    var!("DETUMBLING_ERROR_FLAG", "CDH", U8),
    // EPS mainboard and battery pack
    var!("EPS_POWER_FLAG", "EPS", U8),
    var!("MAINBOARD_TEMPERATURE", "EPS", I16, 10),
    var!("MAINBOARD_VOLTAGE", "EPS", I16, 1000),
    var!("MAINBOARD_CURRENT", "EPS", I16, 1000),
    var!("BATTERY_PACK_TEMPERATURE", "EPS", I16, 10),
    var!("BATTERY_PACK_REPORTED_SOC", "EPS", U8, 1),
    var!("BATTERY_PACK_REPORTED_CAPACITY", "EPS", U16, 1),
    var!("BATTERY_PACK_CURRENT", "EPS", I16, 1000),
    var!("BATTERY_PACK_VOLTAGE", "EPS", I16, 1000),
    var!("BATTERY_PACK_MIDPOINT_VOLTAGE", "EPS", I16, 1000),
    var!("BATTERY_PACK_TTE", "EPS", U32, 1),
    var!("BATTERY_PACK_TTF", "EPS", U32, 1),
    // Magnetorquer coils
    var!("XP_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("XP_COIL_CURRENT", "EPS", I16, 1000),
    var!("XM_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("XM_COIL_CURRENT", "EPS", I16, 1000),
    var!("YP_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("YP_COIL_CURRENT", "EPS", I16, 1000),
    var!("YM_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("YM_COIL_CURRENT", "EPS", I16, 1000),
    var!("ZP_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("ZP_COIL_CURRENT", "EPS", I16, 1000),
    var!("ZM_COIL_VOLTAGE", "EPS", I16, 1000),
    var!("ZM_COIL_CURRENT", "EPS", I16, 1000),
    // Payload and RF rails
    var!("JETSON_INPUT_VOLTAGE", "EPS", I16, 1000),
    var!("JETSON_INPUT_CURRENT", "EPS", I16, 1000),
    var!("RF_LDO_OUTPUT_VOLTAGE", "EPS", I16, 1000),
    var!("RF_LDO_OUTPUT_CURRENT", "EPS", I16, 1000),
    var!("GPS_VOLTAGE", "EPS", I16, 1000),
    var!("GPS_CURRENT", "EPS", I16, 1000),
    // Solar arrays
    var!("XP_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("XP_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    var!("XM_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("XM_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    var!("YP_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("YP_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    var!("YM_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("YM_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    var!("ZP_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("ZP_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    var!("ZM_SOLAR_CHARGE_VOLTAGE", "EPS", I16, 1000),
    var!("ZM_SOLAR_CHARGE_CURRENT", "EPS", I16, 1000),
    // ADCS sensors
    var!("MODE", "ADCS", U8),
    var!("GYRO_X", "ADCS", F32, 10_000_000),
    var!("GYRO_Y", "ADCS", F32, 10_000_000),
    var!("GYRO_Z", "ADCS", F32, 10_000_000),
    var!("MAG_X", "ADCS", F32, 10_000_000),
    var!("MAG_Y", "ADCS", F32, 10_000_000),
    var!("MAG_Z", "ADCS", F32, 10_000_000),
    var!("SUN_STATUS", "ADCS", U8),
    var!("SUN_VEC_X", "ADCS", F32, 10_000_000),
    var!("SUN_VEC_Y", "ADCS", F32, 10_000_000),
    var!("SUN_VEC_Z", "ADCS", F32, 10_000_000),
    var!("LIGHT_SENSOR_XP", "ADCS", U16),
    var!("LIGHT_SENSOR_XM", "ADCS", U16),
    var!("LIGHT_SENSOR_YP", "ADCS", U16),
    var!("LIGHT_SENSOR_YM", "ADCS", U16),
    var!("LIGHT_SENSOR_ZP1", "ADCS", U16),
    var!("LIGHT_SENSOR_ZP2", "ADCS", U16),
    var!("LIGHT_SENSOR_ZP3", "ADCS", U16),
    var!("LIGHT_SENSOR_ZP4", "ADCS", U16),
    var!("LIGHT_SENSOR_ZM", "ADCS", U16),
    var!("XP_COIL_STATUS", "ADCS", U8),
    var!("XM_COIL_STATUS", "ADCS", U8),
    var!("YP_COIL_STATUS", "ADCS", U8),
    var!("YM_COIL_STATUS", "ADCS", U8),
    var!("ZP_COIL_STATUS", "ADCS", U8),
    var!("ZM_COIL_STATUS", "ADCS", U8),
    // GPS navigation
    var!("GPS_MESSAGE_ID", "GPS", U8),
    var!("GPS_FIX_MODE", "GPS", U8),
    var!("GPS_NUMBER_OF_SV", "GPS", U8),
    var!("GPS_GNSS_WEEK", "GPS", U16),
    var!("GPS_GNSS_TOW", "GPS", U32),
    var!("GPS_LATITUDE", "GPS", I32, 10_000_000),
    var!("GPS_LONGITUDE", "GPS", I32, 10_000_000),
    var!("GPS_ELLIPSOID_ALT", "GPS", I32, 100),
    var!("GPS_MEAN_SEA_LVL_ALT", "GPS", I32, 100),
    var!("GPS_ECEF_X", "GPS", I32, 100),
    var!("GPS_ECEF_Y", "GPS", I32, 100),
    var!("GPS_ECEF_Z", "GPS", I32, 100),
    var!("GPS_ECEF_VX", "GPS", I32, 100),
    var!("GPS_ECEF_VY", "GPS", I32, 100),
    var!("GPS_ECEF_VZ", "GPS", I32, 100),
    // Storage accounting
    var!("STORAGE_TOTAL", "STORAGE", U32),
    var!("CDH_NUM_FILES", "STORAGE", U32),
    var!("CDH_DIR_SIZE", "STORAGE", U32),
    var!("EPS_NUM_FILES", "STORAGE", U32),
    var!("EPS_DIR_SIZE", "STORAGE", U32),
    var!("ADCS_NUM_FILES", "STORAGE", U32),
    var!("ADCS_DIR_SIZE", "STORAGE", U32),
    var!("COMMS_NUM_FILES", "STORAGE", U32),
    var!("COMMS_DIR_SIZE", "STORAGE", U32),
    var!("GPS_NUM_FILES", "STORAGE", U32),
    var!("GPS_DIR_SIZE", "STORAGE", U32),
    var!("PAYLOAD_NUM_FILES", "STORAGE", U32),
    var!("PAYLOAD_DIR_SIZE", "STORAGE", U32),
    var!("COMMAND_NUM_FILES", "STORAGE", U32),
    var!("COMMAND_DIR_SIZE", "STORAGE", U32),
    // Payload telemetry
    var!("PAYLOAD_STATE", "PAYLOAD_TM", U8),
    var!("PAYLOAD_TEMPERATURE", "PAYLOAD_TM", I16, 10),
    var!("IMAGES_STORED", "PAYLOAD_TM", U16),
    var!("LAST_IMAGE_ID", "PAYLOAD_TM", U32),
];

// ── Reports ───────────────────────────────────────────────────────────────────

const CDH_HEALTH_BLOCK: &[(&str, &str)] = &[
    ("TIME", "CDH"),
    ("SC_STATE", "CDH"),
    ("SD_USAGE", "CDH"),
    ("CURRENT_RAM_USAGE", "CDH"),
    ("REBOOT_COUNT", "CDH"),
    ("WATCHDOG_TIMER", "CDH"),
    ("HAL_BITFLAGS", "CDH"),
    ("DETUMBLING_ERROR_FLAG", "CDH"),
];

const TM_HEARTBEAT_VARS: &[(&str, &str)] = &[
    // CDH
    ("TIME", "CDH"),
    ("SC_STATE", "CDH"),
    ("SD_USAGE", "CDH"),
    ("CURRENT_RAM_USAGE", "CDH"),
    ("REBOOT_COUNT", "CDH"),
    ("WATCHDOG_TIMER", "CDH"),
    ("HAL_BITFLAGS", "CDH"),
    ("DETUMBLING_ERROR_FLAG", "CDH"),
    // EPS
    ("EPS_POWER_FLAG", "EPS"),
    ("MAINBOARD_TEMPERATURE", "EPS"),
    ("MAINBOARD_VOLTAGE", "EPS"),
    ("MAINBOARD_CURRENT", "EPS"),
    ("BATTERY_PACK_TEMPERATURE", "EPS"),
    ("BATTERY_PACK_REPORTED_SOC", "EPS"),
    ("BATTERY_PACK_REPORTED_CAPACITY", "EPS"),
    ("BATTERY_PACK_CURRENT", "EPS"),
    ("BATTERY_PACK_VOLTAGE", "EPS"),
    ("BATTERY_PACK_MIDPOINT_VOLTAGE", "EPS"),
    ("BATTERY_PACK_TTE", "EPS"),
    ("BATTERY_PACK_TTF", "EPS"),
    ("XP_COIL_VOLTAGE", "EPS"),
    ("XP_COIL_CURRENT", "EPS"),
    ("XM_COIL_VOLTAGE", "EPS"),
    ("XM_COIL_CURRENT", "EPS"),
    ("YP_COIL_VOLTAGE", "EPS"),
    ("YP_COIL_CURRENT", "EPS"),
    ("YM_COIL_VOLTAGE", "EPS"),
    ("YM_COIL_CURRENT", "EPS"),
    ("ZP_COIL_VOLTAGE", "EPS"),
    ("ZP_COIL_CURRENT", "EPS"),
    ("ZM_COIL_VOLTAGE", "EPS"),
    ("ZM_COIL_CURRENT", "EPS"),
    ("JETSON_INPUT_VOLTAGE", "EPS"),
    ("JETSON_INPUT_CURRENT", "EPS"),
    ("RF_LDO_OUTPUT_VOLTAGE", "EPS"),
    ("RF_LDO_OUTPUT_CURRENT", "EPS"),
    ("GPS_VOLTAGE", "EPS"),
    ("GPS_CURRENT", "EPS"),
    ("XP_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("XP_SOLAR_CHARGE_CURRENT", "EPS"),
    ("XM_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("XM_SOLAR_CHARGE_CURRENT", "EPS"),
    ("YP_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("YP_SOLAR_CHARGE_CURRENT", "EPS"),
    ("YM_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("YM_SOLAR_CHARGE_CURRENT", "EPS"),
    ("ZP_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("ZP_SOLAR_CHARGE_CURRENT", "EPS"),
    ("ZM_SOLAR_CHARGE_VOLTAGE", "EPS"),
    ("ZM_SOLAR_CHARGE_CURRENT", "EPS"),
    // ADCS
    ("MODE", "ADCS"),
    ("GYRO_X", "ADCS"),
    ("GYRO_Y", "ADCS"),
    ("GYRO_Z", "ADCS"),
    ("MAG_X", "ADCS"),
    ("MAG_Y", "ADCS"),
    ("MAG_Z", "ADCS"),
    ("SUN_STATUS", "ADCS"),
    ("SUN_VEC_X", "ADCS"),
    ("SUN_VEC_Y", "ADCS"),
    ("SUN_VEC_Z", "ADCS"),
    ("LIGHT_SENSOR_XP", "ADCS"),
    ("LIGHT_SENSOR_XM", "ADCS"),
    ("LIGHT_SENSOR_YP", "ADCS"),
    ("LIGHT_SENSOR_YM", "ADCS"),
    ("LIGHT_SENSOR_ZP1", "ADCS"),
    ("LIGHT_SENSOR_ZP2", "ADCS"),
    ("LIGHT_SENSOR_ZP3", "ADCS"),
    ("LIGHT_SENSOR_ZP4", "ADCS"),
    ("LIGHT_SENSOR_ZM", "ADCS"),
    ("XP_COIL_STATUS", "ADCS"),
    ("XM_COIL_STATUS", "ADCS"),
    ("YP_COIL_STATUS", "ADCS"),
    ("YM_COIL_STATUS", "ADCS"),
    ("ZP_COIL_STATUS", "ADCS"),
    ("ZM_COIL_STATUS", "ADCS"),
    // GPS
    ("GPS_MESSAGE_ID", "GPS"),
    ("GPS_FIX_MODE", "GPS"),
    ("GPS_NUMBER_OF_SV", "GPS"),
    ("GPS_GNSS_WEEK", "GPS"),
    ("GPS_GNSS_TOW", "GPS"),
    ("GPS_LATITUDE", "GPS"),
    ("GPS_LONGITUDE", "GPS"),
    ("GPS_ELLIPSOID_ALT", "GPS"),
    ("GPS_MEAN_SEA_LVL_ALT", "GPS"),
    ("GPS_ECEF_X", "GPS"),
    ("GPS_ECEF_Y", "GPS"),
    ("GPS_ECEF_Z", "GPS"),
    ("GPS_ECEF_VX", "GPS"),
    ("GPS_ECEF_VY", "GPS"),
    ("GPS_ECEF_VZ", "GPS"),
];

const TM_STORAGE_VARS: &[(&str, &str)] = &[
    ("TIME", "CDH"),
    ("SC_STATE", "CDH"),
    ("SD_USAGE", "CDH"),
    ("CURRENT_RAM_USAGE", "CDH"),
    ("REBOOT_COUNT", "CDH"),
    ("WATCHDOG_TIMER", "CDH"),
    ("HAL_BITFLAGS", "CDH"),
    ("DETUMBLING_ERROR_FLAG", "CDH"),
    ("STORAGE_TOTAL", "STORAGE"),
    ("CDH_NUM_FILES", "STORAGE"),
    ("CDH_DIR_SIZE", "STORAGE"),
    ("EPS_NUM_FILES", "STORAGE"),
    ("EPS_DIR_SIZE", "STORAGE"),
    ("ADCS_NUM_FILES", "STORAGE"),
    ("ADCS_DIR_SIZE", "STORAGE"),
    ("COMMS_NUM_FILES", "STORAGE"),
    ("COMMS_DIR_SIZE", "STORAGE"),
    ("GPS_NUM_FILES", "STORAGE"),
    ("GPS_DIR_SIZE", "STORAGE"),
    ("PAYLOAD_NUM_FILES", "STORAGE"),
    ("PAYLOAD_DIR_SIZE", "STORAGE"),
    ("COMMAND_NUM_FILES", "STORAGE"),
    ("COMMAND_DIR_SIZE", "STORAGE"),
];

const TM_PAYLOAD_VARS: &[(&str, &str)] = &[
    ("TIME", "CDH"),
    ("SC_STATE", "CDH"),
    ("SD_USAGE", "CDH"),
    ("CURRENT_RAM_USAGE", "CDH"),
    ("REBOOT_COUNT", "CDH"),
    ("WATCHDOG_TIMER", "CDH"),
    ("HAL_BITFLAGS", "CDH"),
    ("DETUMBLING_ERROR_FLAG", "CDH"),
    ("PAYLOAD_STATE", "PAYLOAD_TM"),
    ("PAYLOAD_TEMPERATURE", "PAYLOAD_TM"),
    ("IMAGES_STORED", "PAYLOAD_TM"),
    ("LAST_IMAGE_ID", "PAYLOAD_TM"),
];

const TM_TEST_VARS: &[(&str, &str)] = &[
    ("TIME", "CDH"),
    ("SC_STATE", "CDH"),
    ("GPS_MESSAGE_ID", "GPS"),
];

pub const REPORTS: &[ReportDef] = &[
    ReportDef {
        name: "TM_HEARTBEAT",
        variables: TM_HEARTBEAT_VARS,
    },
    ReportDef {
        name: "TM_STORAGE",
        variables: TM_STORAGE_VARS,
    },
    ReportDef {
        name: "TM_HAL",
        variables: CDH_HEALTH_BLOCK,
    },
    ReportDef {
        name: "TM_PAYLOAD",
        variables: TM_PAYLOAD_VARS,
    },
    ReportDef {
        name: "TM_TEST",
        variables: TM_TEST_VARS,
    },
];

// ── Command arguments ─────────────────────────────────────────────────────────

pub const ARGUMENTS: &[(&str, Scalar)] = &[
    ("target_state_id", Scalar::U8),
    ("time_in_state", Scalar::U32),
    ("time_reference", Scalar::U32),
    ("file_id", Scalar::U32),
    ("file_time", Scalar::U32),
    ("op1", Scalar::U32),
    ("op2", Scalar::U32),
    // Transaction control
    ("tid", Scalar::U8),
    ("seq_number", Scalar::U16),
    ("number_of_packets", Scalar::U16),
    ("x", Scalar::U16),
    ("seq_offset", Scalar::U16),
    ("bitmap_msb", Scalar::U16),
    ("bitmap_lsb", Scalar::U16),
    ("hash_MSB", Scalar::U64),
    ("hash_middlesb", Scalar::U64),
    ("hash_LSB", Scalar::U32),
    // Variable-length tails
    ("string_command", Scalar::TrailingUtf8),
    ("payload_frag", Scalar::Blob),
];

// ── Commands ──────────────────────────────────────────────────────────────────

macro_rules! cmd {
    ($name:literal, $pre:expr, $args:expr) => {
        CommandDef {
            name: $name,
            precondition: $pre,
            args: $args,
            handler: $name,
        }
    };
}

pub const COMMANDS: &[CommandDef] = &[
    cmd!("FORCE_REBOOT", None, &[]),
    cmd!("SUM", Some("valid_inputs"), &["op1", "op2"]),
    cmd!(
        "SWITCH_TO_STATE",
        Some("valid_state"),
        &["target_state_id", "time_in_state"]
    ),
    cmd!(
        "UPLINK_TIME_REFERENCE",
        Some("valid_time_format"),
        &["time_reference"]
    ),
    cmd!("TURN_OFF_PAYLOAD", None, &[]),
    cmd!("SCHEDULE_OD_EXPERIMENT", None, &[]),
    cmd!("REQUEST_TM_NOMINAL", None, &[]),
    cmd!("REQUEST_TM_HAL", None, &[]),
    cmd!("REQUEST_TM_STORAGE", None, &[]),
    cmd!("REQUEST_TM_PAYLOAD", None, &[]),
    cmd!(
        "REQUEST_FILE_METADATA",
        Some("file_id_exists"),
        &["file_id", "file_time"]
    ),
    cmd!(
        "REQUEST_FILE_PKT",
        Some("file_id_exists"),
        &["file_id", "file_time"]
    ),
    cmd!("REQUEST_IMAGE", None, &[]),
    cmd!("DOWNLINK_ALL", Some("file_id_exists"), &["file_id", "file_time"]),
    // File-transfer transaction control
    cmd!("CREATE_TRANS", None, &["tid", "string_command"]),
    cmd!(
        "INIT_TRANS",
        None,
        &[
            "tid",
            "number_of_packets",
            "hash_MSB",
            "hash_middlesb",
            "hash_LSB"
        ]
    ),
    cmd!("GENERATE_ALL_PACKETS", None, &["tid"]),
    cmd!("GENERATE_X_PACKETS", None, &["tid", "x"]),
    cmd!("GET_SINGLE_PACKET", None, &["tid", "seq_number"]),
    cmd!(
        "SYNC_MISSING",
        None,
        &["tid", "seq_offset", "bitmap_msb", "bitmap_lsb"]
    ),
    cmd!("CONFIRM_BATCH", None, &["tid", "bitmap_msb", "bitmap_lsb"]),
    cmd!("UPLINK_FRAGMENT", None, &["tid", "seq_number", "payload_frag"]),
];

// ── Derived maps ──────────────────────────────────────────────────────────────

/// One entry of a report's canonical wire order.
#[derive(Debug, Clone, Copy)]
pub struct ReportSlot {
    pub subsystem_id: u8,
    pub variable_id: u16,
    pub var: &'static VarDef,
}

/// The identifier maps derived from the static tables.
///
/// Built once at startup; all lookups afterwards are read-only.
#[derive(Debug)]
pub struct Definitions {
    subsystem_ids: HashMap<&'static str, u8>,
    subsystem_names: HashMap<u8, &'static str>,
    report_names: Vec<&'static str>,
    report_ids: HashMap<&'static str, u8>,
    report_defs: HashMap<&'static str, &'static ReportDef>,
    command_names: Vec<&'static str>,
    command_ids: HashMap<&'static str, u16>,
    command_defs: HashMap<&'static str, &'static CommandDef>,
    var_by_name: HashMap<&'static str, (u8, u16, &'static VarDef)>,
    var_by_id: HashMap<(u8, u16), &'static VarDef>,
    ordered_reports: HashMap<&'static str, Vec<ReportSlot>>,
    report_slot_index: HashMap<&'static str, HashMap<&'static str, usize>>,
    argument_types: HashMap<&'static str, Scalar>,
}

impl Definitions {
    /// Build and validate the derived maps from a table set.
    pub fn from_tables(
        subsystems: &'static [(&'static str, u8)],
        variables: &'static [VarDef],
        reports: &'static [ReportDef],
        arguments: &'static [(&'static str, Scalar)],
        commands: &'static [CommandDef],
    ) -> Result<Self, SchemaError> {
        let max_ss_id = (1u16 << VARIABLE_SS_SIZE) - 1;
        let mut subsystem_ids = HashMap::new();
        let mut subsystem_names = HashMap::new();
        for &(name, id) in subsystems {
            if u16::from(id) > max_ss_id {
                return Err(SchemaError::SubsystemIdTooWide {
                    subsystem: name.to_string(),
                    id,
                    bits: VARIABLE_SS_SIZE,
                });
            }
            subsystem_ids.insert(name, id);
            subsystem_names.insert(id, name);
        }

        // Variable ids: alphabetical within each subsystem.
        let mut var_by_name = HashMap::new();
        let mut var_by_id = HashMap::new();
        for (&ss_name, &ss_id) in &subsystem_ids {
            let mut names: Vec<&'static VarDef> = variables
                .iter()
                .filter(|v| v.subsystem == ss_name)
                .collect();
            names.sort_by_key(|v| v.name);
            let max_vars = 1usize << VARIABLE_ID_SIZE;
            if names.len() > max_vars {
                return Err(SchemaError::TooManyVariables {
                    subsystem: ss_name.to_string(),
                    count: names.len(),
                    max: max_vars,
                });
            }
            for (idx, var) in names.into_iter().enumerate() {
                let var_id = idx as u16;
                var_by_name.insert(var.name, (ss_id, var_id, var));
                var_by_id.insert((ss_id, var_id), var);
            }
        }
        for var in variables {
            if !subsystem_ids.contains_key(var.subsystem) {
                return Err(SchemaError::UnknownSubsystem {
                    variable: var.name.to_string(),
                    subsystem: var.subsystem.to_string(),
                });
            }
        }

        // Report ids: alphabetical over report names.
        let max_reports = 1usize << REPORT_ID_SIZE;
        if reports.len() > max_reports {
            return Err(SchemaError::TooManyReports {
                count: reports.len(),
                max: max_reports,
            });
        }
        let mut report_names: Vec<&'static str> = reports.iter().map(|r| r.name).collect();
        report_names.sort_unstable();
        let report_ids: HashMap<&'static str, u8> = report_names
            .iter()
            .enumerate()
            .map(|(id, &name)| (name, id as u8))
            .collect();
        let report_defs: HashMap<&'static str, &'static ReportDef> =
            reports.iter().map(|r| (r.name, r)).collect();

        // Canonical report order: ascending (subsystem_id, variable_id),
        // independent of declaration order.
        let mut ordered_reports = HashMap::new();
        let mut report_slot_index = HashMap::new();
        for report in reports {
            let mut slots = Vec::with_capacity(report.variables.len());
            for &(var_name, declared_ss) in report.variables {
                let &(ss_id, var_id, var) = var_by_name.get(var_name).ok_or_else(|| {
                    SchemaError::UnknownReportVariable {
                        report: report.name.to_string(),
                        variable: var_name.to_string(),
                    }
                })?;
                if var.subsystem != declared_ss {
                    return Err(SchemaError::ReportSubsystemMismatch {
                        report: report.name.to_string(),
                        variable: var_name.to_string(),
                        declared: declared_ss.to_string(),
                        actual: var.subsystem.to_string(),
                    });
                }
                slots.push(ReportSlot {
                    subsystem_id: ss_id,
                    variable_id: var_id,
                    var,
                });
            }
            slots.sort_by_key(|s| (s.subsystem_id, s.variable_id));

            let payload: usize = slots
                .iter()
                .map(|s| s.var.scalar.fixed_size().unwrap_or(0))
                .sum();
            let wire_size = payload + ((MSG_TYPE_SIZE + REPORT_ID_SIZE) / 8) as usize;
            if wire_size > MAX_PACKET_SIZE {
                return Err(SchemaError::ReportTooLarge {
                    report: report.name.to_string(),
                    size: wire_size,
                    max: MAX_PACKET_SIZE,
                });
            }

            let index: HashMap<&'static str, usize> = slots
                .iter()
                .enumerate()
                .map(|(i, s)| (s.var.name, i))
                .collect();
            report_slot_index.insert(report.name, index);
            ordered_reports.insert(report.name, slots);
        }

        let argument_types: HashMap<&'static str, Scalar> =
            arguments.iter().copied().collect();

        // Command ids: alphabetical over command names.
        let max_commands = 1usize << COMMAND_ID_SIZE;
        if commands.len() > max_commands {
            return Err(SchemaError::TooManyCommands {
                count: commands.len(),
                max: max_commands,
            });
        }
        let mut command_names: Vec<&'static str> = commands.iter().map(|c| c.name).collect();
        command_names.sort_unstable();
        let command_ids: HashMap<&'static str, u16> = command_names
            .iter()
            .enumerate()
            .map(|(id, &name)| (name, id as u16))
            .collect();
        let command_defs: HashMap<&'static str, &'static CommandDef> =
            commands.iter().map(|c| (c.name, c)).collect();

        // Argument references and the trailing-argument rule.
        let header_bytes = ((MSG_TYPE_SIZE + COMMAND_ID_SIZE) / 8) as usize;
        for command in commands {
            let mut fixed_size = header_bytes;
            for (pos, &arg) in command.args.iter().enumerate() {
                let scalar = *argument_types.get(arg).ok_or_else(|| {
                    SchemaError::UnknownCommandArgument {
                        command: command.name.to_string(),
                        argument: arg.to_string(),
                    }
                })?;
                match scalar.fixed_size() {
                    Some(size) => fixed_size += size,
                    None => {
                        if pos != command.args.len() - 1 {
                            return Err(SchemaError::VariableArgumentNotLast {
                                command: command.name.to_string(),
                                argument: arg.to_string(),
                            });
                        }
                    }
                }
            }
            if fixed_size > MAX_PACKET_SIZE {
                return Err(SchemaError::CommandTooLarge {
                    command: command.name.to_string(),
                    size: fixed_size,
                    max: MAX_PACKET_SIZE,
                });
            }
        }

        Ok(Self {
            subsystem_ids,
            subsystem_names,
            report_names,
            report_ids,
            report_defs,
            command_names,
            command_ids,
            command_defs,
            var_by_name,
            var_by_id,
            ordered_reports,
            report_slot_index,
            argument_types,
        })
    }

    // Lookups.

    pub fn subsystem_id(&self, name: &str) -> Option<u8> {
        self.subsystem_ids.get(name).copied()
    }

    pub fn subsystem_name(&self, id: u8) -> Option<&'static str> {
        self.subsystem_names.get(&id).copied()
    }

    pub fn report_id(&self, name: &str) -> Option<u8> {
        self.report_ids.get(name).copied()
    }

    pub fn report_name(&self, id: u8) -> Option<&'static str> {
        self.report_names.get(id as usize).copied()
    }

    pub fn report_def(&self, name: &str) -> Option<&'static ReportDef> {
        self.report_defs.get(name).copied()
    }

    pub fn report_names(&self) -> &[&'static str] {
        &self.report_names
    }

    pub fn command_id(&self, name: &str) -> Option<u16> {
        self.command_ids.get(name).copied()
    }

    pub fn command_name(&self, id: u16) -> Option<&'static str> {
        self.command_names.get(id as usize).copied()
    }

    pub fn command_def(&self, name: &str) -> Option<&'static CommandDef> {
        self.command_defs.get(name).copied()
    }

    pub fn command_names(&self) -> &[&'static str] {
        &self.command_names
    }

    /// `(subsystem_id, variable_id, definition)` for a variable name.
    pub fn variable(&self, name: &str) -> Option<(u8, u16, &'static VarDef)> {
        self.var_by_name.get(name).copied()
    }

    pub fn variable_by_id(&self, subsystem_id: u8, variable_id: u16) -> Option<&'static VarDef> {
        self.var_by_id.get(&(subsystem_id, variable_id)).copied()
    }

    /// Canonical wire order of a report's slots.
    pub fn ordered_report(&self, name: &str) -> Option<&[ReportSlot]> {
        self.ordered_reports.get(name).map(Vec::as_slice)
    }

    /// Canonical slot index of a variable within a report.
    pub fn report_slot(&self, report: &str, variable: &str) -> Option<usize> {
        self.report_slot_index.get(report)?.get(variable).copied()
    }

    pub fn argument_type(&self, name: &str) -> Option<Scalar> {
        self.argument_types.get(name).copied()
    }

    /// Payload size of a report frame, header excluded.
    pub fn report_payload_size(&self, name: &str) -> Option<usize> {
        let slots = self.ordered_reports.get(name)?;
        Some(
            slots
                .iter()
                .map(|s| s.var.scalar.fixed_size().unwrap_or(0))
                .sum(),
        )
    }

    /// Size of a command's fixed-width argument block, header excluded.
    pub fn command_fixed_size(&self, name: &str) -> Option<usize> {
        let def = self.command_def(name)?;
        let mut size = 0;
        for &arg in def.args {
            if let Some(s) = self.argument_type(arg).and_then(Scalar::fixed_size) {
                size += s;
            }
        }
        Some(size)
    }
}

static DEFS: LazyLock<Definitions> = LazyLock::new(|| {
    Definitions::from_tables(SUBSYSTEMS, VARIABLES, REPORTS, ARGUMENTS, COMMANDS)
        .expect("built-in definition tables are valid")
});

/// The process-wide definition set derived from the built-in tables.
pub fn defs() -> &'static Definitions {
    &DEFS
}
