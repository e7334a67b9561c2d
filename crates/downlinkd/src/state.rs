//! Simulated spacecraft state backing the telemetry reports.

use std::time::{SystemTime, UNIX_EPOCH};

use downlink_core::{Report, Value};

/// A small state vector with enough dynamics to make reports interesting.
pub struct SatState {
    reboot_count: u8,
    sc_state: u8,
    battery_soc: u8,
    battery_voltage_mv: i16,
    gyro: [f32; 3],
    images_stored: u16,
    samples: u32,
}

impl SatState {
    pub fn new() -> Self {
        Self {
            reboot_count: 1,
            sc_state: 2,
            battery_soc: 87,
            battery_voltage_mv: 7400,
            gyro: [0.01, -0.02, 0.005],
            images_stored: 4,
            samples: 0,
        }
    }

    /// Build a report, filling the slots this simulator models and leaving
    /// the rest to serialize as zero.
    pub fn generate_report(&mut self, name: &str) -> Result<Report, downlink_core::CodecError> {
        self.tick();
        let mut report = Report::new(name)?;
        let names: Vec<&'static str> = report.variable_names().collect();
        for var in names {
            if let Some(value) = self.sample(var) {
                report.set_variable(var, value)?;
            }
        }
        Ok(report)
    }

    fn tick(&mut self) {
        self.samples = self.samples.wrapping_add(1);
        self.battery_soc = 60 + (self.samples % 40) as u8;
        self.battery_voltage_mv = 7200 + (self.samples % 500) as i16;
        for g in &mut self.gyro {
            *g = -*g * 0.9;
        }
    }

    fn sample(&self, var: &str) -> Option<Value> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        match var {
            "TIME" => Some(Value::U32(now)),
            "SC_STATE" => Some(Value::U8(self.sc_state)),
            "REBOOT_COUNT" => Some(Value::U8(self.reboot_count)),
            "CURRENT_RAM_USAGE" => Some(Value::U8(37)),
            "SD_USAGE" => Some(Value::U32(1024 * self.samples)),
            "BATTERY_PACK_REPORTED_SOC" => Some(Value::U8(self.battery_soc)),
            "BATTERY_PACK_VOLTAGE" => Some(Value::I16(self.battery_voltage_mv)),
            "GYRO_X" => Some(Value::F32(self.gyro[0])),
            "GYRO_Y" => Some(Value::F32(self.gyro[1])),
            "GYRO_Z" => Some(Value::F32(self.gyro[2])),
            "GPS_MESSAGE_ID" => Some(Value::U8(1)),
            "GPS_NUMBER_OF_SV" => Some(Value::U8(9)),
            "IMAGES_STORED" => Some(Value::U16(self.images_stored)),
            "PAYLOAD_STATE" => Some(Value::U8(1)),
            "STORAGE_TOTAL" => Some(Value::U32(512 * 1024 * 1024)),
            _ => None,
        }
    }
}
