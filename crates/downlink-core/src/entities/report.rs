//! Report entity: a named bundle of telemetry slots.

use crate::defs::defs;
use crate::error::CodecError;
use crate::scalar::Value;

/// A telemetry report under construction or freshly decoded.
///
/// Slots are stored in canonical `(subsystem_id, variable_id)` order; unset
/// slots serialize as zero of their declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    name: &'static str,
    report_id: u8,
    values: Vec<Option<Value>>,
}

impl Report {
    /// Create an empty report. Fails if `name` is not in the report table.
    pub fn new(name: &str) -> Result<Self, CodecError> {
        let d = defs();
        let report_id = d
            .report_id(name)
            .ok_or_else(|| CodecError::UnknownReport(name.to_string()))?;
        let name = d.report_name(report_id).unwrap_or_default();
        let slots = d.ordered_report(name).unwrap_or_default();
        Ok(Self {
            name,
            report_id,
            values: vec![None; slots.len()],
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    /// Set one slot by variable name. The variable must belong to this
    /// report.
    pub fn set_variable(
        &mut self,
        variable: &str,
        value: impl Into<Value>,
    ) -> Result<(), CodecError> {
        let idx = defs().report_slot(self.name, variable).ok_or_else(|| {
            CodecError::VariableNotInReport {
                report: self.name.to_string(),
                variable: variable.to_string(),
            }
        })?;
        self.values[idx] = Some(value.into());
        Ok(())
    }

    /// Read one slot by variable name; `None` if the slot is unset.
    pub fn variable(&self, variable: &str) -> Result<Option<&Value>, CodecError> {
        let idx = defs().report_slot(self.name, variable).ok_or_else(|| {
            CodecError::VariableNotInReport {
                report: self.name.to_string(),
                variable: variable.to_string(),
            }
        })?;
        Ok(self.values[idx].as_ref())
    }

    /// Variable names in canonical wire order.
    pub fn variable_names(&self) -> impl Iterator<Item = &'static str> {
        defs()
            .ordered_report(self.name)
            .unwrap_or_default()
            .iter()
            .map(|s| s.var.name)
    }

    pub(crate) fn slot_values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) {
        self.values[index] = Some(value);
    }
}
