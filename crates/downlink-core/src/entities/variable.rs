//! Standalone variable sample.

use crate::defs::defs;
use crate::error::CodecError;
use crate::scalar::{Scalar, Value};

/// A single telemetry point sent outside a report.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: &'static str,
    subsystem: &'static str,
    subsystem_id: u8,
    variable_id: u16,
    value: Option<Value>,
}

impl Variable {
    /// Create an unset variable. Fails if `name` is not in the variable
    /// table; the owning subsystem comes from the table.
    pub fn new(name: &str) -> Result<Self, CodecError> {
        let (subsystem_id, variable_id, def) = defs()
            .variable(name)
            .ok_or_else(|| CodecError::UnknownVariable(name.to_string()))?;
        Ok(Self {
            name: def.name,
            subsystem: def.subsystem,
            subsystem_id,
            variable_id,
            value: None,
        })
    }

    /// Create a variable with its value in one step.
    pub fn with_value(name: &str, value: impl Into<Value>) -> Result<Self, CodecError> {
        let mut v = Self::new(name)?;
        v.set_value(value);
        Ok(v)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subsystem(&self) -> &'static str {
        self.subsystem
    }

    pub fn subsystem_id(&self) -> u8 {
        self.subsystem_id
    }

    pub fn variable_id(&self) -> u16 {
        self.variable_id
    }

    pub fn scalar(&self) -> Scalar {
        defs()
            .variable(self.name)
            .map(|(_, _, def)| def.scalar)
            .unwrap_or(Scalar::U8)
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}
