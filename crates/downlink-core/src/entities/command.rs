//! Command entity: a ground→satellite request with typed arguments.

use bytes::Bytes;

use crate::defs::defs;
use crate::error::CodecError;
use crate::scalar::Value;

/// A command under construction or freshly decoded.
///
/// Arguments are stored by declaration position. A command with unset
/// arguments fails to pack, so a decoded command always has every argument
/// populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: &'static str,
    command_id: u16,
    values: Vec<Option<Value>>,
}

impl Command {
    /// Create an empty command. Fails if `name` is not in the command table.
    pub fn new(name: &str) -> Result<Self, CodecError> {
        let d = defs();
        let command_id = d
            .command_id(name)
            .ok_or_else(|| CodecError::UnknownCommand(name.to_string()))?;
        let name = d.command_name(command_id).unwrap_or_default();
        let def = d.command_def(name).expect("id resolved above");
        Ok(Self {
            name,
            command_id,
            values: vec![None; def.args.len()],
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn command_id(&self) -> u16 {
        self.command_id
    }

    /// Argument names in declaration (wire) order.
    pub fn arg_names(&self) -> &'static [&'static str] {
        defs()
            .command_def(self.name)
            .map(|d| d.args)
            .unwrap_or_default()
    }

    /// Set one argument by name.
    pub fn set_argument(
        &mut self,
        argument: &str,
        value: impl Into<Value>,
    ) -> Result<(), CodecError> {
        let idx = self.arg_index(argument)?;
        self.values[idx] = Some(value.into());
        Ok(())
    }

    /// Read one argument; `None` if unset or not part of this command.
    pub fn argument(&self, argument: &str) -> Option<&Value> {
        let idx = self.arg_index(argument).ok()?;
        self.values[idx].as_ref()
    }

    /// Integer view of an argument, for handlers that consume wire ints.
    pub fn arg_u64(&self, argument: &str) -> Option<u64> {
        self.argument(argument).and_then(Value::as_u64)
    }

    pub fn arg_str(&self, argument: &str) -> Option<&str> {
        self.argument(argument).and_then(Value::as_str)
    }

    pub fn arg_bytes(&self, argument: &str) -> Option<&Bytes> {
        self.argument(argument).and_then(Value::as_bytes)
    }

    pub(crate) fn slot_values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) {
        self.values[index] = Some(value);
    }

    fn arg_index(&self, argument: &str) -> Result<usize, CodecError> {
        self.arg_names()
            .iter()
            .position(|&a| a == argument)
            .ok_or_else(|| CodecError::ArgumentNotInCommand {
                command: self.name.to_string(),
                argument: argument.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_rejected() {
        assert!(matches!(
            Command::new("BAD_CMD"),
            Err(CodecError::UnknownCommand(_))
        ));
    }

    #[test]
    fn set_and_get_arguments() {
        let mut cmd = Command::new("SUM").unwrap();
        cmd.set_argument("op1", 10u32).unwrap();
        assert_eq!(cmd.argument("op1"), Some(&Value::U32(10)));
        assert_eq!(cmd.argument("op2"), None);
        assert_eq!(cmd.arg_u64("op1"), Some(10));
    }

    #[test]
    fn invalid_argument_rejected() {
        let mut cmd = Command::new("SUM").unwrap();
        let err = cmd.set_argument("tid", 1u8).unwrap_err();
        assert!(matches!(err, CodecError::ArgumentNotInCommand { .. }));
    }

    #[test]
    fn arg_names_in_declaration_order() {
        let cmd = Command::new("INIT_TRANS").unwrap();
        assert_eq!(
            cmd.arg_names(),
            ["tid", "number_of_packets", "hash_MSB", "hash_middlesb", "hash_LSB"]
        );
    }
}
