//! Slot-to-slot instruction execution: aliasing, copies, constants and casts

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{tag, Slot, Value};
use crate::vm::result::Flow;
use crate::vm::{operands, VM};

impl VM {
    /// Execute REFER, EQUAL, LOAD_CONST, CONVERT and CONST
    pub(crate) fn execute_memory(&mut self, opcode: OpCode, ops: &[usize]) -> Result<Flow, VmError> {
        let [result, operand] = operands::<2>(opcode, ops)?;
        let result = self.slot(result)?;

        match opcode {
            OpCode::Refer => {
                let origin = self.store.origin(self.slot(operand)?)?;
                self.store.set_reference(result, origin)?;
            }

            OpCode::Equal => {
                let source = self.slot(operand)?;
                self.copy_value(result, source)?;
            }

            // Operand is a constant pool index, not a slot
            OpCode::LoadConst => {
                let module = self.current_frame()?.module;
                let constant = self
                    .registry
                    .module(module)?
                    .constants
                    .get(operand)
                    .cloned()
                    .ok_or(VmError::InvalidConstant(operand))?;
                self.store.set_value(result, constant)?;
            }

            OpCode::Convert => {
                let source = self.slot(operand)?;
                self.convert_value(result, source)?;
            }

            OpCode::Const => {
                let source = self.slot(operand)?;
                self.store.set_const(result, source)?;
            }

            _ => unreachable!("Non-memory opcode in memory handler"),
        }
        Ok(Flow::Next)
    }

    /// Value-semantics copy from `source` into `target`.
    ///
    /// Scalars and strings are copied. Arrays and instances copy the handle,
    /// so both slots share the same storage. Copying an untyped value does
    /// nothing.
    pub(crate) fn copy_value(&mut self, target: Slot, source: Slot) -> Result<(), VmError> {
        let value = self.store.value(source)?;
        match value {
            Value::None => Ok(()),
            Value::Byte(_)
            | Value::Long(_)
            | Value::Double(_)
            | Value::U64(_)
            | Value::Str(_)
            | Value::Array(_)
            | Value::Instance(_) => self.store.set_value(target, value),
            other => Err(VmError::type_error("copy", "value", other.type_name())),
        }
    }

    /// Cast `source` into the declared type of `target`
    fn convert_value(&mut self, target: Slot, source: Slot) -> Result<(), VmError> {
        let value = self.store.value(source)?;
        let writable = self.store.writable(target)?;
        let declared = self.store.get(writable)?;
        if !declared.fixed {
            return self.copy_value(target, source);
        }

        let declared = declared.tag();
        let converted = match (&value, declared) {
            (v, tag::STRING) if v.is_numeric() => Value::Str(v.to_string()),
            (Value::Str(s), t) if tag::is_numeric(t) => parse_number(s, t)?,
            _ => value,
        };
        // numeric targets are narrowed or widened by the store itself
        self.store.set_value(target, converted)
    }
}

fn parse_number(text: &str, to: u8) -> Result<Value, VmError> {
    let text = text.trim();
    let parsed = match to {
        tag::BYTE => text.parse().ok().map(Value::Byte),
        tag::LONG => text.parse().ok().map(Value::Long),
        tag::DOUBLE => text.parse().ok().map(Value::Double),
        tag::U64 => text.parse().ok().map(Value::U64),
        _ => None,
    };
    parsed.ok_or_else(|| VmError::type_error("convert", tag::name(to), format!("\"{}\"", text)))
}
