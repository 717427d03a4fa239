//! Control flow instruction execution

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::vm::result::Flow;
use crate::vm::{operands, VM};

impl VM {
    /// Execute control flow instructions
    pub(crate) fn execute_control(&mut self, opcode: OpCode, ops: &[usize]) -> Result<Flow, VmError> {
        match opcode {
            // IF condition then else: both targets are instruction indices
            OpCode::If => {
                let [condition, then, otherwise] = operands::<3>(opcode, ops)?;
                let value = self.store.value(self.slot(condition)?)?;
                if !value.is_numeric() {
                    return Err(VmError::type_error(
                        "condition",
                        "number",
                        value.type_name(),
                    ));
                }
                Ok(Flow::Jump(if value.is_truthy() { then } else { otherwise }))
            }

            // GOTO location: the target is read from a slot
            OpCode::Goto => {
                let [location] = operands::<1>(opcode, ops)?;
                let location = self.slot(location)?;
                let target = self.store.get_u64(location)?;
                Ok(Flow::Jump(usize::try_from(target).unwrap_or(usize::MAX)))
            }

            _ => unreachable!("Non-control opcode in control handler"),
        }
    }
}
