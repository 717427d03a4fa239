//! Comparison instruction execution

use crate::error::VmError;
use crate::opcode::{CmpOp, OpCode};
use crate::vm::ops::ValueOperations;
use crate::vm::result::Flow;
use crate::vm::{operands, VM};

impl VM {
    /// `CMP result code left right`; the result is a byte 0 or 1
    pub(crate) fn execute_comparison(
        &mut self,
        opcode: OpCode,
        ops: &[usize],
    ) -> Result<Flow, VmError> {
        let [result, code, left, right] = operands::<4>(opcode, ops)?;
        let op = CmpOp::from_operand(code).ok_or_else(|| {
            VmError::type_error("comparison", "comparison code 0-5", code.to_string())
        })?;

        let left = self.store.value(self.slot(left)?)?;
        let right = self.store.value(self.slot(right)?)?;
        let holds = ValueOperations::compare(op, &left, &right)?;
        let result = self.slot(result)?;
        self.store.set_byte(result, holds as i8)?;
        Ok(Flow::Next)
    }
}
