//! Arithmetic instruction execution

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::vm::ops::{BinaryOp, ValueOperations};
use crate::vm::result::Flow;
use crate::vm::{operands, VM};

impl VM {
    /// Execute arithmetic and bitwise instructions
    pub(crate) fn execute_arithmetic(
        &mut self,
        opcode: OpCode,
        ops: &[usize],
    ) -> Result<Flow, VmError> {
        if opcode == OpCode::Neg {
            let [result, operand] = operands::<2>(opcode, ops)?;
            let (result, operand) = (self.slot(result)?, self.slot(operand)?);
            let value = self.store.value(operand)?;
            let negated = ValueOperations::neg_value(&value)?;
            self.store.set_value(result, negated)?;
            return Ok(Flow::Next);
        }

        let Some(op) = BinaryOp::from_opcode(opcode) else {
            unreachable!("Non-arithmetic opcode in arithmetic handler")
        };
        let [result, left, right] = operands::<3>(opcode, ops)?;
        let result = self.slot(result)?;
        let left = self.store.value(self.slot(left)?)?;
        let right = self.store.value(self.slot(right)?)?;
        let value = ValueOperations::binary(op, &left, &right, self.config.max_object_len)?;
        self.store.set_value(result, value)?;
        Ok(Flow::Next)
    }
}
