//! Mathematical built-in functions

use crate::error::VmError;
use crate::value::{Slot, Value};
use crate::vm::VM;

/// Absolute value, keeping the numeric type where it fits
pub fn vm_abs(vm: &mut VM, args: &[Slot]) -> Result<(), VmError> {
    let result = match vm.store().value(args[1])? {
        Value::Byte(v) => match v.checked_abs() {
            Some(v) => Value::Byte(v),
            None => Value::Long((v as i64).abs()),
        },
        Value::Long(v) => match v.checked_abs() {
            Some(v) => Value::Long(v),
            None => Value::U64(v.unsigned_abs()),
        },
        Value::Double(v) => Value::Double(v.abs()),
        Value::U64(v) => Value::U64(v),
        other => {
            return Err(VmError::type_error(
                "__builtin_abs",
                "number",
                other.type_name(),
            ))
        }
    };
    vm.store_mut().set_value(args[0], result)
}
