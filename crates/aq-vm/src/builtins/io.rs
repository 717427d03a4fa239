//! Output built-in functions

use crate::error::VmError;
use crate::value::{Slot, Value};
use crate::vm::VM;

/// Text form of a printable value
fn printable(name: &str, value: &Value) -> Result<String, VmError> {
    match value {
        Value::Byte(_) | Value::Long(_) | Value::Double(_) | Value::U64(_) | Value::Str(_) => {
            Ok(value.to_string())
        }
        other => Err(VmError::Builtin {
            name: name.to_string(),
            message: format!("cannot print {}", other.type_name()),
        }),
    }
}

/// Print a scalar or string. Returns the number of bytes written.
pub fn vm_print(vm: &mut VM, args: &[Slot]) -> Result<(), VmError> {
    let value = vm.store().value(args[1])?;
    let text = printable("__builtin_print", &value)?;
    vm.write_output(&text)?;
    vm.store_mut().set_long(args[0], text.len() as i64)
}

/// Print every element of an array. Returns the number of bytes written.
///
/// Elements are only read; class elements that were never reached stay
/// unconstructed and print nothing.
pub fn vm_vaprint(vm: &mut VM, args: &[Slot]) -> Result<(), VmError> {
    let array = vm.store().get_array(args[1])?;
    let len = vm.store().array_len(array.storage)? as i64;

    let mut written = 0usize;
    for index in 0..(len - array.offset).max(0) {
        let Some(slot) = vm.store().peek_element(array, index)? else {
            break;
        };
        let value = vm.store().value(slot)?;
        if value == Value::None {
            continue;
        }
        let text = printable("__builtin_vaprint", &value)?;
        vm.write_output(&text)?;
        written += text.len();
    }
    vm.store_mut().set_long(args[0], written as i64)
}
