//! Built-in function registry for the VM
//!
//! Builtins are looked up by name before any program function, so a native
//! function is indistinguishable from an interpreted one at the call site.

use crate::error::VmError;
use crate::value::Slot;
use crate::vm::VM;
use std::collections::HashMap;

/// Type signature for native VM functions
///
/// `args[0]` is the caller's return slot; the remaining slots are the
/// arguments. A builtin reads and writes them through the VM's store with the
/// same typed accessors instructions use.
pub type NativeFn = fn(&mut VM, &[Slot]) -> Result<(), VmError>;

/// Metadata for a single built-in function
#[derive(Clone)]
pub struct BuiltinMetadata {
    /// Function name
    pub name: String,
    /// Function pointer
    pub func: NativeFn,
    /// Expected argument count, not counting the return slot (-1 for variadic)
    pub arity: i8,
}

impl BuiltinMetadata {
    /// Check the slot count of a call, return slot included
    pub fn check_arity(&self, slots: usize) -> Result<(), VmError> {
        if self.arity < 0 || slots == self.arity as usize + 1 {
            Ok(())
        } else {
            Err(VmError::ArityMismatch {
                callee: self.name.clone(),
                expected: self.arity as usize + 1,
                got: slots,
            })
        }
    }
}

/// Registry of all built-in functions, keyed by the name `INVOKE` uses
pub struct BuiltinRegistry {
    functions: HashMap<String, BuiltinMetadata>,
}

impl BuiltinRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register a built-in function
    ///
    /// # Panics
    /// Panics if the function name is already registered.
    pub fn register(&mut self, name: &str, func: NativeFn, arity: i8) {
        if self.functions.contains_key(name) {
            panic!("Built-in function '{}' already registered", name);
        }
        self.functions.insert(
            name.to_string(),
            BuiltinMetadata {
                name: name.to_string(),
                func,
                arity,
            },
        );
    }

    /// Look up a function by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<&BuiltinMetadata> {
        self.functions.get(name)
    }

    /// Get number of registered functions
    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if registry is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}
