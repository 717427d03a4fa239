//! Built-in functions
//!
//! - I/O: `__builtin_print`, `__builtin_vaprint`
//! - Math: `__builtin_abs`

pub mod io;
pub mod math;
pub mod registry;

use registry::BuiltinRegistry;

/// Create and populate the built-in function registry
pub fn create_builtin_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();

    registry.register("__builtin_print", io::vm_print, 1);
    registry.register("__builtin_vaprint", io::vm_vaprint, 1);
    registry.register("__builtin_abs", math::vm_abs, 1);

    registry
}
