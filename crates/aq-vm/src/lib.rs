//! AQ Virtual Machine
//!
//! This crate loads and runs compiled AQ bytecode modules. Values live in
//! tagged slots on index-addressed heaps; instructions name slots of the heap
//! of the module whose code is running.
//!
//! # Architecture
//!
//! - One [`Store`](heap::Store) owns every heap: module heaps, array storage
//!   and class instances. References are `(heap, index)` handles.
//! - Each module's free functions form an implicit class, `.!__start`, whose
//!   instance lives in slot 2 of the module heap.
//! - Classes named `~file~class` are loaded lazily from a
//!   [`ModuleSource`](registry::ModuleSource), once per file.
//! - Every failure is a [`VmError`]; recoverable conditions are recorded as
//!   [`Warning`]s and execution continues.
//!
//! # Modules
//!
//! - `opcode`: Instruction set definitions
//! - `value`: Type tags, slots and runtime values
//! - `heap`: Heap store, reference resolution and typed access
//! - `bytecode`: Module format reader and writer
//! - `registry`: Class registry and module linker
//! - `vm`: Virtual machine execution engine
//! - `builtins`: Built-in function registry and implementations
//! - `config`: VM settings
//! - `error`: Error and warning types

#![allow(clippy::result_large_err)]

pub mod builtins;
pub mod bytecode;
pub mod bytecode_debug;
pub mod config;
pub mod error;
pub mod heap;
pub mod opcode;
pub mod registry;
pub mod value;
pub mod vm;

// Re-export main types
pub use bytecode::{ClassWriter, MethodWriter, Module, ModuleWriter};
pub use bytecode_debug::{disassemble_function, disassemble_module};
pub use config::VmConfig;
pub use error::{VmError, Warning};
pub use opcode::OpCode;
pub use registry::{FileSource, MemorySource, ModuleSource};
pub use value::{Slot, Value};
pub use vm::VM;
