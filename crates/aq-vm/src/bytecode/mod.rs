//! Bytecode module format
//!
//! A module is laid out as:
//!
//! ```text
//! magic    "AQBC"
//! version  00 00 00 03
//! uleb     constant count, then per constant: tag byte + payload
//! uleb     heap slot count, then per slot: a type-tag sequence
//! classes  until end of input: name\0, members, methods
//! ```
//!
//! Fixed-width constants are big-endian. Strings carry a ULEB128 byte length
//! that includes a trailing NUL.

mod reader;
mod writer;

pub use reader::{decode_uleb128, Reader};
pub use writer::{encode_uleb128, ClassWriter, MethodWriter, ModuleWriter};

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::Value;

/// File magic
pub const MAGIC: [u8; 4] = [0x41, 0x51, 0x42, 0x43];

/// Supported format version
pub const VERSION: [u8; 4] = [0x00, 0x00, 0x00, 0x03];

/// Marker byte before a variadic method's parameter list
pub const VARIADIC_MARKER: u8 = 0xFF;

/// Name of the implicit class holding a program's free functions
pub const START_CLASS: &str = ".!__start";

/// Entry method of the implicit class
pub const START_METHOD: &str = "!__start";

/// Method run after an instance is allocated
pub const CONSTRUCTOR: &str = "@constructor";

/// One decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operands: Vec<usize>,
}

impl Instruction {
    pub fn new(opcode: OpCode, operands: Vec<usize>) -> Self {
        Self { opcode, operands }
    }
}

/// A method or free function
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub variadic: bool,
    /// Parameter slots in the module heap; slot 0 of this list receives the
    /// return value
    pub params: Vec<usize>,
    pub code: Vec<Instruction>,
}

/// A class member declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub tags: Vec<u8>,
}

/// A class declaration as stored in a module
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub members: Vec<Member>,
    pub methods: Vec<Function>,
}

/// A decoded module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub constants: Vec<Value>,
    /// Type tags of each heap slot
    pub heap: Vec<Vec<u8>>,
    pub classes: Vec<ClassDecl>,
}

impl Module {
    /// Decode a module from its byte form
    pub fn decode(bytes: &[u8]) -> Result<Self, VmError> {
        Reader::new(bytes).module()
    }

    /// Encode into the byte form
    pub fn encode(&self) -> Vec<u8> {
        writer::encode_module(self)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&Function> {
        self.methods.iter().find(|m| m.name == name)
    }
}
