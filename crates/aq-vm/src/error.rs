//! Error types for the loader and the VM

use crate::opcode::OpCode;
use thiserror::Error;

/// Fatal VM errors.
///
/// Every failure in loading or executing a module ends up here. The VM never
/// continues past one of these; the host decides whether to abort the process.
#[derive(Debug, Error)]
pub enum VmError {
    // ===== Module format =====
    /// Header magic is not `AQBC`
    #[error("bad module magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Header version is not the one this VM understands
    #[error("unsupported module version: {0:02x?}")]
    UnsupportedVersion([u8; 4]),

    /// The byte stream ended early or is otherwise malformed
    #[error("malformed module at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    /// Unknown type tag in the constant pool, heap template or a member
    #[error("unknown type tag 0x{0:02x}")]
    UnknownTypeTag(u8),

    /// Unknown opcode byte
    #[error("unknown opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    // ===== Heap =====
    /// Slot index outside its heap
    #[error("slot {index} is out of range (heap {heap} holds {len})")]
    SlotOutOfRange {
        heap: usize,
        index: usize,
        len: usize,
    },

    /// Constant pool index outside the pool
    #[error("constant {0} is out of range")]
    InvalidConstant(usize),

    /// A reference slot that was never bound
    #[error("reference at slot {0} is unbound")]
    UnboundReference(usize),

    /// A reference chain that loops back on itself
    #[error("reference chain starting at slot {0} does not terminate")]
    ReferenceCycle(usize),

    /// Write through or rebinding of a const slot
    #[error("slot {0} is const")]
    ConstViolation(usize),

    /// Attempt to turn a declared non-reference slot into a reference
    #[error("slot {0} is declared as a value and cannot hold a reference")]
    NotAReference(usize),

    /// A reference rebound to a value of a different type
    #[error("cannot change reference type: declared 0x{declared:02x}, got 0x{got:02x}")]
    ReferenceTypeMismatch { declared: u8, got: u8 },

    /// Operand types not supported by an operation
    #[error("type error in {operation}: expected {expected}, got {got}")]
    TypeError {
        operation: String,
        expected: String,
        got: String,
    },

    /// Integer division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,

    // ===== Linking and calls =====
    /// Class name not known to the registry
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// Free function not found in builtins or the program
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// Method not found on a class
    #[error("method not found: {class}.{method}")]
    MethodNotFound { class: String, method: String },

    /// Member not found on a class
    #[error("member not found: {class}.{member}")]
    MemberNotFound { class: String, member: String },

    /// Qualified class name that does not follow `~file~class`
    #[error("invalid qualified class name: {0}")]
    InvalidClassName(String),

    /// Argument count does not fit the callee's parameter list
    #[error("{callee} expects {expected} argument slots, got {got}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        got: usize,
    },

    /// Receiver operand used outside a method call
    #[error("no receiver in the current frame")]
    NoReceiver,

    /// Jump target past the end of the instruction list
    #[error("jump target {target} is out of range ({len} instructions)")]
    InvalidJump { target: usize, len: usize },

    /// Negative or otherwise unusable array index
    #[error("array index {0} is out of range")]
    InvalidIndex(i64),

    /// Array or string larger than `VmConfig::max_object_len`
    #[error("{what} of length {requested} exceeds the limit of {limit}")]
    AllocationLimit {
        what: &'static str,
        requested: u64,
        limit: usize,
    },

    /// Operand count does not match the opcode
    #[error("{opcode} expects {expected} operands, got {got}")]
    OperandCount {
        opcode: OpCode,
        expected: usize,
        got: usize,
    },

    /// Call nesting exceeded the configured limit
    #[error("call depth exceeded ({0} frames)")]
    CallDepthExceeded(usize),

    /// Instruction executed with no active call frame
    #[error("call stack is empty")]
    StackUnderflow,

    /// Program has not been loaded
    #[error("no module loaded")]
    NotLoaded,

    // ===== Host =====
    /// Module could not be read from its source
    #[error("cannot load module {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Failure inside a builtin function
    #[error("builtin {name} failed: {message}")]
    Builtin { name: String, message: String },
}

impl VmError {
    /// Build a [`VmError::TypeError`]
    pub fn type_error(
        operation: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        VmError::TypeError {
            operation: operation.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// True for errors raised while decoding a module rather than running it
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            VmError::BadMagic(_)
                | VmError::UnsupportedVersion(_)
                | VmError::Malformed { .. }
                | VmError::UnknownTypeTag(_)
                | VmError::InvalidOpcode(_)
                | VmError::Io { .. }
        )
    }
}

/// Recoverable conditions. Logged and recorded; execution continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Numeric value narrowed to a type that cannot represent it exactly
    LossyConversion { from: u8, to: u8 },
    /// Opcode kept only for compatibility with older generators
    DeprecatedOpcode(OpCode),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::LossyConversion { from, to } => {
                write!(f, "lossy conversion from 0x{:02x} to 0x{:02x}", from, to)
            }
            Warning::DeprecatedOpcode(op) => write!(f, "deprecated opcode {}", op),
        }
    }
}
