//! OpCode definitions for the AQ VM
//!
//! Instructions are one opcode byte followed by ULEB128 operands. Most opcodes
//! take a fixed number of operands; `INVOKE` and `INVOKE_METHOD` carry an
//! explicit slot count.
//!
//! Operands are heap slot indices unless noted otherwise.

use std::fmt;

/// Virtual machine instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// No operation
    Nop = 0x00,
    /// Deprecated, decoded and ignored
    Load = 0x01,
    /// Deprecated, decoded and ignored
    Store = 0x02,
    /// Allocate: NEW ptr size type
    New = 0x03,
    /// Element access: ARRAY result array index
    Array = 0x04,
    /// Deprecated, decoded and ignored
    Ptr = 0x05,

    // ===== Arithmetic =====
    /// result = a + b
    Add = 0x06,
    /// result = a - b
    Sub = 0x07,
    /// result = a * b
    Mul = 0x08,
    /// result = a / b
    Div = 0x09,
    /// result = a % b
    Rem = 0x0A,
    /// result = -a
    Neg = 0x0B,
    /// result = a << b
    Shl = 0x0C,
    /// result = a >> b
    Shr = 0x0D,

    /// result aliases the origin of a
    Refer = 0x0E,
    /// IF cond then else (branch operands are instruction indices)
    If = 0x0F,

    // ===== Bitwise =====
    /// result = a & b
    And = 0x10,
    /// result = a | b
    Or = 0x11,
    /// result = a ^ b
    Xor = 0x12,

    /// CMP result op a b
    Cmp = 0x13,
    /// INVOKE name count slots...
    Invoke = 0x14,
    /// Value copy: EQUAL result value
    Equal = 0x15,
    /// Jump to the index held in a slot
    Goto = 0x16,
    /// LOAD_CONST result constant (second operand is a pool index)
    LoadConst = 0x17,
    /// Cast into the result's declared type
    Convert = 0x18,
    /// Const alias: CONST result source
    Const = 0x19,
    /// INVOKE_METHOD receiver name count slots...
    InvokeMethod = 0x1A,
    /// LOAD_MEMBER result instance name
    LoadMember = 0x1B,

    /// Reserved for wide operands
    Wide = 0xFF,
}

/// How many operands follow an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many operands
    Fixed(usize),
    /// `prefix` operands, the last of which is a count of further operands
    Counted { prefix: usize },
}

impl OpCode {
    /// Convert from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        let op = match byte {
            0x00 => OpCode::Nop,
            0x01 => OpCode::Load,
            0x02 => OpCode::Store,
            0x03 => OpCode::New,
            0x04 => OpCode::Array,
            0x05 => OpCode::Ptr,
            0x06 => OpCode::Add,
            0x07 => OpCode::Sub,
            0x08 => OpCode::Mul,
            0x09 => OpCode::Div,
            0x0A => OpCode::Rem,
            0x0B => OpCode::Neg,
            0x0C => OpCode::Shl,
            0x0D => OpCode::Shr,
            0x0E => OpCode::Refer,
            0x0F => OpCode::If,
            0x10 => OpCode::And,
            0x11 => OpCode::Or,
            0x12 => OpCode::Xor,
            0x13 => OpCode::Cmp,
            0x14 => OpCode::Invoke,
            0x15 => OpCode::Equal,
            0x16 => OpCode::Goto,
            0x17 => OpCode::LoadConst,
            0x18 => OpCode::Convert,
            0x19 => OpCode::Const,
            0x1A => OpCode::InvokeMethod,
            0x1B => OpCode::LoadMember,
            0xFF => OpCode::Wide,
            _ => return None,
        };
        Some(op)
    }

    /// Convert to u8
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Operand layout
    pub fn arity(self) -> Arity {
        match self {
            OpCode::Nop | OpCode::Wide => Arity::Fixed(0),
            OpCode::Goto => Arity::Fixed(1),
            OpCode::Load
            | OpCode::Store
            | OpCode::Ptr
            | OpCode::Neg
            | OpCode::Refer
            | OpCode::Equal
            | OpCode::LoadConst
            | OpCode::Convert
            | OpCode::Const => Arity::Fixed(2),
            OpCode::New
            | OpCode::Array
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::If
            | OpCode::LoadMember => Arity::Fixed(3),
            OpCode::Cmp => Arity::Fixed(4),
            OpCode::Invoke => Arity::Counted { prefix: 2 },
            OpCode::InvokeMethod => Arity::Counted { prefix: 3 },
        }
    }

    /// Get opcode name
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::New => "NEW",
            OpCode::Array => "ARRAY",
            OpCode::Ptr => "PTR",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Rem => "REM",
            OpCode::Neg => "NEG",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::Refer => "REFER",
            OpCode::If => "IF",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::Cmp => "CMP",
            OpCode::Invoke => "INVOKE",
            OpCode::Equal => "EQUAL",
            OpCode::Goto => "GOTO",
            OpCode::LoadConst => "LOAD_CONST",
            OpCode::Convert => "CONVERT",
            OpCode::Const => "CONST",
            OpCode::InvokeMethod => "INVOKE_METHOD",
            OpCode::LoadMember => "LOAD_MEMBER",
            OpCode::Wide => "WIDE",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `CMP` sub-operations, selected by the operand after the result slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq = 0,
    Ne = 1,
    Gt = 2,
    Ge = 3,
    Lt = 4,
    Le = 5,
}

impl CmpOp {
    pub fn from_operand(value: usize) -> Option<Self> {
        match value {
            0 => Some(CmpOp::Eq),
            1 => Some(CmpOp::Ne),
            2 => Some(CmpOp::Gt),
            3 => Some(CmpOp::Ge),
            4 => Some(CmpOp::Lt),
            5 => Some(CmpOp::Le),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }

    /// Apply to an ordering result
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ordering == Equal,
            CmpOp::Ne => ordering != Equal,
            CmpOp::Gt => ordering == Greater,
            CmpOp::Ge => ordering != Less,
            CmpOp::Lt => ordering == Less,
            CmpOp::Le => ordering != Greater,
        }
    }
}
