//! Module encoding
//!
//! The compiler-side counterpart of the reader. [`ModuleWriter`] collects
//! constants, heap slots and classes and produces the byte form the VM loads.

use super::{
    ClassDecl, Function, Instruction, Member, Module, MAGIC, VARIADIC_MARKER, VERSION,
};
use crate::opcode::OpCode;
use crate::value::Value;

/// Append `value` as ULEB128
pub fn encode_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn uleb(out: &mut Vec<u8>, value: usize) {
    encode_uleb128(out, value as u64);
}

fn cstr(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

pub(super) fn encode_module(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);

    uleb(&mut out, module.constants.len());
    for constant in &module.constants {
        encode_constant(&mut out, constant);
    }

    uleb(&mut out, module.heap.len());
    for tags in &module.heap {
        out.extend_from_slice(tags);
    }

    for class in &module.classes {
        encode_class(&mut out, class);
    }
    out
}

fn encode_constant(out: &mut Vec<u8>, value: &Value) {
    out.push(value.tag());
    match value {
        Value::Byte(v) => out.push(*v as u8),
        Value::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Str(s) => {
            uleb(out, s.len() + 1);
            cstr(out, s);
        }
        // constant() only admits scalars and strings
        _ => {}
    }
}

fn encode_class(out: &mut Vec<u8>, class: &ClassDecl) {
    cstr(out, &class.name);
    uleb(out, class.members.len());
    for member in &class.members {
        cstr(out, &member.name);
        out.extend_from_slice(&member.tags);
    }
    uleb(out, class.methods.len());
    for method in &class.methods {
        encode_method(out, method);
    }
}

fn encode_method(out: &mut Vec<u8>, method: &Function) {
    cstr(out, &method.name);
    if method.variadic {
        out.push(VARIADIC_MARKER);
    }
    uleb(out, method.params.len());
    for &param in &method.params {
        uleb(out, param);
    }
    uleb(out, method.code.len());
    for instruction in &method.code {
        out.push(instruction.opcode.as_u8());
        for &operand in &instruction.operands {
            uleb(out, operand);
        }
    }
}

fn same_constant(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Builds a module
#[derive(Debug, Clone, Default)]
pub struct ModuleWriter {
    module: Module,
}

impl ModuleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant and return its pool index. Equal constants are shared.
    ///
    /// # Panics
    /// Panics if `value` is not a byte, long, double, uint64 or string; the
    /// pool has no encoding for anything else.
    pub fn constant(&mut self, value: Value) -> usize {
        if !matches!(
            value,
            Value::Byte(_) | Value::Long(_) | Value::Double(_) | Value::U64(_) | Value::Str(_)
        ) {
            panic!("{} values cannot be pooled", value.type_name());
        }
        if let Some(index) = self
            .module
            .constants
            .iter()
            .position(|c| same_constant(c, &value))
        {
            return index;
        }
        self.module.constants.push(value);
        self.module.constants.len() - 1
    }

    /// Add a heap slot with the given type tags and return its index
    pub fn slot(&mut self, tags: &[u8]) -> usize {
        self.module.heap.push(tags.to_vec());
        self.module.heap.len() - 1
    }

    /// Number of heap slots declared so far
    pub fn slot_count(&self) -> usize {
        self.module.heap.len()
    }

    pub fn class(&mut self, class: ClassWriter) -> &mut Self {
        self.module.classes.push(class.build());
        self
    }

    /// The module as built so far
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn finish(&self) -> Vec<u8> {
        self.module.encode()
    }
}

/// Builds a class declaration
#[derive(Debug, Clone)]
pub struct ClassWriter {
    class: ClassDecl,
}

impl ClassWriter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: ClassDecl {
                name: name.into(),
                members: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    pub fn member(mut self, name: impl Into<String>, tags: &[u8]) -> Self {
        self.class.members.push(Member {
            name: name.into(),
            tags: tags.to_vec(),
        });
        self
    }

    pub fn method(mut self, method: MethodWriter) -> Self {
        self.class.methods.push(method.build());
        self
    }

    pub fn build(self) -> ClassDecl {
        self.class
    }
}

/// Builds a method
#[derive(Debug, Clone)]
pub struct MethodWriter {
    function: Function,
}

impl MethodWriter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: Function {
                name: name.into(),
                variadic: false,
                params: Vec::new(),
                code: Vec::new(),
            },
        }
    }

    /// Parameter slots; the first receives the return value
    pub fn params(mut self, params: &[usize]) -> Self {
        self.function.params = params.to_vec();
        self
    }

    pub fn variadic(mut self) -> Self {
        self.function.variadic = true;
        self
    }

    pub fn op(mut self, opcode: OpCode, operands: &[usize]) -> Self {
        self.function
            .code
            .push(Instruction::new(opcode, operands.to_vec()));
        self
    }

    /// `INVOKE name count slots...`; `slots[0]` is the return slot
    pub fn invoke(self, name: usize, slots: &[usize]) -> Self {
        let mut operands = vec![name, slots.len()];
        operands.extend_from_slice(slots);
        self.op(OpCode::Invoke, &operands)
    }

    /// `INVOKE_METHOD receiver name count slots...`
    pub fn invoke_method(self, receiver: usize, name: usize, slots: &[usize]) -> Self {
        let mut operands = vec![receiver, name, slots.len()];
        operands.extend_from_slice(slots);
        self.op(OpCode::InvokeMethod, &operands)
    }

    /// Index the next instruction will get
    pub fn next_index(&self) -> usize {
        self.function.code.len()
    }

    pub fn build(self) -> Function {
        self.function
    }
}
