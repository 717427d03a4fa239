//! Bytecode debugging utilities

use crate::bytecode::{ClassDecl, Function, Instruction, Module};
use crate::opcode::{CmpOp, OpCode};
use crate::value::{tag, Value};
use std::fmt::Write;

/// Render a whole module: constants, heap template and every class
pub fn disassemble_module(module: &Module) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "========== Constants ({}) ==========", module.constants.len());
    for (i, constant) in module.constants.iter().enumerate() {
        let _ = writeln!(out, "  K[{}] {:<7} {}", i, constant.type_name(), quoted(constant));
    }

    let _ = writeln!(out, "\n========== Heap ({} slots) ==========", module.heap.len());
    for (i, tags) in module.heap.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", i, format_tags(tags));
    }

    for class in &module.classes {
        disassemble_class(&mut out, module, class);
    }
    out
}

fn disassemble_class(out: &mut String, module: &Module, class: &ClassDecl) {
    let _ = writeln!(out, "\n========== Class: {} ==========", class.name);
    for (i, member) in class.members.iter().enumerate() {
        let _ = writeln!(out, "  member {} {} {}", i, member.name, format_tags(&member.tags));
    }
    for method in &class.methods {
        out.push_str(&disassemble_function(method, &module.constants));
    }
}

/// Render one function, annotating LOAD_CONST with the loaded constant
pub fn disassemble_function(func: &Function, constants: &[Value]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n--- {}{} params={:?} ---",
        func.name,
        if func.variadic { " (variadic)" } else { "" },
        func.params
    );
    for (i, instruction) in func.code.iter().enumerate() {
        let _ = writeln!(out, "{:04}  {}", i, disassemble_instruction(instruction, constants));
    }
    out
}

/// One instruction as `NAME  operands  ; note`
fn disassemble_instruction(instruction: &Instruction, constants: &[Value]) -> String {
    let operands = instruction
        .operands
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = format!("{}  {}", instruction.opcode, operands);

    match (instruction.opcode, instruction.operands.as_slice()) {
        (OpCode::LoadConst, [_, index]) => {
            let note = constants
                .get(*index)
                .map(quoted)
                .unwrap_or_else(|| "???".to_string());
            let _ = write!(line, "  ; {}", note);
        }
        (OpCode::Cmp, [_, code, ..]) => {
            if let Some(op) = CmpOp::from_operand(*code) {
                let _ = write!(line, "  ; {}", op.symbol());
            }
        }
        _ => {}
    }
    line.trim_end().to_string()
}

fn quoted(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

fn format_tags(tags: &[u8]) -> String {
    tags.iter()
        .map(|&t| tag::name(t))
        .collect::<Vec<_>>()
        .join(" ")
}
