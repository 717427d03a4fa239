//! Execution result types

/// What the dispatch loop does after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Continue to next instruction
    Next,
    /// Continue at this instruction index
    Jump(usize),
}
