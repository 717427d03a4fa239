//! Call frame implementation

use crate::bytecode::Function;
use crate::registry::ModuleId;
use crate::value::{HeapId, Slot};
use std::rc::Rc;

/// Call frame (function activation record)
///
/// Operands of every instruction are slot indices into `heap`, the heap of
/// the module that declared the running function.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Module the function belongs to
    pub module: ModuleId,

    /// Heap operands address
    pub heap: HeapId,

    /// Instance the method was invoked on
    pub receiver: Option<HeapId>,

    /// Function being executed
    pub function: Rc<Function>,

    /// Instruction pointer (current position in code)
    pub ip: usize,
}

impl CallFrame {
    pub fn new(
        module: ModuleId,
        heap: HeapId,
        receiver: Option<HeapId>,
        function: Rc<Function>,
    ) -> Self {
        Self {
            module,
            heap,
            receiver,
            function,
            ip: 0,
        }
    }

    /// Slot `index` of this frame's heap
    #[inline]
    pub fn slot(&self, index: usize) -> Slot {
        Slot::new(self.heap, index)
    }
}
