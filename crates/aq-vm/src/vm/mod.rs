//! Virtual Machine implementation

use crate::builtins::create_builtin_registry;
use crate::builtins::registry::{BuiltinRegistry, NativeFn};
use crate::bytecode::{Instruction, Module, START_CLASS, START_METHOD};
use crate::config::VmConfig;
use crate::error::{VmError, Warning};
use crate::heap::{HeapKind, Store};
use crate::opcode::OpCode;
use crate::registry::{FileSource, ModuleId, ModuleSource, Registry};
use crate::value::{tag, HeapId, Object, Slot, Value};
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, trace};

// Module structure
mod execution;
mod frame;
mod ops;
mod result;

// Re-export public types
pub use frame::CallFrame;

use result::Flow;

/// Heap slot of a module that holds its top-level class instance
pub const START_SLOT: usize = 2;

/// Virtual Machine
pub struct VM {
    /// Every heap of the program and of linked modules
    pub(crate) store: Store,

    /// Classes and loaded modules
    pub(crate) registry: Registry,

    /// Native functions, looked up before program functions
    pub(crate) builtins: BuiltinRegistry,

    pub(crate) config: VmConfig,

    /// Call stack
    pub(crate) frames: Vec<CallFrame>,

    /// Where builtins print
    output: Box<dyn Write>,

    /// Host-owned slots used as return slots of implicit calls
    scratch: HeapId,

    /// Module passed to [`VM::load`]
    main: Option<ModuleId>,
}

impl VM {
    /// Create a new VM with the default configuration
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut store = Store::with_max_len(config.max_object_len);
        let scratch = store.alloc(HeapKind::Scratch, vec![Object::free()]);
        let source = FileSource::new(config.module_dir.clone());
        Self {
            store,
            registry: Registry::new(Box::new(source)),
            builtins: create_builtin_registry(),
            config,
            frames: Vec::with_capacity(64),
            output: Box::new(std::io::stdout()),
            scratch,
            main: None,
        }
    }

    /// Read `~file~class` modules from `source` instead of the module directory
    pub fn with_source(mut self, source: impl ModuleSource + 'static) -> Self {
        self.registry.set_source(Box::new(source));
        self
    }

    /// Send builtin output to `output` instead of stdout
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Add a native function callable through `INVOKE` and `INVOKE_METHOD`
    ///
    /// # Panics
    /// Panics if a builtin with this name already exists.
    pub fn register_builtin(&mut self, name: &str, func: NativeFn, arity: i8) {
        self.builtins.register(name, func, arity);
    }

    // ===== Driver =====

    /// Decode and install the program module
    pub fn load(&mut self, bytes: &[u8]) -> Result<ModuleId, VmError> {
        let module = Module::decode(bytes)?;
        self.load_module(module)
    }

    /// Install an already decoded program module
    pub fn load_module(&mut self, module: Module) -> Result<ModuleId, VmError> {
        let id = self.registry.install(&mut self.store, None, module)?;
        debug!(
            module = id.0,
            classes = self.registry.class_count(),
            "program loaded"
        );
        self.main = Some(id);
        Ok(id)
    }

    /// Instantiate the program's top-level class and run its entry method
    pub fn start(&mut self) -> Result<(), VmError> {
        let module = self.main.ok_or(VmError::NotLoaded)?;
        let instance = self.start_instance(module)?;
        let class = self.registry.start_class(&mut self.store, module)?;
        let entry = class
            .method(START_METHOD)
            .ok_or_else(|| VmError::MethodNotFound {
                class: START_CLASS.to_string(),
                method: START_METHOD.to_string(),
            })?;

        debug!("running {}", START_METHOD);
        let result = self.call_implicit(module, entry, instance);
        self.output.flush().map_err(|source| VmError::Io {
            name: "output".to_string(),
            source,
        })?;
        result
    }

    /// Load and run a program
    pub fn run(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.load(bytes)?;
        self.start()
    }

    /// Top-level instance of `module`, created and constructed on first use
    pub(crate) fn start_instance(&mut self, module: ModuleId) -> Result<HeapId, VmError> {
        if let Some(instance) = self.registry.module(module)?.start_instance {
            return Ok(instance);
        }

        let heap = self.registry.module(module)?.heap;
        let class = self.registry.start_class(&mut self.store, module)?;
        self.store.ensure_len(heap, START_SLOT + 1)?;

        let instance = self
            .store
            .alloc(HeapKind::Instance, class.instance_template());
        let mut holder = Object::declared(vec![tag::OBJECT]);
        holder.value = Value::Instance(instance);
        self.store.put(Slot::new(heap, START_SLOT), holder)?;
        self.registry.module_mut(module)?.start_instance = Some(instance);
        debug!(module = module.0, instance = instance.0, "top-level instance");

        self.run_constructor(&class, instance)?;
        Ok(instance)
    }

    // ===== Dispatch =====

    /// Run the frame on top of the stack until its code ends
    fn run_frame(&mut self) -> Result<(), VmError> {
        loop {
            let frame = self.current_frame()?;
            let function = Rc::clone(&frame.function);
            let ip = frame.ip;
            let instruction = match function.code.get(ip) {
                Some(instruction) => instruction,
                None => return Ok(()),
            };

            trace!(
                function = %function.name,
                ip,
                op = %instruction.opcode,
                operands = ?instruction.operands,
                "dispatch"
            );

            let next = match self.execute_instruction(instruction)? {
                Flow::Next => ip + 1,
                Flow::Jump(target) if target <= function.code.len() => target,
                Flow::Jump(target) => {
                    return Err(VmError::InvalidJump {
                        target,
                        len: function.code.len(),
                    })
                }
            };
            self.current_frame_mut()?.ip = next;
        }
    }

    /// Execute a single instruction
    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<Flow, VmError> {
        let opcode = instruction.opcode;
        let operands = instruction.operands.as_slice();
        match opcode {
            OpCode::Nop | OpCode::Wide => Ok(Flow::Next),

            // Earlier generation; decoded and skipped
            OpCode::Load | OpCode::Store | OpCode::Ptr => {
                self.store.warn(Warning::DeprecatedOpcode(opcode));
                Ok(Flow::Next)
            }

            // Arithmetic operations
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Neg
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor => self.execute_arithmetic(opcode, operands),

            // Comparison operations
            OpCode::Cmp => self.execute_comparison(opcode, operands),

            // Control flow
            OpCode::If | OpCode::Goto => self.execute_control(opcode, operands),

            // Slot operations
            OpCode::Refer
            | OpCode::Equal
            | OpCode::LoadConst
            | OpCode::Convert
            | OpCode::Const => self.execute_memory(opcode, operands),

            // Arrays and objects
            OpCode::New | OpCode::Array | OpCode::LoadMember => {
                self.execute_objects(opcode, operands)
            }

            // Calls
            OpCode::Invoke | OpCode::InvokeMethod => self.execute_functions(opcode, operands),
        }
    }

    // ===== Helper methods =====

    /// Get current call frame
    pub(crate) fn current_frame(&self) -> Result<&CallFrame, VmError> {
        self.frames.last().ok_or(VmError::StackUnderflow)
    }

    /// Get current call frame (mutable)
    pub(crate) fn current_frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        self.frames.last_mut().ok_or(VmError::StackUnderflow)
    }

    /// Operand `index` as a slot of the current heap
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> Result<Slot, VmError> {
        Ok(self.current_frame()?.slot(index))
    }

    /// Return slot for calls made by the VM itself
    pub(crate) fn scratch_slot(&mut self) -> Result<Slot, VmError> {
        let slot = Slot::new(self.scratch, 0);
        self.store.put(slot, Object::free())?;
        Ok(slot)
    }

    /// Write text to the output sink
    pub fn write_output(&mut self, text: &str) -> Result<(), VmError> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|source| VmError::Io {
                name: "output".to_string(),
                source,
            })
    }

    // ===== Host access =====

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Heap of the program module
    pub fn main_heap(&self) -> Option<HeapId> {
        let module = self.main?;
        self.registry.module(module).ok().map(|m| m.heap)
    }

    /// Drain recoverable warnings recorded so far
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.store.take_warnings()
    }

    /// Number of active call frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// Split fixed operands into an array, checking their count
#[inline]
pub(crate) fn operands<const N: usize>(
    opcode: OpCode,
    operands: &[usize],
) -> Result<[usize; N], VmError> {
    <[usize; N]>::try_from(operands).map_err(|_| VmError::OperandCount {
        opcode,
        expected: N,
        got: operands.len(),
    })
}
