//! Function and method calls

use crate::bytecode::Function;
use crate::error::VmError;
use crate::heap::{Element, ElementType};
use crate::opcode::OpCode;
use crate::registry::ModuleId;
use crate::value::{tag, HeapId, Object, Slot, Value};
use crate::vm::frame::CallFrame;
use crate::vm::result::Flow;
use crate::vm::VM;
use std::rc::Rc;
use tracing::trace;

impl VM {
    /// Execute INVOKE and INVOKE_METHOD
    ///
    /// ```text
    /// INVOKE        name count ret args...
    /// INVOKE_METHOD receiver name count ret args...
    /// ```
    pub(crate) fn execute_functions(&mut self, opcode: OpCode, ops: &[usize]) -> Result<Flow, VmError> {
        let prefix = if opcode == OpCode::InvokeMethod { 3 } else { 2 };
        let count = ops.get(prefix - 1).copied().unwrap_or(0);
        let slots = match ops.get(prefix..) {
            Some(slots) if count > 0 && slots.len() == count => slots,
            _ => {
                return Err(VmError::OperandCount {
                    opcode,
                    expected: prefix + count.max(1),
                    got: ops.len(),
                })
            }
        };

        let name = self.store.get_string(self.slot(ops[prefix - 2])?)?;
        let args = slots
            .iter()
            .map(|&index| self.slot(index))
            .collect::<Result<Vec<_>, _>>()?;

        // Builtins shadow program functions
        if let Some(builtin) = self.builtins.get(&name) {
            builtin.check_arity(args.len())?;
            let func = builtin.func;
            trace!(builtin = %name, args = args.len(), "invoke builtin");
            func(self, &args)?;
            return Ok(Flow::Next);
        }

        match opcode {
            OpCode::Invoke => {
                let module = self.current_frame()?.module;
                let class = self
                    .registry
                    .start_class(&mut self.store, module)
                    .map_err(|_| VmError::FunctionNotFound(name.clone()))?;
                let function = class
                    .method(&name)
                    .ok_or_else(|| VmError::FunctionNotFound(name.clone()))?;
                let receiver = self.registry.module(class.module)?.start_instance;
                self.call(class.module, function, receiver, &args)?;
            }

            OpCode::InvokeMethod => {
                let instance = self.instance_operand(ops[0])?;
                let class_name = self.store.get_string(Slot::new(instance, 0))?;
                let class = self.registry.resolve(&mut self.store, &class_name)?;
                let method = class
                    .method(&name)
                    .ok_or_else(|| VmError::MethodNotFound {
                        class: class_name.clone(),
                        method: name.clone(),
                    })?;
                self.call(class.module, method, Some(instance), &args)?;
            }

            _ => unreachable!("Non-call opcode in call handler"),
        }
        Ok(Flow::Next)
    }

    /// Call `function` of `module`.
    ///
    /// `args[0]` is the caller's return slot. Arguments are bound to the
    /// function's parameter slots, the body runs to completion, and the value
    /// left in the return parameter is copied back into `args[0]`.
    pub(crate) fn call(
        &mut self,
        module: ModuleId,
        function: Rc<Function>,
        receiver: Option<HeapId>,
        args: &[Slot],
    ) -> Result<(), VmError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.frames.len()));
        }

        let heap = self.registry.module(module)?.heap;
        trace!(function = %function.name, depth = self.frames.len(), "call");
        self.bind_arguments(heap, &function, args)?;

        self.frames
            .push(CallFrame::new(module, heap, receiver, Rc::clone(&function)));
        let result = self.run_frame();
        self.frames.pop();
        result?;

        if let (Some(&formal), Some(&ret)) = (function.params.first(), args.first()) {
            let formal = Slot::new(heap, formal);
            if self.store.origin(formal)? != self.store.origin(ret)? {
                self.copy_value(ret, formal)?;
            }
        }
        Ok(())
    }

    /// Call a method that takes no arguments, discarding its return value
    pub(crate) fn call_implicit(
        &mut self,
        module: ModuleId,
        function: Rc<Function>,
        receiver: HeapId,
    ) -> Result<(), VmError> {
        let args = if function.params.is_empty() {
            Vec::new()
        } else {
            vec![self.scratch_slot()?]
        };
        self.call(module, function, Some(receiver), &args)
    }

    fn bind_arguments(&mut self, heap: HeapId, function: &Function, args: &[Slot]) -> Result<(), VmError> {
        let params = &function.params;
        let named = if function.variadic {
            params.len().saturating_sub(1)
        } else {
            params.len()
        };

        let arity_ok = if function.variadic {
            args.len() >= named
        } else {
            args.len() == named
        };
        if !arity_ok {
            return Err(VmError::ArityMismatch {
                callee: function.name.clone(),
                expected: params.len(),
                got: args.len(),
            });
        }

        for (&formal, &actual) in params.iter().zip(args).take(named) {
            self.bind_parameter(Slot::new(heap, formal), actual)?;
        }

        if function.variadic {
            if let Some(&rest) = params.last() {
                self.bind_rest(Slot::new(heap, rest), &args[named..])?;
            }
        }
        Ok(())
    }

    /// Bind one formal parameter to the caller's slot
    ///
    /// - `[0x07, 0x08, ..]`: const alias
    /// - `[0x07, ..]`: mutable alias
    /// - `[0x08, ..]`: const alias
    /// - anything else: value copy
    fn bind_parameter(&mut self, formal: Slot, actual: Slot) -> Result<(), VmError> {
        if formal == actual {
            return Ok(());
        }

        let object = self.store.get(formal)?;
        let alias = match object.tags.as_slice() {
            [tag::REF, tag::CONST, ..] if object.fixed => Some(object.tags[1..].to_vec()),
            [tag::REF, ..] if object.fixed => Some(object.tags.clone()),
            [tag::CONST, ..] => Some(object.tags.clone()),
            _ => None,
        };

        match alias {
            Some(tags) => self.store.put(
                formal,
                Object {
                    tags,
                    fixed: true,
                    value: Value::Ref(actual),
                },
            ),
            None => {
                if !self.store.get(formal)?.fixed {
                    self.store.put(formal, Object::free())?;
                }
                self.copy_value(formal, actual)
            }
        }
    }

    /// Collect trailing arguments into a fresh array bound to `formal`
    fn bind_rest(&mut self, formal: Slot, rest: &[Slot]) -> Result<(), VmError> {
        let array = self.store.new_array(ElementType::Untyped, rest.len())?;
        for (i, &arg) in rest.iter().enumerate() {
            if let Element::Ready(element) = self.store.array_element(array, i as i64)? {
                self.copy_value(element, arg)?;
            }
        }
        if !self.store.get(formal)?.fixed {
            self.store.put(formal, Object::free())?;
        }
        self.store.set_array(formal, array)
    }
}
