//! Allocation, array element and member access

use crate::bytecode::{CONSTRUCTOR, START_CLASS};
use crate::error::VmError;
use crate::heap::{Element, ElementType, HeapKind};
use crate::opcode::OpCode;
use crate::registry::{split_qualified, Class};
use crate::value::{tag, HeapId, Slot, Value};
use crate::vm::result::Flow;
use crate::vm::{operands, START_SLOT, VM};
use std::rc::Rc;
use tracing::trace;

impl VM {
    /// Execute NEW, ARRAY and LOAD_MEMBER
    pub(crate) fn execute_objects(&mut self, opcode: OpCode, ops: &[usize]) -> Result<Flow, VmError> {
        let [a, b, c] = operands::<3>(opcode, ops)?;
        match opcode {
            OpCode::New => self.new_object(a, b, c)?,
            OpCode::Array => self.array_access(a, b, c)?,
            OpCode::LoadMember => self.load_member(a, b, c)?,
            _ => unreachable!("Non-object opcode in object handler"),
        }
        Ok(Flow::Next)
    }

    /// `NEW ptr size type`
    ///
    /// `type` names what to allocate:
    /// - operand 0: an untyped array of `size` elements
    /// - `"~file~.!__start"`: the top-level instance of another module,
    ///   loading it on first use
    /// - a class name with `size == 0`: one constructed instance
    /// - a class name with `size > 0`: an array of instances, each constructed
    ///   when first reached
    /// - any other slot: an array whose elements take that slot's type tags
    fn new_object(&mut self, ptr: usize, size: usize, type_operand: usize) -> Result<(), VmError> {
        let ptr = self.slot(ptr)?;
        let size_slot = self.slot(size)?;
        let requested = self.store.get_u64(size_slot)?;
        let size = usize::try_from(requested).map_err(|_| VmError::AllocationLimit {
            what: "array",
            requested,
            limit: self.store.max_len(),
        })?;

        if type_operand == 0 {
            let array = self.store.new_array(ElementType::Untyped, size)?;
            return self.store.set_array(ptr, array);
        }

        let type_slot = self.slot(type_operand)?;
        match self.store.value(type_slot)? {
            Value::Str(name) if name.starts_with('~') && split_qualified(&name)?.1 == START_CLASS => {
                let (file, _) = split_qualified(&name)?;
                let module = self.registry.ensure_file(&mut self.store, file)?;
                self.start_instance(module)?;
                let heap = self.registry.module(module)?.heap;
                self.store.set_reference(ptr, Slot::new(heap, START_SLOT))
            }
            Value::Str(name) if !name.is_empty() => {
                let module = self.current_frame()?.module;
                let qualified = self.registry.module(module)?.qualify(&name);
                let class = self.registry.resolve(&mut self.store, &qualified)?;
                if size == 0 {
                    self.construct(ptr, &class).map(|_| ())
                } else {
                    let element = ElementType::Class(class.name.clone());
                    let array = self.store.new_array(element, size)?;
                    self.store.set_array(ptr, array)
                }
            }
            _ => {
                let tags = self.store.origin_object(type_slot)?.tags.clone();
                let element = match tags.first() {
                    None | Some(&tag::NONE) => ElementType::Untyped,
                    Some(_) => ElementType::Tags(tags),
                };
                let array = self.store.new_array(element, size)?;
                self.store.set_array(ptr, array)
            }
        }
    }

    /// `ARRAY result array index`: bind `result` to the element
    fn array_access(&mut self, result: usize, array: usize, index: usize) -> Result<(), VmError> {
        let result = self.slot(result)?;
        let array = self.store.get_array(self.slot(array)?)?;
        let index_slot = self.slot(index)?;
        let index = self.store.get_long(index_slot)?;

        let slot = match self.store.array_element(array, index)? {
            Element::Ready(slot) => slot,
            Element::Construct { slot, class } => {
                let class = self.registry.resolve(&mut self.store, &class)?;
                self.construct(slot, &class)?;
                slot
            }
        };
        self.store.set_reference(result, slot)
    }

    /// `LOAD_MEMBER result instance name`: bind `result` to a member of an
    /// instance. Instance operand 0 is the receiver of the running method.
    fn load_member(&mut self, result: usize, instance: usize, name: usize) -> Result<(), VmError> {
        let result = self.slot(result)?;
        let instance = self.instance_operand(instance)?;
        let member = self.store.get_string(self.slot(name)?)?;

        let class_name = self.store.get_string(Slot::new(instance, 0))?;
        let class = self.registry.resolve(&mut self.store, &class_name)?;
        let offset = class
            .member_offset(&member)
            .ok_or_else(|| VmError::MemberNotFound {
                class: class_name.clone(),
                member: member.clone(),
            })?;

        self.store.set_reference(result, Slot::new(instance, 1 + offset))
    }

    /// Instance named by an operand; 0 is the receiver of the running method
    pub(crate) fn instance_operand(&self, operand: usize) -> Result<HeapId, VmError> {
        if operand == 0 {
            self.current_frame()?.receiver.ok_or(VmError::NoReceiver)
        } else {
            self.store.get_instance(self.slot(operand)?)
        }
    }

    /// Allocate an instance of `class` into `target` and run its constructor
    pub(crate) fn construct(&mut self, target: Slot, class: &Rc<Class>) -> Result<HeapId, VmError> {
        let instance = self
            .store
            .alloc(HeapKind::Instance, class.instance_template());
        trace!(class = %class.name, instance = instance.0, "construct");
        self.store.set_instance(target, instance)?;
        self.run_constructor(class, instance)?;
        Ok(instance)
    }

    /// Run `@constructor` on `instance` when the class declares one
    pub(crate) fn run_constructor(&mut self, class: &Class, instance: HeapId) -> Result<(), VmError> {
        match class.method(CONSTRUCTOR) {
            Some(constructor) => self.call_implicit(class.module, constructor, instance),
            None => Ok(()),
        }
    }
}
