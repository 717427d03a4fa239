//! Object heaps
//!
//! All storage the VM touches lives in one [`Store`]: a growable list of
//! heaps addressed by [`HeapId`]. Module heaps, array storage and class
//! instances are all heaps; a reference is a plain [`Slot`] handle into one.
//!
//! Reads go through [`Store::origin`], which follows reference tags until it
//! reaches a value. Writes go through [`Store::writable`], which follows
//! mutable references only and refuses to cross a const one.

use crate::config::DEFAULT_MAX_OBJECT_LEN;
use crate::error::{VmError, Warning};
use crate::value::{convert_numeric, tag, ArrayRef, HeapId, Object, Slot, Value};
use tracing::{trace, warn};

/// Longest reference chain followed before it is treated as a cycle
pub const MAX_REFERENCE_DEPTH: usize = 4096;

/// Element type of an array heap
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// Elements are free slots
    Untyped,
    /// Elements are declared with these tags
    Tags(Vec<u8>),
    /// Elements are instances of this class, constructed on first access
    Class(String),
}

/// What a heap is used for
#[derive(Debug, Clone, PartialEq)]
pub enum HeapKind {
    /// Heap instantiated from a module's heap template
    Module,
    /// Array storage: `[count, elements...]`
    Array(ElementType),
    /// Class instance: `[class name, members...]`
    Instance,
    /// Host scratch slots
    Scratch,
}

/// One index-addressed heap
#[derive(Debug, Clone)]
pub struct Heap {
    pub kind: HeapKind,
    pub objects: Vec<Object>,
}

/// State of an array element after [`Store::array_element`]
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Ready to use
    Ready(Slot),
    /// Fresh class element; the caller must construct an instance into it
    Construct { slot: Slot, class: String },
}

/// Every heap owned by one VM
#[derive(Debug)]
pub struct Store {
    heaps: Vec<Heap>,
    warnings: Vec<Warning>,
    /// Largest array element count a program may allocate
    max_len: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_max_len(DEFAULT_MAX_OBJECT_LEN)
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            heaps: Vec::new(),
            warnings: Vec::new(),
            max_len,
        }
    }

    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Add a heap and return its id
    pub fn alloc(&mut self, kind: HeapKind, objects: Vec<Object>) -> HeapId {
        let id = HeapId(self.heaps.len());
        trace!(heap = id.0, len = objects.len(), ?kind, "alloc heap");
        self.heaps.push(Heap { kind, objects });
        id
    }

    pub fn heap(&self, id: HeapId) -> Result<&Heap, VmError> {
        self.heaps.get(id.0).ok_or(VmError::SlotOutOfRange {
            heap: id.0,
            index: 0,
            len: 0,
        })
    }

    fn heap_mut(&mut self, id: HeapId) -> Result<&mut Heap, VmError> {
        self.heaps.get_mut(id.0).ok_or(VmError::SlotOutOfRange {
            heap: id.0,
            index: 0,
            len: 0,
        })
    }

    pub fn heap_len(&self, id: HeapId) -> Result<usize, VmError> {
        Ok(self.heap(id)?.objects.len())
    }

    /// Append a slot to a heap
    pub fn push(&mut self, id: HeapId, object: Object) -> Result<Slot, VmError> {
        let heap = self.heap_mut(id)?;
        heap.objects.push(object);
        Ok(Slot::new(id, heap.objects.len() - 1))
    }

    /// Grow a heap with free slots so that `len` slots exist
    pub fn ensure_len(&mut self, id: HeapId, len: usize) -> Result<(), VmError> {
        let heap = self.heap_mut(id)?;
        if heap.objects.len() < len {
            heap.objects.resize_with(len, Object::free);
        }
        Ok(())
    }

    /// Raw slot, no reference following
    pub fn get(&self, slot: Slot) -> Result<&Object, VmError> {
        let heap = self.heap(slot.heap)?;
        heap.objects.get(slot.index).ok_or(VmError::SlotOutOfRange {
            heap: slot.heap.0,
            index: slot.index,
            len: heap.objects.len(),
        })
    }

    pub fn get_mut(&mut self, slot: Slot) -> Result<&mut Object, VmError> {
        let heap = self.heap_mut(slot.heap)?;
        let len = heap.objects.len();
        heap.objects.get_mut(slot.index).ok_or(VmError::SlotOutOfRange {
            heap: slot.heap.0,
            index: slot.index,
            len,
        })
    }

    /// Replace a slot wholesale
    pub fn put(&mut self, slot: Slot, object: Object) -> Result<(), VmError> {
        *self.get_mut(slot)? = object;
        Ok(())
    }

    // ===== Warnings =====

    /// Record a recoverable warning
    pub fn warn(&mut self, warning: Warning) {
        warn!(%warning, "recoverable");
        self.warnings.push(warning);
    }

    /// Drain recorded warnings
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    // ===== Reference resolution =====

    /// Follow references from `slot` to the slot holding the value
    pub fn origin(&self, slot: Slot) -> Result<Slot, VmError> {
        let mut current = slot;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let object = self.get(current)?;
            if !object.is_reference() {
                return Ok(current);
            }
            match object.value {
                Value::Ref(next) => current = next,
                _ => return Err(VmError::UnboundReference(current.index)),
            }
        }
        Err(VmError::ReferenceCycle(slot.index))
    }

    /// Value at the end of the reference chain
    pub fn origin_object(&self, slot: Slot) -> Result<&Object, VmError> {
        let origin = self.origin(slot)?;
        self.get(origin)
    }

    pub fn value(&self, slot: Slot) -> Result<Value, VmError> {
        Ok(self.origin_object(slot)?.value.clone())
    }

    pub fn origin_tag(&self, slot: Slot) -> Result<u8, VmError> {
        Ok(self.origin_object(slot)?.tag())
    }

    /// Follow mutable references from `slot` to the slot a write lands in.
    ///
    /// A const reference anywhere on the way is fatal. A plain slot is its own
    /// target; it is never turned into a reference here.
    pub fn writable(&self, slot: Slot) -> Result<Slot, VmError> {
        let mut current = slot;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let object = self.get(current)?;
            match object.tag() {
                tag::CONST => return Err(VmError::ConstViolation(current.index)),
                tag::REF => match object.value {
                    Value::Ref(next) => current = next,
                    _ => return Err(VmError::UnboundReference(current.index)),
                },
                _ => return Ok(current),
            }
        }
        Err(VmError::ReferenceCycle(slot.index))
    }

    /// Bind `slot` as a mutable reference to `target`.
    ///
    /// An untyped slot becomes `[0x07, 0x00]`. A declared reference keeps its
    /// declared referent type, and rebinding it to a value of another type is
    /// fatal.
    pub fn set_reference(&mut self, slot: Slot, target: Slot) -> Result<(), VmError> {
        self.bind(slot, target, tag::REF)
    }

    /// Bind `slot` as a const alias of `target`. Rebinding a bound const is
    /// fatal.
    pub fn set_const(&mut self, slot: Slot, target: Slot) -> Result<(), VmError> {
        self.bind(slot, target, tag::CONST)
    }

    fn bind(&mut self, slot: Slot, target: Slot, kind: u8) -> Result<(), VmError> {
        if slot == target {
            return Err(VmError::ReferenceCycle(slot.index));
        }
        let referent = self.origin(target)?;
        if referent == slot {
            return Err(VmError::ReferenceCycle(slot.index));
        }
        let referent_tag = self.get(referent)?.tag();

        let object = self.get(slot)?;
        let tags = match object.tag() {
            tag::CONST if matches!(object.value, Value::Ref(_)) => {
                return Err(VmError::ConstViolation(slot.index))
            }
            tag::CONST if kind == tag::REF => return Err(VmError::ConstViolation(slot.index)),
            tag::REF | tag::CONST => {
                let declared = object.inner_tags().first().copied().unwrap_or(tag::NONE);
                check_referent(declared, referent_tag)?;
                if kind == tag::CONST && object.tag() == tag::REF {
                    // a mutable reference slot re-bound as const
                    let mut tags = object.tags.clone();
                    tags[0] = tag::CONST;
                    tags
                } else {
                    object.tags.clone()
                }
            }
            _ if object.fixed => return Err(VmError::NotAReference(slot.index)),
            _ => vec![kind, tag::NONE],
        };

        trace!(slot = slot.index, target = target.index, kind, "bind reference");
        let fixed = self.get(slot)?.fixed;
        self.put(
            slot,
            Object {
                tags,
                fixed,
                value: Value::Ref(target),
            },
        )
    }

    // ===== Writes =====

    /// Store a value through the writable chain of `slot`.
    ///
    /// Untyped targets take on the value's type. A declared numeric target
    /// converts the value into its declared type, warning when that loses
    /// information. Any other type change of a declared target is fatal.
    pub fn set_value(&mut self, slot: Slot, value: Value) -> Result<(), VmError> {
        if let Value::Ref(target) = value {
            return self.set_reference(slot, target);
        }
        let target = self.writable(slot)?;
        let object = self.get(target)?;

        if !object.fixed {
            return self.put(target, Object::with_value(value));
        }

        let declared = object.tag();
        if declared == value.tag() {
            self.get_mut(target)?.value = value;
            return Ok(());
        }

        if tag::is_numeric(declared) {
            if let Some((converted, lossy)) = convert_numeric(&value, declared) {
                if lossy {
                    self.warn(Warning::LossyConversion {
                        from: value.tag(),
                        to: declared,
                    });
                }
                self.get_mut(target)?.value = converted;
                return Ok(());
            }
        }

        Err(VmError::type_error(
            "store",
            tag::name(declared),
            value.type_name(),
        ))
    }

    pub fn set_byte(&mut self, slot: Slot, v: i8) -> Result<(), VmError> {
        self.set_value(slot, Value::Byte(v))
    }

    pub fn set_long(&mut self, slot: Slot, v: i64) -> Result<(), VmError> {
        self.set_value(slot, Value::Long(v))
    }

    pub fn set_double(&mut self, slot: Slot, v: f64) -> Result<(), VmError> {
        self.set_value(slot, Value::Double(v))
    }

    pub fn set_u64(&mut self, slot: Slot, v: u64) -> Result<(), VmError> {
        self.set_value(slot, Value::U64(v))
    }

    pub fn set_string(&mut self, slot: Slot, v: impl Into<String>) -> Result<(), VmError> {
        self.set_value(slot, Value::Str(v.into()))
    }

    pub fn set_array(&mut self, slot: Slot, array: ArrayRef) -> Result<(), VmError> {
        self.set_value(slot, Value::Array(array))
    }

    pub fn set_instance(&mut self, slot: Slot, instance: HeapId) -> Result<(), VmError> {
        self.set_value(slot, Value::Instance(instance))
    }

    // ===== Typed reads =====

    /// Read a numeric slot as `to`, converting across numeric tags
    fn numeric(&mut self, slot: Slot, to: u8, operation: &str) -> Result<Value, VmError> {
        let value = self.value(slot)?;
        match convert_numeric(&value, to) {
            Some((converted, lossy)) => {
                if lossy {
                    self.warn(Warning::LossyConversion {
                        from: value.tag(),
                        to,
                    });
                }
                Ok(converted)
            }
            None => Err(VmError::type_error(operation, "number", value.type_name())),
        }
    }

    pub fn get_byte(&mut self, slot: Slot) -> Result<i8, VmError> {
        match self.numeric(slot, tag::BYTE, "read byte")? {
            Value::Byte(v) => Ok(v),
            other => Err(VmError::type_error("read byte", "byte", other.type_name())),
        }
    }

    pub fn get_long(&mut self, slot: Slot) -> Result<i64, VmError> {
        match self.numeric(slot, tag::LONG, "read long")? {
            Value::Long(v) => Ok(v),
            other => Err(VmError::type_error("read long", "long", other.type_name())),
        }
    }

    pub fn get_double(&mut self, slot: Slot) -> Result<f64, VmError> {
        match self.numeric(slot, tag::DOUBLE, "read double")? {
            Value::Double(v) => Ok(v),
            other => Err(VmError::type_error("read double", "double", other.type_name())),
        }
    }

    pub fn get_u64(&mut self, slot: Slot) -> Result<u64, VmError> {
        match self.numeric(slot, tag::U64, "read uint64")? {
            Value::U64(v) => Ok(v),
            other => Err(VmError::type_error("read uint64", "uint64", other.type_name())),
        }
    }

    pub fn get_string(&self, slot: Slot) -> Result<String, VmError> {
        match self.value(slot)? {
            Value::Str(s) => Ok(s),
            other => Err(VmError::type_error("read string", "string", other.type_name())),
        }
    }

    pub fn get_array(&self, slot: Slot) -> Result<ArrayRef, VmError> {
        match self.value(slot)? {
            Value::Array(a) => Ok(a),
            other => Err(VmError::type_error("read array", "array", other.type_name())),
        }
    }

    pub fn get_instance(&self, slot: Slot) -> Result<HeapId, VmError> {
        match self.value(slot)? {
            Value::Instance(h) => Ok(h),
            other => Err(VmError::type_error("read object", "object", other.type_name())),
        }
    }

    // ===== Arrays =====

    /// Allocate array storage with `len` elements
    pub fn new_array(&mut self, element: ElementType, len: usize) -> Result<ArrayRef, VmError> {
        self.check_len(len as u64)?;
        let mut objects = Vec::with_capacity(len + 1);
        objects.push(Object::declared(vec![tag::U64]));
        objects[0].value = Value::U64(len as u64);
        objects.extend((0..len).map(|_| fresh_element(&element)));
        let storage = self.alloc(HeapKind::Array(element), objects);
        Ok(ArrayRef { storage, offset: 0 })
    }

    fn check_len(&self, requested: u64) -> Result<(), VmError> {
        if requested > self.max_len as u64 {
            return Err(VmError::AllocationLimit {
                what: "array",
                requested,
                limit: self.max_len,
            });
        }
        Ok(())
    }

    /// Number of elements in array storage, as recorded in its slot 0.
    /// Storage may hold more slots than this after growth.
    pub fn array_len(&self, storage: HeapId) -> Result<usize, VmError> {
        match self.get(Slot::new(storage, 0))?.value {
            Value::U64(len) => usize::try_from(len).map_err(|_| VmError::InvalidIndex(i64::MAX)),
            ref other => Err(VmError::type_error("array length", "uint64", other.type_name())),
        }
    }

    /// Slot of element `index` of `array` if it lies within the array's
    /// length. Nothing is established or grown.
    pub fn peek_element(&self, array: ArrayRef, index: i64) -> Result<Option<Slot>, VmError> {
        let position = element_position(array, index)?;
        if position >= self.array_len(array.storage)? {
            return Ok(None);
        }
        Ok(Some(Slot::new(array.storage, position + 1)))
    }

    /// Slot of element `index` of `array`, growing the storage when needed.
    ///
    /// Growth keeps every existing element in place and adds roughly one
    /// eighth of slack. Elements are established from the array's element
    /// type the first time they are reached.
    pub fn array_element(&mut self, array: ArrayRef, index: i64) -> Result<Element, VmError> {
        let position = element_position(array, index)?;
        let wanted = position.checked_add(1).ok_or(VmError::InvalidIndex(index))?;
        let len = self.array_len(array.storage)?;
        if wanted > len {
            self.check_len(wanted as u64)?;
        }
        let max_len = self.max_len;

        let heap = self.heap_mut(array.storage)?;
        let element = match &heap.kind {
            HeapKind::Array(element) => element.clone(),
            _ => {
                return Err(VmError::type_error(
                    "array access",
                    "array storage",
                    "heap",
                ))
            }
        };

        let capacity = heap.objects.len() - 1;
        if wanted > capacity {
            let grown = wanted.saturating_add(wanted / 8).min(max_len);
            trace!(storage = array.storage.0, from = capacity, to = grown, "grow array");
            heap.objects
                .resize_with(grown + 1, || fresh_element(&element));
        }
        if wanted > len {
            heap.objects[0].value = Value::U64(wanted as u64);
        }

        let slot = Slot::new(array.storage, position + 1);
        let object = &mut heap.objects[position + 1];
        if object.is_established() {
            return Ok(Element::Ready(slot));
        }
        match element {
            ElementType::Class(class) => {
                *object = Object::declared(vec![tag::OBJECT]);
                Ok(Element::Construct { slot, class })
            }
            ElementType::Tags(tags) => {
                *object = Object::declared(tags);
                Ok(Element::Ready(slot))
            }
            ElementType::Untyped => {
                *object = Object::free();
                Ok(Element::Ready(slot))
            }
        }
    }
}

/// Storage position of element `index`; negative positions are invalid
fn element_position(array: ArrayRef, index: i64) -> Result<usize, VmError> {
    let position = array
        .offset
        .checked_add(index)
        .filter(|p| *p >= 0)
        .ok_or(VmError::InvalidIndex(index))?;
    usize::try_from(position).map_err(|_| VmError::InvalidIndex(index))
}

/// New element of an array of `element`. Class elements stay unestablished
/// until first access.
fn fresh_element(element: &ElementType) -> Object {
    match element {
        ElementType::Untyped => Object::free(),
        ElementType::Tags(tags) => Object::declared(tags.clone()),
        ElementType::Class(_) => Object::default(),
    }
}

fn check_referent(declared: u8, got: u8) -> Result<(), VmError> {
    if declared == tag::NONE || got == tag::NONE || declared == got {
        Ok(())
    } else {
        Err(VmError::ReferenceTypeMismatch { declared, got })
    }
}
