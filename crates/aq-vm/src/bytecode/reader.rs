//! Module decoding

use super::{ClassDecl, Function, Instruction, Member, Module, MAGIC, VARIADIC_MARKER, VERSION};
use crate::error::VmError;
use crate::opcode::{Arity, OpCode};
use crate::value::{tag, Value};
use tracing::debug;

/// Decode one ULEB128 value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `None` if the input
/// ends inside the value or the value does not fit in 64 bits.
pub fn decode_uleb128(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        let low = (byte & 0x7f) as u64;
        if shift >= 64 || (shift == 63 && low > 1) {
            return None;
        }
        result |= low << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
    }
    None
}

/// Cursor over a module buffer
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn malformed(&self, reason: impl Into<String>) -> VmError {
        VmError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    pub fn u8(&mut self) -> Result<u8, VmError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| self.malformed("unexpected end of input"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], VmError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.malformed(format!("need {} more bytes", len)))?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], VmError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn uleb(&mut self) -> Result<u64, VmError> {
        let (value, used) = decode_uleb128(&self.bytes[self.pos..])
            .ok_or_else(|| self.malformed("bad ULEB128 value"))?;
        self.pos += used;
        Ok(value)
    }

    /// ULEB128 value used as a count or index
    pub fn uleb_usize(&mut self) -> Result<usize, VmError> {
        let value = self.uleb()?;
        usize::try_from(value).map_err(|_| self.malformed("value does not fit in usize"))
    }

    /// NUL-terminated UTF-8 string
    pub fn cstr(&mut self) -> Result<String, VmError> {
        let rest = &self.bytes[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.malformed("unterminated name"))?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|_| self.malformed("name is not UTF-8"))?
            .to_string();
        self.pos += len + 1;
        Ok(text)
    }

    // ===== Module sections =====

    pub fn module(&mut self) -> Result<Module, VmError> {
        self.header()?;
        let constants = self.constants()?;
        let heap = self.heap_template()?;

        let mut classes = Vec::new();
        while !self.is_at_end() {
            classes.push(self.class()?);
        }
        debug!(
            constants = constants.len(),
            slots = heap.len(),
            classes = classes.len(),
            "decoded module"
        );
        Ok(Module {
            constants,
            heap,
            classes,
        })
    }

    fn header(&mut self) -> Result<(), VmError> {
        let magic = self.array::<4>()?;
        if magic != MAGIC {
            return Err(VmError::BadMagic(magic));
        }
        let version = self.array::<4>()?;
        if version != VERSION {
            return Err(VmError::UnsupportedVersion(version));
        }
        Ok(())
    }

    fn constants(&mut self) -> Result<Vec<Value>, VmError> {
        let count = self.uleb_usize()?;
        let mut constants = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            constants.push(self.constant()?);
        }
        Ok(constants)
    }

    /// One tagged constant
    pub fn constant(&mut self) -> Result<Value, VmError> {
        let t = self.u8()?;
        let value = match t {
            tag::BYTE => Value::Byte(self.u8()? as i8),
            tag::LONG => Value::Long(i64::from_be_bytes(self.array::<8>()?)),
            tag::DOUBLE => Value::Double(f64::from_be_bytes(self.array::<8>()?)),
            tag::U64 => Value::U64(u64::from_be_bytes(self.array::<8>()?)),
            tag::STRING => {
                let len = self.uleb_usize()?;
                let raw = self.take(len)?;
                let text = raw.strip_suffix(&[0]).unwrap_or(raw);
                let text = std::str::from_utf8(text)
                    .map_err(|_| self.malformed("string constant is not UTF-8"))?;
                Value::Str(text.to_string())
            }
            other => return Err(VmError::UnknownTypeTag(other)),
        };
        Ok(value)
    }

    fn heap_template(&mut self) -> Result<Vec<Vec<u8>>, VmError> {
        let count = self.uleb_usize()?;
        let mut slots = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            slots.push(self.type_tags()?);
        }
        Ok(slots)
    }

    /// Type-tag sequence: wrapper tags continue, value tags end it
    pub fn type_tags(&mut self) -> Result<Vec<u8>, VmError> {
        let mut tags = Vec::with_capacity(2);
        loop {
            let t = self.u8()?;
            if !tag::is_known(t) {
                return Err(VmError::UnknownTypeTag(t));
            }
            tags.push(t);
            if !tag::is_wrapper(t) {
                return Ok(tags);
            }
        }
    }

    fn class(&mut self) -> Result<ClassDecl, VmError> {
        let name = self.cstr()?;

        let member_count = self.uleb_usize()?;
        let mut members = Vec::with_capacity(member_count.min(self.bytes.len()));
        for _ in 0..member_count {
            let name = self.cstr()?;
            let tags = self.type_tags()?;
            members.push(Member { name, tags });
        }

        let method_count = self.uleb_usize()?;
        let mut methods = Vec::with_capacity(method_count.min(self.bytes.len()));
        for _ in 0..method_count {
            methods.push(self.method()?);
        }

        debug!(class = %name, members = members.len(), methods = methods.len(), "decoded class");
        Ok(ClassDecl {
            name,
            members,
            methods,
        })
    }

    fn method(&mut self) -> Result<Function, VmError> {
        let raw = self.cstr()?;
        let name = raw.strip_prefix('.').unwrap_or(&raw).to_string();

        let variadic = self.peek() == Some(VARIADIC_MARKER);
        if variadic {
            self.pos += 1;
        }

        let param_count = self.uleb_usize()?;
        let mut params = Vec::with_capacity(param_count.min(self.bytes.len()));
        for _ in 0..param_count {
            params.push(self.uleb_usize()?);
        }
        if variadic && params.len() < 2 {
            return Err(self.malformed(format!(
                "variadic method {} has no parameter to collect into",
                name
            )));
        }

        let count = self.uleb_usize()?;
        let mut code = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            code.push(self.instruction()?);
        }

        Ok(Function {
            name,
            variadic,
            params,
            code,
        })
    }

    pub fn instruction(&mut self) -> Result<Instruction, VmError> {
        let byte = self.u8()?;
        let opcode = OpCode::from_u8(byte).ok_or(VmError::InvalidOpcode(byte))?;
        let operands = match opcode.arity() {
            Arity::Fixed(n) => (0..n)
                .map(|_| self.uleb_usize())
                .collect::<Result<Vec<_>, _>>()?,
            Arity::Counted { prefix } => {
                let mut operands = (0..prefix)
                    .map(|_| self.uleb_usize())
                    .collect::<Result<Vec<_>, _>>()?;
                let extra = operands.last().copied().unwrap_or(0);
                for _ in 0..extra {
                    operands.push(self.uleb_usize()?);
                }
                operands
            }
        };
        Ok(Instruction { opcode, operands })
    }
}
