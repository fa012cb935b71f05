//! Lifting binary canonical ABI data back into values.

use super::buffer::{align_to, read_array, read_byte, read_u32};
use super::descriptor::TypeDescriptor;
use super::value::Value;
use super::{CanonicalAbiError, LinearMemory};

/// Sanity ceiling on decoded list lengths. A corrupt length field fails
/// fast instead of attempting a multi-gigabyte read.
pub const MAX_LIST_LEN: u32 = 1 << 28;

impl TypeDescriptor {
    /// Lift a value from its binary wire representation.
    ///
    /// `buffer` holds the fixed-size part; variable-length contents are read
    /// from `memory` through (ptr, len) pairs.
    pub fn lift(&self, buffer: &[u8], memory: &LinearMemory) -> Result<Value, CanonicalAbiError> {
        self.lift_from(buffer, 0, memory)
    }

    /// Lift a value from a buffer at the given offset.
    pub(crate) fn lift_from(
        &self,
        buffer: &[u8],
        offset: usize,
        memory: &LinearMemory,
    ) -> Result<Value, CanonicalAbiError> {
        let size = self.size();
        if offset + size > buffer.len() {
            return Err(CanonicalAbiError::BufferTooSmall {
                needed: offset + size,
                available: buffer.len(),
            });
        }

        let value = match self {
            Self::Bool => match read_byte(buffer, offset)? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                v => return Err(CanonicalAbiError::InvalidBool(v)),
            },
            Self::U8 => Value::U8(read_byte(buffer, offset)?),
            Self::S8 => Value::S8(read_byte(buffer, offset)? as i8),
            Self::U16 => Value::U16(u16::from_le_bytes(read_array(buffer, align_to(offset, 2))?)),
            Self::S16 => Value::S16(i16::from_le_bytes(read_array(buffer, align_to(offset, 2))?)),
            Self::U32 => Value::U32(u32::from_le_bytes(read_array(buffer, align_to(offset, 4))?)),
            Self::S32 => Value::S32(i32::from_le_bytes(read_array(buffer, align_to(offset, 4))?)),
            Self::U64 => Value::U64(u64::from_le_bytes(read_array(buffer, align_to(offset, 8))?)),
            Self::S64 => Value::S64(i64::from_le_bytes(read_array(buffer, align_to(offset, 8))?)),
            Self::F32 => Value::F32(f32::from_le_bytes(read_array(buffer, align_to(offset, 4))?)),
            Self::F64 => Value::F64(f64::from_le_bytes(read_array(buffer, align_to(offset, 8))?)),
            Self::Char => {
                let code = u32::from_le_bytes(read_array(buffer, align_to(offset, 4))?);
                let c = char::from_u32(code).ok_or(CanonicalAbiError::InvalidChar(code))?;
                Value::Char(c)
            }
            Self::String => {
                let aligned = align_to(offset, 4);
                let ptr = read_u32(buffer, aligned)?;
                let len = read_u32(buffer, aligned + 4)?;
                Value::String(load_string(memory, ptr, len)?)
            }
            Self::Record(r) => {
                let mut fields = Vec::with_capacity(r.fields.len());
                for field in &r.fields {
                    let value = field.ty.lift_from(buffer, offset + field.offset, memory)?;
                    fields.push((field.name.clone(), value));
                }
                Value::Record(fields)
            }
            Self::Tuple(t) => {
                let mut elements = Vec::with_capacity(t.types.len());
                for (ty, elem_offset) in t.types.iter().zip(&t.offsets) {
                    elements.push(ty.lift_from(buffer, offset + elem_offset, memory)?);
                }
                Value::Tuple(elements)
            }
            Self::Variant(v) => {
                let discriminant = v.tag.read(buffer, offset)?;
                let case = v.cases.get(discriminant as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant,
                        num_cases: v.cases.len(),
                    },
                )?;
                let payload = match &case.payload {
                    Some(payload_ty) => Some(Box::new(payload_ty.lift_from(
                        buffer,
                        offset + v.payload_offset,
                        memory,
                    )?)),
                    None => None,
                };
                Value::Variant {
                    case: case.name.clone(),
                    payload,
                }
            }
            Self::Enum(e) => {
                let discriminant = e.tag.read(buffer, offset)?;
                let case = e.cases.get(discriminant as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant,
                        num_cases: e.cases.len(),
                    },
                )?;
                Value::Enum(case.clone())
            }
            Self::Flags(f) => {
                let aligned = align_to(offset, 4);
                let mut words = Vec::with_capacity(f.words());
                for i in 0..f.words() {
                    words.push(read_u32(buffer, aligned + i * 4)?);
                }
                Value::Flags(words)
            }
            Self::Option(o) => match read_byte(buffer, offset)? {
                0 => Value::Option(None),
                1 => {
                    let inner = o
                        .payload
                        .lift_from(buffer, offset + o.payload_offset, memory)?;
                    Value::Option(Some(Box::new(inner)))
                }
                v => {
                    return Err(CanonicalAbiError::InvalidDiscriminant {
                        discriminant: v as u32,
                        num_cases: 2,
                    });
                }
            },
            Self::Result(r) => {
                let discriminant = read_byte(buffer, offset)?;
                let (payload_ty, is_ok) = match discriminant {
                    0 => (&r.ok, true),
                    1 => (&r.err, false),
                    v => {
                        return Err(CanonicalAbiError::InvalidDiscriminant {
                            discriminant: v as u32,
                            num_cases: 2,
                        });
                    }
                };
                let payload = match payload_ty {
                    Some(ty) => Some(Box::new(ty.lift_from(
                        buffer,
                        offset + r.payload_offset,
                        memory,
                    )?)),
                    None => None,
                };
                Value::Result(if is_ok { Ok(payload) } else { Err(payload) })
            }
            Self::List(l) => {
                let aligned = align_to(offset, 4);
                let ptr = read_u32(buffer, aligned)?;
                let len = read_u32(buffer, aligned + 4)?;
                Value::List(load_list(&l.element, memory, ptr, len)?)
            }
            Self::Own(_) => Value::Own(read_u32(buffer, align_to(offset, 4))?),
            Self::Borrow(_) => Value::Borrow(read_u32(buffer, align_to(offset, 4))?),
        };

        Ok(value)
    }
}

/// Read and validate UTF-8 string contents from linear memory.
pub(crate) fn load_string(
    memory: &LinearMemory,
    ptr: u32,
    len: u32,
) -> Result<String, CanonicalAbiError> {
    let bytes = memory.read(ptr, len)?;
    let s = std::str::from_utf8(bytes).map_err(|_| CanonicalAbiError::InvalidUtf8)?;
    Ok(s.to_string())
}

/// Lift list elements from linear memory.
pub(crate) fn load_list(
    element: &TypeDescriptor,
    memory: &LinearMemory,
    ptr: u32,
    len: u32,
) -> Result<Vec<Value>, CanonicalAbiError> {
    if len > MAX_LIST_LEN {
        return Err(CanonicalAbiError::ListTooLong {
            len: len as u64,
            max: MAX_LIST_LEN as u64,
        });
    }

    // Zero-size elements occupy no memory, so no length can be checked
    // against the buffer; only the empty list is representable.
    let elem_size = element.size();
    if elem_size == 0 && len > 0 {
        return Err(CanonicalAbiError::ListTooLong {
            len: len as u64,
            max: 0,
        });
    }
    let total = (len as usize)
        .checked_mul(elem_size)
        .ok_or(CanonicalAbiError::ListTooLong {
            len: len as u64,
            max: MAX_LIST_LEN as u64,
        })?;
    if (ptr as usize).saturating_add(total) > memory.len() {
        return Err(CanonicalAbiError::OutOfBounds {
            ptr,
            len: total as u32,
            memory_size: memory.len(),
        });
    }

    // Byte lists bypass per-element lifting.
    if matches!(element, TypeDescriptor::U8) {
        let bytes = memory.read(ptr, len)?;
        return Ok(bytes.iter().copied().map(Value::U8).collect());
    }

    let mut elements = Vec::with_capacity(len as usize);
    for i in 0..len as usize {
        let elem_offset = ptr as usize + i * elem_size;
        elements.push(element.lift_from(memory.as_bytes(), elem_offset, memory)?);
    }
    Ok(elements)
}
