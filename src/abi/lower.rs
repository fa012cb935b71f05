//! Lowering values into binary canonical ABI format.

use super::buffer::{align_to, write_byte, write_slice, write_u32};
use super::descriptor::TypeDescriptor;
use super::value::Value;
use super::{CanonicalAbiError, LinearMemory};

fn mismatch(expected: &TypeDescriptor, got: &Value) -> CanonicalAbiError {
    CanonicalAbiError::TypeMismatch {
        expected: expected.kind_name().to_string(),
        got: got.kind_name().to_string(),
    }
}

impl TypeDescriptor {
    /// Lower a value to its binary wire representation.
    ///
    /// Variable-length contents (strings and list elements) are allocated in
    /// `memory`; the returned buffer holds the fixed-size part.
    pub fn lower(
        &self,
        value: &Value,
        memory: &mut LinearMemory,
    ) -> Result<Vec<u8>, CanonicalAbiError> {
        let mut buffer = vec![0u8; self.size()];
        self.lower_into(value, &mut buffer, 0, memory)?;
        Ok(buffer)
    }

    /// Lower a value into a buffer at the given offset.
    pub(crate) fn lower_into(
        &self,
        value: &Value,
        buffer: &mut [u8],
        offset: usize,
        memory: &mut LinearMemory,
    ) -> Result<(), CanonicalAbiError> {
        match (self, value) {
            (Self::Bool, Value::Bool(v)) => {
                write_byte(buffer, offset, u8::from(*v))?;
            }
            (Self::U8, Value::U8(v)) => {
                write_byte(buffer, offset, *v)?;
            }
            (Self::S8, Value::S8(v)) => {
                write_byte(buffer, offset, *v as u8)?;
            }
            (Self::U16, Value::U16(v)) => {
                write_slice(buffer, align_to(offset, 2), &v.to_le_bytes())?;
            }
            (Self::S16, Value::S16(v)) => {
                write_slice(buffer, align_to(offset, 2), &v.to_le_bytes())?;
            }
            (Self::U32, Value::U32(v)) => {
                write_slice(buffer, align_to(offset, 4), &v.to_le_bytes())?;
            }
            (Self::S32, Value::S32(v)) => {
                write_slice(buffer, align_to(offset, 4), &v.to_le_bytes())?;
            }
            (Self::U64, Value::U64(v)) => {
                write_slice(buffer, align_to(offset, 8), &v.to_le_bytes())?;
            }
            (Self::S64, Value::S64(v)) => {
                write_slice(buffer, align_to(offset, 8), &v.to_le_bytes())?;
            }
            (Self::F32, Value::F32(v)) => {
                write_slice(buffer, align_to(offset, 4), &v.to_le_bytes())?;
            }
            (Self::F64, Value::F64(v)) => {
                write_slice(buffer, align_to(offset, 8), &v.to_le_bytes())?;
            }
            (Self::Char, Value::Char(c)) => {
                write_slice(buffer, align_to(offset, 4), &(*c as u32).to_le_bytes())?;
            }
            (Self::String, Value::String(s)) => {
                let (ptr, len) = store_string(s, memory);
                let aligned = align_to(offset, 4);
                write_u32(buffer, aligned, ptr)?;
                write_u32(buffer, aligned + 4, len)?;
            }
            (Self::Record(r), Value::Record(fields)) => {
                for field in &r.fields {
                    let value = fields
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| CanonicalAbiError::TypeMismatch {
                            expected: format!("record field '{}'", field.name),
                            got: "missing field".to_string(),
                        })?;
                    field
                        .ty
                        .lower_into(value, buffer, offset + field.offset, memory)?;
                }
            }
            (Self::Tuple(t), Value::Tuple(elements)) => {
                if elements.len() != t.types.len() {
                    return Err(CanonicalAbiError::TypeMismatch {
                        expected: format!("tuple of {} elements", t.types.len()),
                        got: format!("tuple of {} elements", elements.len()),
                    });
                }
                for ((ty, elem_offset), element) in
                    t.types.iter().zip(&t.offsets).zip(elements)
                {
                    ty.lower_into(element, buffer, offset + elem_offset, memory)?;
                }
            }
            (Self::Variant(v), Value::Variant { case, payload }) => {
                let case_idx = v
                    .cases
                    .iter()
                    .position(|c| c.name == *case)
                    .ok_or_else(|| CanonicalAbiError::UnknownCase { case: case.clone() })?;
                v.tag.write(buffer, offset, case_idx as u32)?;
                let case_def = v.cases.get(case_idx).ok_or_else(|| mismatch(self, value))?;
                match (&case_def.payload, payload) {
                    (Some(payload_ty), Some(payload_val)) => {
                        payload_ty.lower_into(
                            payload_val,
                            buffer,
                            offset + v.payload_offset,
                            memory,
                        )?;
                    }
                    (None, None) => {}
                    _ => return Err(mismatch(self, value)),
                }
            }
            (Self::Enum(e), Value::Enum(case)) => {
                let case_idx = e
                    .case_index(case)
                    .ok_or_else(|| CanonicalAbiError::UnknownCase { case: case.clone() })?;
                e.tag.write(buffer, offset, case_idx as u32)?;
            }
            (Self::Flags(f), Value::Flags(words)) => {
                let aligned = align_to(offset, 4);
                for i in 0..f.words() {
                    // Words beyond the value's capacity lower as zero;
                    // words the value carries are preserved verbatim.
                    let word = words.get(i).copied().unwrap_or(0);
                    write_u32(buffer, aligned + i * 4, word)?;
                }
            }
            (Self::Option(o), Value::Option(opt)) => match opt {
                Some(inner) => {
                    write_byte(buffer, offset, 1)?;
                    o.payload
                        .lower_into(inner, buffer, offset + o.payload_offset, memory)?;
                }
                None => {
                    write_byte(buffer, offset, 0)?;
                }
            },
            (Self::Result(r), Value::Result(res)) => {
                let (tag, payload_ty, payload) = match res {
                    Ok(v) => (0u8, &r.ok, v),
                    Err(v) => (1u8, &r.err, v),
                };
                write_byte(buffer, offset, tag)?;
                match (payload_ty, payload) {
                    (Some(ty), Some(val)) => {
                        ty.lower_into(val, buffer, offset + r.payload_offset, memory)?;
                    }
                    (None, None) => {}
                    _ => return Err(mismatch(self, value)),
                }
            }
            (Self::List(l), Value::List(elements)) => {
                let (ptr, len) = store_list(&l.element, elements, memory)?;
                let aligned = align_to(offset, 4);
                write_u32(buffer, aligned, ptr)?;
                write_u32(buffer, aligned + 4, len)?;
            }
            (Self::Own(_), Value::Own(handle)) => {
                write_u32(buffer, align_to(offset, 4), *handle)?;
            }
            (Self::Borrow(_), Value::Borrow(handle)) => {
                write_u32(buffer, align_to(offset, 4), *handle)?;
            }
            (expected, got) => return Err(mismatch(expected, got)),
        }
        Ok(())
    }
}

/// Copy UTF-8 string bytes into linear memory, returning (ptr, byte length).
pub(crate) fn store_string(s: &str, memory: &mut LinearMemory) -> (u32, u32) {
    let ptr = memory.alloc(s.len(), 1);
    memory.write(ptr, s.as_bytes());
    (ptr, s.len() as u32)
}

/// Lower list elements into linear memory, returning (ptr, element count).
pub(crate) fn store_list(
    element: &TypeDescriptor,
    values: &[Value],
    memory: &mut LinearMemory,
) -> Result<(u32, u32), CanonicalAbiError> {
    // Byte lists bypass per-element lowering.
    if matches!(element, TypeDescriptor::U8) {
        let mut bytes = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Value::U8(b) => bytes.push(*b),
                other => return Err(mismatch(element, other)),
            }
        }
        let ptr = memory.alloc(bytes.len(), 1);
        memory.write(ptr, &bytes);
        return Ok((ptr, bytes.len() as u32));
    }

    let elem_size = element.size();
    // Mirrors the lifting side: zero-size elements carry no payload the
    // decoder could validate a length against, so only the empty list
    // crosses the boundary.
    if elem_size == 0 && !values.is_empty() {
        return Err(CanonicalAbiError::ListTooLong {
            len: values.len() as u64,
            max: 0,
        });
    }
    let ptr = memory.alloc(values.len() * elem_size, element.align());
    let mut elem_buf = vec![0u8; elem_size];
    for (i, value) in values.iter().enumerate() {
        elem_buf.fill(0);
        element.lower_into(value, &mut elem_buf, 0, memory)?;
        memory.write(ptr + (i * elem_size) as u32, &elem_buf);
    }
    Ok((ptr, values.len() as u32))
}
