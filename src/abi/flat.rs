//! Flattening values to and from core wire scalars.
//!
//! The raw calling convention passes small values as a sequence of core
//! scalars (i32/i64/f32/f64) instead of through memory. Variants flatten to
//! a discriminant plus the per-slot *join* of every case payload; strings
//! and lists always flatten to their (ptr, len) pair.

use super::descriptor::{TypeDescriptor, TypeRef};
use super::lift::{load_list, load_string};
use super::lower::{store_list, store_string};
use super::value::Value;
use super::{CanonicalAbiError, LinearMemory};

/// A core wire scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    I32,
    I64,
    F32,
    F64,
}

impl WireType {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    fn zero(self) -> WireValue {
        match self {
            Self::I32 => WireValue::I32(0),
            Self::I64 => WireValue::I64(0),
            Self::F32 => WireValue::F32(0.0),
            Self::F64 => WireValue::F64(0.0),
        }
    }
}

/// A core wire scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl WireValue {
    pub fn ty(self) -> WireType {
        match self {
            Self::I32(_) => WireType::I32,
            Self::I64(_) => WireType::I64,
            Self::F32(_) => WireType::F32,
            Self::F64(_) => WireType::F64,
        }
    }
}

/// Sequential reader over flattened core values.
pub struct FlatReader<'a> {
    values: &'a [WireValue],
    pos: usize,
}

impl<'a> FlatReader<'a> {
    pub fn new(values: &'a [WireValue]) -> Self {
        Self { values, pos: 0 }
    }

    pub fn next(&mut self) -> Result<WireValue, CanonicalAbiError> {
        let value = self
            .values
            .get(self.pos)
            .copied()
            .ok_or(CanonicalAbiError::MissingWireValue)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn next_i32(&mut self) -> Result<i32, CanonicalAbiError> {
        expect_i32(self.next()?)
    }

    pub fn remaining(&self) -> usize {
        self.values.len().saturating_sub(self.pos)
    }
}

fn expect_i32(value: WireValue) -> Result<i32, CanonicalAbiError> {
    match value {
        WireValue::I32(v) => Ok(v),
        other => Err(CanonicalAbiError::TypeMismatch {
            expected: "i32".to_string(),
            got: other.ty().name().to_string(),
        }),
    }
}

fn expect_i64(value: WireValue) -> Result<i64, CanonicalAbiError> {
    match value {
        WireValue::I64(v) => Ok(v),
        other => Err(CanonicalAbiError::TypeMismatch {
            expected: "i64".to_string(),
            got: other.ty().name().to_string(),
        }),
    }
}

fn expect_f32(value: WireValue) -> Result<f32, CanonicalAbiError> {
    match value {
        WireValue::F32(v) => Ok(v),
        other => Err(CanonicalAbiError::TypeMismatch {
            expected: "f32".to_string(),
            got: other.ty().name().to_string(),
        }),
    }
}

fn expect_f64(value: WireValue) -> Result<f64, CanonicalAbiError> {
    match value {
        WireValue::F64(v) => Ok(v),
        other => Err(CanonicalAbiError::TypeMismatch {
            expected: "f64".to_string(),
            got: other.ty().name().to_string(),
        }),
    }
}

/// The canonical ABI join of two core types sharing one variant payload slot.
fn join(a: WireType, b: WireType) -> WireType {
    if a == b {
        a
    } else if matches!(
        (a, b),
        (WireType::I32, WireType::F32) | (WireType::F32, WireType::I32)
    ) {
        WireType::I32
    } else {
        WireType::I64
    }
}

/// Per-slot joined flattening of a set of case payloads.
fn joined_payload_types(payloads: &[Option<&TypeRef>]) -> Vec<WireType> {
    let mut joined: Vec<WireType> = Vec::new();
    for payload in payloads.iter().flatten() {
        let mut flat = Vec::new();
        payload.flat_types(&mut flat);
        for (i, ty) in flat.iter().enumerate() {
            match joined.get_mut(i) {
                Some(slot) => *slot = join(*slot, *ty),
                None => joined.push(*ty),
            }
        }
    }
    joined
}

/// Reinterpret a naturally-typed payload value as its joined slot type.
fn coerce(value: WireValue, slot: WireType) -> Result<WireValue, CanonicalAbiError> {
    match (value, slot) {
        (v, s) if v.ty() == s => Ok(v),
        (WireValue::I32(v), WireType::I64) => Ok(WireValue::I64(i64::from(v as u32))),
        (WireValue::F32(v), WireType::I32) => Ok(WireValue::I32(v.to_bits() as i32)),
        (WireValue::F32(v), WireType::I64) => Ok(WireValue::I64(i64::from(v.to_bits()))),
        (WireValue::F64(v), WireType::I64) => Ok(WireValue::I64(v.to_bits() as i64)),
        (v, s) => Err(CanonicalAbiError::TypeMismatch {
            expected: s.name().to_string(),
            got: v.ty().name().to_string(),
        }),
    }
}

/// Inverse of [`coerce`]: recover the naturally-typed value from a slot.
fn decoerce(value: WireValue, natural: WireType) -> Result<WireValue, CanonicalAbiError> {
    match (value, natural) {
        (v, n) if v.ty() == n => Ok(v),
        (WireValue::I64(v), WireType::I32) => Ok(WireValue::I32(v as i32)),
        (WireValue::I32(v), WireType::F32) => Ok(WireValue::F32(f32::from_bits(v as u32))),
        (WireValue::I64(v), WireType::F32) => Ok(WireValue::F32(f32::from_bits(v as u32))),
        (WireValue::I64(v), WireType::F64) => Ok(WireValue::F64(f64::from_bits(v as u64))),
        (v, n) => Err(CanonicalAbiError::TypeMismatch {
            expected: n.name().to_string(),
            got: v.ty().name().to_string(),
        }),
    }
}

impl TypeDescriptor {
    /// Append this type's flattened core types to `out`.
    pub fn flat_types(&self, out: &mut Vec<WireType>) {
        match self {
            Self::Bool
            | Self::U8
            | Self::S8
            | Self::U16
            | Self::S16
            | Self::U32
            | Self::S32
            | Self::Char => out.push(WireType::I32),
            Self::U64 | Self::S64 => out.push(WireType::I64),
            Self::F32 => out.push(WireType::F32),
            Self::F64 => out.push(WireType::F64),
            Self::String | Self::List(_) => {
                out.push(WireType::I32);
                out.push(WireType::I32);
            }
            Self::Record(r) => {
                for field in &r.fields {
                    field.ty.flat_types(out);
                }
            }
            Self::Tuple(t) => {
                for ty in &t.types {
                    ty.flat_types(out);
                }
            }
            Self::Enum(_) => out.push(WireType::I32),
            Self::Flags(f) => {
                for _ in 0..f.words() {
                    out.push(WireType::I32);
                }
            }
            Self::Variant(v) => {
                out.push(WireType::I32);
                let payloads: Vec<Option<&TypeRef>> =
                    v.cases.iter().map(|c| c.payload.as_ref()).collect();
                out.extend(joined_payload_types(&payloads));
            }
            Self::Option(o) => {
                out.push(WireType::I32);
                out.extend(joined_payload_types(&[None, Some(&o.payload)]));
            }
            Self::Result(r) => {
                out.push(WireType::I32);
                out.extend(joined_payload_types(&[r.ok.as_ref(), r.err.as_ref()]));
            }
            Self::Own(_) | Self::Borrow(_) => out.push(WireType::I32),
        }
    }

    /// Number of core values this type flattens to.
    pub fn flat_count(&self) -> usize {
        let mut types = Vec::new();
        self.flat_types(&mut types);
        types.len()
    }

    /// Lower a value into flattened core values.
    pub fn lower_flat(
        &self,
        value: &Value,
        memory: &mut LinearMemory,
        out: &mut Vec<WireValue>,
    ) -> Result<(), CanonicalAbiError> {
        match (self, value) {
            (Self::Bool, Value::Bool(v)) => out.push(WireValue::I32(i32::from(*v))),
            (Self::U8, Value::U8(v)) => out.push(WireValue::I32(i32::from(*v))),
            (Self::S8, Value::S8(v)) => out.push(WireValue::I32(i32::from(*v))),
            (Self::U16, Value::U16(v)) => out.push(WireValue::I32(i32::from(*v))),
            (Self::S16, Value::S16(v)) => out.push(WireValue::I32(i32::from(*v))),
            (Self::U32, Value::U32(v)) => out.push(WireValue::I32(*v as i32)),
            (Self::S32, Value::S32(v)) => out.push(WireValue::I32(*v)),
            (Self::U64, Value::U64(v)) => out.push(WireValue::I64(*v as i64)),
            (Self::S64, Value::S64(v)) => out.push(WireValue::I64(*v)),
            (Self::F32, Value::F32(v)) => out.push(WireValue::F32(*v)),
            (Self::F64, Value::F64(v)) => out.push(WireValue::F64(*v)),
            (Self::Char, Value::Char(c)) => out.push(WireValue::I32(*c as u32 as i32)),
            (Self::String, Value::String(s)) => {
                let (ptr, len) = store_string(s, memory);
                out.push(WireValue::I32(ptr as i32));
                out.push(WireValue::I32(len as i32));
            }
            (Self::List(l), Value::List(elements)) => {
                let (ptr, len) = store_list(&l.element, elements, memory)?;
                out.push(WireValue::I32(ptr as i32));
                out.push(WireValue::I32(len as i32));
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
                    field.ty.lower_flat(value, memory, out)?;
                }
            }
            (Self::Tuple(t), Value::Tuple(elements)) => {
                if elements.len() != t.types.len() {
                    return Err(CanonicalAbiError::TypeMismatch {
                        expected: format!("tuple of {} elements", t.types.len()),
                        got: format!("tuple of {} elements", elements.len()),
                    });
                }
                for (ty, element) in t.types.iter().zip(elements) {
                    ty.lower_flat(element, memory, out)?;
                }
            }
            (Self::Enum(e), Value::Enum(case)) => {
                let idx = e
                    .case_index(case)
                    .ok_or_else(|| CanonicalAbiError::UnknownCase { case: case.clone() })?;
                out.push(WireValue::I32(idx as i32));
            }
            (Self::Flags(f), Value::Flags(words)) => {
                for i in 0..f.words() {
                    let word = words.get(i).copied().unwrap_or(0);
                    out.push(WireValue::I32(word as i32));
                }
            }
            (Self::Variant(v), Value::Variant { case, payload }) => {
                let idx = v
                    .case_index(case)
                    .ok_or_else(|| CanonicalAbiError::UnknownCase { case: case.clone() })?;
                let payloads: Vec<Option<&TypeRef>> =
                    v.cases.iter().map(|c| c.payload.as_ref()).collect();
                let case_ty = v.cases.get(idx).and_then(|c| c.payload.as_deref());
                let pair = match (case_ty, payload.as_deref()) {
                    (Some(ty), Some(val)) => Some((ty, val)),
                    (None, None) => None,
                    _ => {
                        return Err(CanonicalAbiError::TypeMismatch {
                            expected: "variant payload matching the case".to_string(),
                            got: "mismatched payload presence".to_string(),
                        });
                    }
                };
                lower_flat_tagged(idx as u32, pair, &payloads, memory, out)?;
            }
            (Self::Option(o), Value::Option(opt)) => {
                let payloads = [None, Some(&o.payload)];
                match opt {
                    Some(inner) => lower_flat_tagged(
                        1,
                        Some((o.payload.as_ref(), inner.as_ref())),
                        &payloads,
                        memory,
                        out,
                    )?,
                    None => lower_flat_tagged(0, None, &payloads, memory, out)?,
                }
            }
            (Self::Result(r), Value::Result(res)) => {
                let payloads = [r.ok.as_ref(), r.err.as_ref()];
                let (tag, payload_ty, payload) = match res {
                    Ok(v) => (0u32, r.ok.as_deref(), v.as_deref()),
                    Err(v) => (1u32, r.err.as_deref(), v.as_deref()),
                };
                let pair = match (payload_ty, payload) {
                    (Some(ty), Some(val)) => Some((ty, val)),
                    (None, None) => None,
                    _ => {
                        return Err(CanonicalAbiError::TypeMismatch {
                            expected: "result payload matching the declared case".to_string(),
                            got: "mismatched payload presence".to_string(),
                        });
                    }
                };
                lower_flat_tagged(tag, pair, &payloads, memory, out)?;
            }
            (Self::Own(_), Value::Own(handle)) => out.push(WireValue::I32(*handle as i32)),
            (Self::Borrow(_), Value::Borrow(handle)) => out.push(WireValue::I32(*handle as i32)),
            (expected, got) => {
                return Err(CanonicalAbiError::TypeMismatch {
                    expected: expected.kind_name().to_string(),
                    got: got.kind_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Lift a value from flattened core values.
    pub fn lift_flat(
        &self,
        reader: &mut FlatReader<'_>,
        memory: &LinearMemory,
    ) -> Result<Value, CanonicalAbiError> {
        let value = match self {
            Self::Bool => match reader.next_i32()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                v => return Err(CanonicalAbiError::InvalidBool(v as u8)),
            },
            Self::U8 => Value::U8(reader.next_i32()? as u8),
            Self::S8 => Value::S8(reader.next_i32()? as i8),
            Self::U16 => Value::U16(reader.next_i32()? as u16),
            Self::S16 => Value::S16(reader.next_i32()? as i16),
            Self::U32 => Value::U32(reader.next_i32()? as u32),
            Self::S32 => Value::S32(reader.next_i32()?),
            Self::U64 => Value::U64(expect_i64(reader.next()?)? as u64),
            Self::S64 => Value::S64(expect_i64(reader.next()?)?),
            Self::F32 => Value::F32(expect_f32(reader.next()?)?),
            Self::F64 => Value::F64(expect_f64(reader.next()?)?),
            Self::Char => {
                let code = reader.next_i32()? as u32;
                Value::Char(char::from_u32(code).ok_or(CanonicalAbiError::InvalidChar(code))?)
            }
            Self::String => {
                let ptr = reader.next_i32()? as u32;
                let len = reader.next_i32()? as u32;
                Value::String(load_string(memory, ptr, len)?)
            }
            Self::List(l) => {
                let ptr = reader.next_i32()? as u32;
                let len = reader.next_i32()? as u32;
                Value::List(load_list(&l.element, memory, ptr, len)?)
            }
            Self::Record(r) => {
                let mut fields = Vec::with_capacity(r.fields.len());
                for field in &r.fields {
                    fields.push((field.name.clone(), field.ty.lift_flat(reader, memory)?));
                }
                Value::Record(fields)
            }
            Self::Tuple(t) => {
                let mut elements = Vec::with_capacity(t.types.len());
                for ty in &t.types {
                    elements.push(ty.lift_flat(reader, memory)?);
                }
                Value::Tuple(elements)
            }
            Self::Enum(e) => {
                let discriminant = reader.next_i32()? as u32;
                let case = e.cases.get(discriminant as usize).ok_or(
                    CanonicalAbiError::InvalidDiscriminant {
                        discriminant,
                        num_cases: e.cases.len(),
                    },
                )?;
                Value::Enum(case.clone())
            }
            Self::Flags(f) => {
                let mut words = Vec::with_capacity(f.words());
                for _ in 0..f.words() {
                    words.push(reader.next_i32()? as u32);
                }
                Value::Flags(words)
            }
            Self::Variant(v) => {
                let payloads: Vec<Option<&TypeRef>> =
                    v.cases.iter().map(|c| c.payload.as_ref()).collect();
                let (idx, payload) = lift_flat_tagged(reader, memory, &payloads)?;
                let case = v.cases.get(idx).ok_or(CanonicalAbiError::InvalidDiscriminant {
                    discriminant: idx as u32,
                    num_cases: v.cases.len(),
                })?;
                Value::Variant {
                    case: case.name.clone(),
                    payload: payload.map(Box::new),
                }
            }
            Self::Option(o) => {
                let (idx, payload) = lift_flat_tagged(reader, memory, &[None, Some(&o.payload)])?;
                match idx {
                    0 => Value::Option(None),
                    _ => Value::Option(payload.map(Box::new)),
                }
            }
            Self::Result(r) => {
                let (idx, payload) =
                    lift_flat_tagged(reader, memory, &[r.ok.as_ref(), r.err.as_ref()])?;
                match idx {
                    0 => Value::Result(Ok(payload.map(Box::new))),
                    _ => Value::Result(Err(payload.map(Box::new))),
                }
            }
            Self::Own(_) => Value::Own(reader.next_i32()? as u32),
            Self::Borrow(_) => Value::Borrow(reader.next_i32()? as u32),
        };
        Ok(value)
    }
}

fn lower_flat_tagged(
    discriminant: u32,
    payload: Option<(&TypeDescriptor, &Value)>,
    payloads: &[Option<&TypeRef>],
    memory: &mut LinearMemory,
    out: &mut Vec<WireValue>,
) -> Result<(), CanonicalAbiError> {
    out.push(WireValue::I32(discriminant as i32));
    let slots = joined_payload_types(payloads);
    let mut payload_flat = Vec::new();
    if let Some((ty, value)) = payload {
        ty.lower_flat(value, memory, &mut payload_flat)?;
    }
    for (i, slot) in slots.iter().enumerate() {
        match payload_flat.get(i) {
            Some(value) => out.push(coerce(*value, *slot)?),
            None => out.push(slot.zero()),
        }
    }
    Ok(())
}

fn lift_flat_tagged(
    reader: &mut FlatReader<'_>,
    memory: &LinearMemory,
    payloads: &[Option<&TypeRef>],
) -> Result<(usize, Option<Value>), CanonicalAbiError> {
    let discriminant = reader.next_i32()? as u32;
    let slots = joined_payload_types(payloads);
    let mut slot_values = Vec::with_capacity(slots.len());
    for _ in &slots {
        slot_values.push(reader.next()?);
    }

    let case = payloads.get(discriminant as usize).ok_or(
        CanonicalAbiError::InvalidDiscriminant {
            discriminant,
            num_cases: payloads.len(),
        },
    )?;

    let payload = match case {
        Some(ty) => {
            let mut natural_types = Vec::new();
            ty.flat_types(&mut natural_types);
            let mut natural = Vec::with_capacity(natural_types.len());
            for (i, nt) in natural_types.iter().enumerate() {
                let slot_value = slot_values
                    .get(i)
                    .copied()
                    .ok_or(CanonicalAbiError::MissingWireValue)?;
                natural.push(decoerce(slot_value, *nt)?);
            }
            let mut sub = FlatReader::new(&natural);
            Some(ty.lift_flat(&mut sub, memory)?)
        }
        None => None,
    };

    Ok((discriminant as usize, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_follows_canonical_rules() {
        assert_eq!(join(WireType::I32, WireType::I32), WireType::I32);
        assert_eq!(join(WireType::I32, WireType::F32), WireType::I32);
        assert_eq!(join(WireType::F32, WireType::F64), WireType::I64);
        assert_eq!(join(WireType::I32, WireType::I64), WireType::I64);
    }

    #[test]
    fn record_flattens_field_by_field() {
        let ty = TypeDescriptor::record([
            ("a", TypeDescriptor::u8()),
            ("b", TypeDescriptor::u64()),
            ("c", TypeDescriptor::f32()),
        ]);
        let mut types = Vec::new();
        ty.flat_types(&mut types);
        assert_eq!(types, vec![WireType::I32, WireType::I64, WireType::F32]);
    }

    #[test]
    fn variant_slots_join_across_cases() {
        // f32 payload joins with u32 payload into a single i32 slot
        let ty = TypeDescriptor::variant([
            ("num", Some(TypeDescriptor::u32())),
            ("real", Some(TypeDescriptor::f32())),
        ]);
        let mut types = Vec::new();
        ty.flat_types(&mut types);
        assert_eq!(types, vec![WireType::I32, WireType::I32]);
    }

    #[test]
    fn float_payload_roundtrips_through_joined_slot() {
        let ty = TypeDescriptor::variant([
            ("num", Some(TypeDescriptor::u64())),
            ("real", Some(TypeDescriptor::f64())),
        ]);
        let mut memory = LinearMemory::new();
        let value = Value::variant("real", Some(Value::F64(-2.5)));
        let mut flat = Vec::new();
        ty.lower_flat(&value, &mut memory, &mut flat).unwrap();
        assert_eq!(flat.len(), 2);
        let lifted = ty.lift_flat(&mut FlatReader::new(&flat), &memory).unwrap();
        assert_eq!(lifted, value);
    }
}
