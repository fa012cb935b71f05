//! The type descriptor graph.
//!
//! Descriptors declare the canonical ABI wire layout of a value: flattened
//! size, alignment, field offsets, and discriminant widths. They are built
//! once per interface by generated bindings and shared by reference
//! ([`TypeRef`]); size and alignment are computed at construction and never
//! recomputed at call time.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::buffer::{align_to, read_array, write_byte, write_slice};
use super::CanonicalAbiError;
use crate::resource::ResourceTypeId;

/// A shared, immutable type descriptor.
pub type TypeRef = Arc<TypeDescriptor>;

/// Cached wire size and alignment of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

/// Discriminant width: the minimal unsigned integer that distinguishes all
/// cases of a variant or enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminant {
    U8,
    U16,
    U32,
}

impl Discriminant {
    pub fn for_case_count(cases: usize) -> Self {
        if cases <= 1 << 8 {
            Self::U8
        } else if cases <= 1 << 16 {
            Self::U16
        } else {
            Self::U32
        }
    }

    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    pub const fn align(self) -> usize {
        self.size()
    }

    pub(crate) fn write(
        self,
        buffer: &mut [u8],
        offset: usize,
        value: u32,
    ) -> Result<(), CanonicalAbiError> {
        match self {
            Self::U8 => write_byte(buffer, offset, value as u8),
            Self::U16 => {
                let aligned = align_to(offset, 2);
                write_slice(buffer, aligned, &(value as u16).to_le_bytes())
            }
            Self::U32 => {
                let aligned = align_to(offset, 4);
                write_slice(buffer, aligned, &value.to_le_bytes())
            }
        }
    }

    pub(crate) fn read(self, buffer: &[u8], offset: usize) -> Result<u32, CanonicalAbiError> {
        match self {
            Self::U8 => Ok(super::buffer::read_byte(buffer, offset)? as u32),
            Self::U16 => {
                let bytes: [u8; 2] = read_array(buffer, align_to(offset, 2))?;
                Ok(u16::from_le_bytes(bytes) as u32)
            }
            Self::U32 => {
                let bytes: [u8; 4] = read_array(buffer, align_to(offset, 4))?;
                Ok(u32::from_le_bytes(bytes))
            }
        }
    }
}

/// A named record field with its precomputed wire offset.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub(crate) offset: usize,
}

#[derive(Debug)]
pub struct RecordType {
    pub fields: Vec<Field>,
    layout: Layout,
}

#[derive(Debug)]
pub struct TupleType {
    pub types: Vec<TypeRef>,
    pub(crate) offsets: Vec<usize>,
    layout: Layout,
}

#[derive(Debug)]
pub struct VariantCase {
    pub name: String,
    pub payload: Option<TypeRef>,
}

#[derive(Debug)]
pub struct VariantType {
    pub cases: Vec<VariantCase>,
    pub(crate) tag: Discriminant,
    pub(crate) payload_offset: usize,
    layout: Layout,
}

impl VariantType {
    pub fn case_index(&self, name: &str) -> Option<usize> {
        self.cases.iter().position(|c| c.name == name)
    }
}

#[derive(Debug)]
pub struct EnumType {
    pub cases: Vec<String>,
    pub(crate) tag: Discriminant,
}

impl EnumType {
    pub fn case_index(&self, name: &str) -> Option<usize> {
        self.cases.iter().position(|c| c == name)
    }
}

#[derive(Debug)]
pub struct FlagsType {
    pub names: Vec<String>,
    pub(crate) words: usize,
}

impl FlagsType {
    /// Bit position of a named flag.
    pub fn bit(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Number of 32-bit words covering the named bits.
    pub fn words(&self) -> usize {
        self.words
    }
}

#[derive(Debug)]
pub struct OptionType {
    pub payload: TypeRef,
    pub(crate) payload_offset: usize,
    layout: Layout,
}

#[derive(Debug)]
pub struct ResultType {
    pub ok: Option<TypeRef>,
    pub err: Option<TypeRef>,
    pub(crate) payload_offset: usize,
    layout: Layout,
}

#[derive(Debug)]
pub struct ListType {
    pub element: TypeRef,
}

/// A canonical ABI type descriptor.
///
/// The set of variants is closed: every ABI type is an explicit case, and
/// adding one is a compile-time-checked exhaustive match everywhere.
#[derive(Debug)]
pub enum TypeDescriptor {
    Bool,
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    F32,
    F64,
    Char,
    String,
    Record(RecordType),
    Variant(VariantType),
    Enum(EnumType),
    Flags(FlagsType),
    Option(OptionType),
    Result(ResultType),
    List(ListType),
    Tuple(TupleType),
    Own(ResourceTypeId),
    Borrow(ResourceTypeId),
}

fn sequence_layout(types: &[TypeRef]) -> (Vec<usize>, Layout) {
    let mut offsets = Vec::with_capacity(types.len());
    let mut offset = 0usize;
    let mut align = 1usize;
    for ty in types {
        let field_align = ty.align();
        align = align.max(field_align);
        offset = align_to(offset, field_align);
        offsets.push(offset);
        offset += ty.size();
    }
    (
        offsets,
        Layout {
            size: align_to(offset, align),
            align,
        },
    )
}

fn tagged_layout(tag: Discriminant, payloads: &[Option<&TypeRef>]) -> (usize, Layout) {
    let mut payload_align = 1usize;
    let mut payload_size = 0usize;
    for payload in payloads.iter().flatten() {
        payload_align = payload_align.max(payload.align());
        payload_size = payload_size.max(payload.size());
    }
    let align = tag.align().max(payload_align);
    let payload_offset = align_to(tag.size(), payload_align);
    let size = align_to(payload_offset + payload_size, align);
    (payload_offset, Layout { size, align })
}

impl TypeDescriptor {
    // Scalar constructors, each returning a fresh shared reference.

    pub fn bool() -> TypeRef {
        Arc::new(Self::Bool)
    }
    pub fn u8() -> TypeRef {
        Arc::new(Self::U8)
    }
    pub fn s8() -> TypeRef {
        Arc::new(Self::S8)
    }
    pub fn u16() -> TypeRef {
        Arc::new(Self::U16)
    }
    pub fn s16() -> TypeRef {
        Arc::new(Self::S16)
    }
    pub fn u32() -> TypeRef {
        Arc::new(Self::U32)
    }
    pub fn s32() -> TypeRef {
        Arc::new(Self::S32)
    }
    pub fn u64() -> TypeRef {
        Arc::new(Self::U64)
    }
    pub fn s64() -> TypeRef {
        Arc::new(Self::S64)
    }
    pub fn f32() -> TypeRef {
        Arc::new(Self::F32)
    }
    pub fn f64() -> TypeRef {
        Arc::new(Self::F64)
    }
    pub fn char() -> TypeRef {
        Arc::new(Self::Char)
    }
    pub fn string() -> TypeRef {
        Arc::new(Self::String)
    }

    /// Build a record descriptor; field order is significant for wire layout.
    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, TypeRef)>) -> TypeRef {
        let fields: Vec<(String, TypeRef)> =
            fields.into_iter().map(|(n, t)| (n.into(), t)).collect();
        let types: Vec<TypeRef> = fields.iter().map(|(_, t)| Arc::clone(t)).collect();
        let (offsets, layout) = sequence_layout(&types);
        let fields = fields
            .into_iter()
            .zip(offsets)
            .map(|((name, ty), offset)| Field { name, ty, offset })
            .collect();
        Arc::new(Self::Record(RecordType { fields, layout }))
    }

    pub fn tuple(types: impl IntoIterator<Item = TypeRef>) -> TypeRef {
        let types: Vec<TypeRef> = types.into_iter().collect();
        let (offsets, layout) = sequence_layout(&types);
        Arc::new(Self::Tuple(TupleType {
            types,
            offsets,
            layout,
        }))
    }

    /// Build a variant descriptor from (case name, optional payload) pairs.
    pub fn variant<N: Into<String>>(
        cases: impl IntoIterator<Item = (N, Option<TypeRef>)>,
    ) -> TypeRef {
        let cases: Vec<VariantCase> = cases
            .into_iter()
            .map(|(name, payload)| VariantCase {
                name: name.into(),
                payload,
            })
            .collect();
        let tag = Discriminant::for_case_count(cases.len());
        let payloads: Vec<Option<&TypeRef>> = cases.iter().map(|c| c.payload.as_ref()).collect();
        let (payload_offset, layout) = tagged_layout(tag, &payloads);
        Arc::new(Self::Variant(VariantType {
            cases,
            tag,
            payload_offset,
            layout,
        }))
    }

    /// Build an enum descriptor: a variant with no payloads.
    pub fn enumeration<N: Into<String>>(cases: impl IntoIterator<Item = N>) -> TypeRef {
        let cases: Vec<String> = cases.into_iter().map(Into::into).collect();
        let tag = Discriminant::for_case_count(cases.len());
        Arc::new(Self::Enum(EnumType { cases, tag }))
    }

    /// Build a flags descriptor over an ordered list of named bits.
    pub fn flags<N: Into<String>>(names: impl IntoIterator<Item = N>) -> TypeRef {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let words = names.len().div_ceil(32).max(1);
        Arc::new(Self::Flags(FlagsType { names, words }))
    }

    pub fn option(payload: TypeRef) -> TypeRef {
        let (payload_offset, layout) = tagged_layout(Discriminant::U8, &[None, Some(&payload)]);
        Arc::new(Self::Option(OptionType {
            payload,
            payload_offset,
            layout,
        }))
    }

    pub fn result(ok: Option<TypeRef>, err: Option<TypeRef>) -> TypeRef {
        let (payload_offset, layout) =
            tagged_layout(Discriminant::U8, &[ok.as_ref(), err.as_ref()]);
        Arc::new(Self::Result(ResultType {
            ok,
            err,
            payload_offset,
            layout,
        }))
    }

    pub fn list(element: TypeRef) -> TypeRef {
        Arc::new(Self::List(ListType { element }))
    }

    /// An ownership-transferring resource handle.
    pub fn own(resource: ResourceTypeId) -> TypeRef {
        Arc::new(Self::Own(resource))
    }

    /// A temporary-reference resource handle that must not outlive the call.
    pub fn borrow(resource: ResourceTypeId) -> TypeRef {
        Arc::new(Self::Borrow(resource))
    }

    /// Flattened wire size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::F32 | Self::Char => 4,
            Self::U64 | Self::S64 | Self::F64 => 8,
            Self::String | Self::List(_) => 8,
            Self::Record(r) => r.layout.size,
            Self::Tuple(t) => t.layout.size,
            Self::Variant(v) => v.layout.size,
            Self::Enum(e) => e.tag.size(),
            Self::Flags(f) => f.words * 4,
            Self::Option(o) => o.layout.size,
            Self::Result(r) => r.layout.size,
            Self::Own(_) | Self::Borrow(_) => 4,
        }
    }

    /// Wire alignment in bytes.
    pub fn align(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::F32 | Self::Char => 4,
            Self::U64 | Self::S64 | Self::F64 => 8,
            Self::String | Self::List(_) => 4,
            Self::Record(r) => r.layout.align,
            Self::Tuple(t) => t.layout.align,
            Self::Variant(v) => v.layout.align,
            Self::Enum(e) => e.tag.align(),
            Self::Flags(_) => 4,
            Self::Option(o) => o.layout.align,
            Self::Result(r) => r.layout.align,
            Self::Own(_) | Self::Borrow(_) => 4,
        }
    }

    /// Short name used in diagnostics.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::S8 => "s8",
            Self::U16 => "u16",
            Self::S16 => "s16",
            Self::U32 => "u32",
            Self::S32 => "s32",
            Self::U64 => "u64",
            Self::S64 => "s64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "string",
            Self::Record(_) => "record",
            Self::Variant(_) => "variant",
            Self::Enum(_) => "enum",
            Self::Flags(_) => "flags",
            Self::Option(_) => "option",
            Self::Result(_) => "result",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Own(_) => "own",
            Self::Borrow(_) => "borrow",
        }
    }

    /// Collect every resource id referenced by handle descriptors reachable
    /// from this type. Used for world composition checks.
    pub(crate) fn collect_resource_ids(&self, out: &mut BTreeSet<ResourceTypeId>) {
        match self {
            Self::Own(id) | Self::Borrow(id) => {
                out.insert(id.clone());
            }
            Self::Record(r) => {
                for field in &r.fields {
                    field.ty.collect_resource_ids(out);
                }
            }
            Self::Tuple(t) => {
                for ty in &t.types {
                    ty.collect_resource_ids(out);
                }
            }
            Self::Variant(v) => {
                for case in &v.cases {
                    if let Some(payload) = &case.payload {
                        payload.collect_resource_ids(out);
                    }
                }
            }
            Self::Option(o) => o.payload.collect_resource_ids(out),
            Self::Result(r) => {
                if let Some(ok) = &r.ok {
                    ok.collect_resource_ids(out);
                }
                if let Some(err) = &r.err {
                    err.collect_resource_ids(out);
                }
            }
            Self::List(l) => l.element.collect_resource_ids(out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_layout() {
        assert_eq!(TypeDescriptor::u8().size(), 1);
        assert_eq!(TypeDescriptor::u32().align(), 4);
        assert_eq!(TypeDescriptor::f64().size(), 8);
        assert_eq!(TypeDescriptor::string().size(), 8);
    }

    #[test]
    fn record_fields_are_packed_and_aligned() {
        // u8 at 0, u32 at 4, u16 at 8; size rounds to 12 with align 4
        let ty = TypeDescriptor::record([
            ("a", TypeDescriptor::u8()),
            ("b", TypeDescriptor::u32()),
            ("c", TypeDescriptor::u16()),
        ]);
        assert_eq!(ty.size(), 12);
        assert_eq!(ty.align(), 4);
        if let TypeDescriptor::Record(r) = ty.as_ref() {
            let offsets: Vec<usize> = r.fields.iter().map(|f| f.offset).collect();
            assert_eq!(offsets, vec![0, 4, 8]);
        } else {
            panic!("expected record");
        }
    }

    #[test]
    fn variant_payload_offset_respects_widest_case() {
        let ty = TypeDescriptor::variant([
            ("none", None),
            ("num", Some(TypeDescriptor::u64())),
            ("flag", Some(TypeDescriptor::bool())),
        ]);
        assert_eq!(ty.align(), 8);
        assert_eq!(ty.size(), 16);
        if let TypeDescriptor::Variant(v) = ty.as_ref() {
            assert_eq!(v.tag, Discriminant::U8);
            assert_eq!(v.payload_offset, 8);
        } else {
            panic!("expected variant");
        }
    }

    #[test]
    fn discriminant_width_covers_case_count() {
        assert_eq!(Discriminant::for_case_count(2), Discriminant::U8);
        assert_eq!(Discriminant::for_case_count(256), Discriminant::U8);
        assert_eq!(Discriminant::for_case_count(257), Discriminant::U16);
        assert_eq!(Discriminant::for_case_count(70_000), Discriminant::U32);
    }

    #[test]
    fn flags_word_count() {
        let small = TypeDescriptor::flags(["a", "b", "c"]);
        assert_eq!(small.size(), 4);
        let wide = TypeDescriptor::flags((0..40).map(|i| format!("f{i}")));
        assert_eq!(wide.size(), 8);
    }
}
