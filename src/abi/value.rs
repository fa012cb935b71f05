//! Native value representation for canonical ABI types.

use super::descriptor::FlagsType;
use super::CanonicalAbiError;
use crate::resource::Handle;

/// A language-level value, structurally typed against a
/// [`TypeDescriptor`](super::TypeDescriptor).
///
/// Flags carry their raw 32-bit words so bits beyond the locally named set
/// survive a round trip through a narrower view.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    S8(i8),
    U16(u16),
    S16(i16),
    U32(u32),
    S32(i32),
    U64(u64),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    Record(Vec<(String, Value)>),
    Variant {
        case: String,
        payload: Option<Box<Value>>,
    },
    Enum(String),
    Flags(Vec<u32>),
    Option(Option<Box<Value>>),
    Result(Result<Option<Box<Value>>, Option<Box<Value>>>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Own(Handle),
    Borrow(Handle),
}

impl Value {
    /// The empty tuple, used where a function declares no result.
    pub fn unit() -> Self {
        Self::Tuple(Vec::new())
    }

    /// Build a variant value for a named case.
    pub fn variant(case: impl Into<String>, payload: impl Into<Option<Value>>) -> Self {
        Self::Variant {
            case: case.into(),
            payload: payload.into().map(Box::new),
        }
    }

    /// Build a record value from (field name, value) pairs.
    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::Record(fields.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    /// Build a flags value from active flag names.
    pub fn flags_from_names(ty: &FlagsType, active: &[&str]) -> Result<Self, CanonicalAbiError> {
        let mut words = vec![0u32; ty.words()];
        for name in active {
            let bit = ty.bit(name).ok_or_else(|| CanonicalAbiError::UnknownFlag {
                flag: (*name).to_string(),
            })?;
            if let Some(word) = words.get_mut(bit / 32) {
                *word |= 1 << (bit % 32);
            }
        }
        Ok(Self::Flags(words))
    }

    /// Test whether a named flag is set in a flags value.
    pub fn flag_set(words: &[u32], bit: usize) -> bool {
        words
            .get(bit / 32)
            .is_some_and(|word| (word >> (bit % 32)) & 1 == 1)
    }

    /// Short name used in diagnostics.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::S8(_) => "s8",
            Self::U16(_) => "u16",
            Self::S16(_) => "s16",
            Self::U32(_) => "u32",
            Self::S32(_) => "s32",
            Self::U64(_) => "u64",
            Self::S64(_) => "s64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Char(_) => "char",
            Self::String(_) => "string",
            Self::Record(_) => "record",
            Self::Variant { .. } => "variant",
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
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
