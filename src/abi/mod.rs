//! Canonical ABI lowering and lifting.
//!
//! This module implements the canonical ABI memory layout and flattened
//! calling-convention representation for interface-typed values.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for ABI operations
//! - [`memory`]: Linear-memory view for variable-length types
//! - [`buffer`]: Low-level buffer read/write helpers
//! - [`descriptor`]: The shared, immutable type descriptor graph
//! - [`value`]: The native value representation
//! - [`lower`]: Value lowering to binary (memory layout)
//! - [`lift`]: Value lifting from binary (memory layout)
//! - [`flat`]: Lowering/lifting through flattened core scalars

pub mod buffer;
mod descriptor;
mod error;
mod flat;
mod lift;
mod lower;
mod memory;
mod value;

pub use descriptor::{
    Discriminant, EnumType, Field, FlagsType, Layout, ListType, OptionType, RecordType,
    ResultType, TupleType, TypeDescriptor, TypeRef, VariantCase, VariantType,
};
pub use error::CanonicalAbiError;
pub use flat::{FlatReader, WireType, WireValue};
pub use lift::MAX_LIST_LEN;
pub use memory::LinearMemory;
pub use value::Value;
