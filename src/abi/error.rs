//! Error types for canonical ABI operations.

use thiserror::Error;

/// Errors that can occur during canonical ABI lowering and lifting.
#[derive(Error, Debug)]
pub enum CanonicalAbiError {
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Invalid discriminant {discriminant} for variant with {num_cases} cases")]
    InvalidDiscriminant { discriminant: u32, num_cases: usize },

    #[error("Invalid bool value: {0}")]
    InvalidBool(u8),

    #[error("Invalid char value: {0}")]
    InvalidChar(u32),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Unknown case '{case}' for variant or enum")]
    UnknownCase { case: String },

    #[error("Unknown flag '{flag}'")]
    UnknownFlag { flag: String },

    #[error("List length {len} exceeds the sanity ceiling {max}")]
    ListTooLong { len: u64, max: u64 },

    #[error("Out of bounds: pointer {ptr} with length {len} exceeds memory size {memory_size}")]
    OutOfBounds {
        ptr: u32,
        len: u32,
        memory_size: usize,
    },

    #[error("Missing core value while lifting flattened arguments")]
    MissingWireValue,
}
