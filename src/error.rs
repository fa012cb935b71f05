//! Unified error type for the wit-bind library.
//!
//! This module provides a single [`Error`] type that encompasses all errors
//! that can occur in the library, making it easier to handle errors in
//! application code.

use thiserror::Error;

use crate::abi::CanonicalAbiError;
use crate::bind::BindError;
use crate::resource::ResourceError;
use crate::world::ComposeError;

/// Unified error type for all wit-bind operations.
///
/// This enum wraps all module-specific error types, allowing callers to
/// use a single error type throughout their application.
///
/// # Example
///
/// ```ignore
/// use wit_bind::prelude::*;
///
/// fn add(binding: &mut ServiceBinding<InProcessConnection>) -> Result<Value> {
///     binding.call("demo/calculator", "add", vec![2u32.into(), 3u32.into()])
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Error from canonical ABI encoding/decoding operations.
    #[error(transparent)]
    Abi(#[from] CanonicalAbiError),

    /// Error from resource handle management.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Error from function binding and dispatch.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Error from composing interfaces into a world.
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is an ABI codec error.
    pub fn is_abi(&self) -> bool {
        matches!(self, Self::Abi(_))
    }

    /// Returns `true` if this is a resource handle error.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    /// Returns `true` if this is a binding or dispatch error.
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Bind(_))
    }

    /// Returns `true` if this is a world composition error.
    pub fn is_compose(&self) -> bool {
        matches!(self, Self::Compose(_))
    }

    /// Returns `true` if this is the declared error case of a call.
    pub fn is_call_failed(&self) -> bool {
        matches!(self, Self::Bind(BindError::CallFailed { .. }))
    }
}
