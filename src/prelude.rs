//! Convenient re-exports for common usage patterns.
//!
//! This module provides a single import to bring all commonly used types
//! into scope.
//!
//! # Example
//!
//! ```ignore
//! use wit_bind::prelude::*;
//!
//! let world = WorldDescriptor::compose(vec![], vec![calculator_interface()])?;
//! let mut connection = InProcessConnection::new();
//! connection.install(bind_host(&world, implementation)?);
//! let mut binding = bind_service(&world, connection);
//! let sum = binding.call("demo/calculator", "add", vec![2u32.into(), 3u32.into()])?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// ABI types
pub use crate::abi::{
    CanonicalAbiError, FlatReader, LinearMemory, TypeDescriptor, TypeRef, Value, WireType,
    WireValue,
};

// Resource handle types
pub use crate::resource::{
    BorrowToken, Handle, HostRep, Representation, ResourceError, ResourceHandleTable,
    ResourceTables, ResourceType, ResourceTypeId, TeardownReport,
};

// Binding surface
pub use crate::bind::{
    bind_host, bind_service, BindError, CallContext, FunctionSignature, HostImplementation,
    HostResourceImpl, NativeFn, RawFn, ServiceBinding,
};
#[cfg(feature = "async")]
pub use crate::bind::AsyncServiceBinding;

// World composition
pub use crate::world::{
    ComposeError, FunctionKind, InterfaceDescriptor, QualifiedFunction, WorldDescriptor,
};

// Transports
pub use crate::connection::{Connection, InProcessConnection};
#[cfg(feature = "async")]
pub use crate::connection::{Deferred, DeferredCompletion};
