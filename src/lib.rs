//! Typed function binding over the canonical ABI.
//!
//! wit-bind connects native Rust code to component-model-style interfaces:
//! values are lowered to and lifted from the canonical ABI binary format,
//! small values travel as flattened core scalars, resources cross the
//! boundary as integer handles with own/borrow lifetime rules, and a
//! pluggable [`Connection`] carries raw calls between the two sides.
//!
//! # Module Organization
//!
//! - [`abi`]: Canonical ABI codec (descriptors, values, lowering, lifting,
//!   flattening)
//! - [`resource`]: Resource kinds and per-instantiation handle tables
//! - [`bind`]: Host and service adapters over the raw calling convention
//! - [`world`]: Interface and world composition
//! - [`connection`]: Transports carrying raw calls, sync and deferred
//! - [`error`]: Unified error types
//! - [`prelude`]: Convenient re-exports
//! - `logging`: Conditional logging macros (internal)
//!
//! # Features
//!
//! - `logging`: Enable tracing-based logging
//! - `async`: Deferred calls and `AsyncServiceBinding` over tokio
//!
//! # Example
//!
//! ```ignore
//! use wit_bind::prelude::*;
//!
//! let calculator = InterfaceDescriptor::new("demo/calculator").with_function(
//!     FunctionSignature::new("add")
//!         .with_param("left", TypeDescriptor::u32())
//!         .with_param("right", TypeDescriptor::u32())
//!         .with_result(TypeDescriptor::u32()),
//! );
//! let world = WorldDescriptor::compose(vec![], vec![calculator])?;
//!
//! let implementation = HostImplementation::new().with_function(
//!     "demo/calculator",
//!     "add",
//!     |_ctx, args| match args.as_slice() {
//!         [Value::U32(a), Value::U32(b)] => Ok(Value::U32(a + b)),
//!         _ => Ok(Value::unit()),
//!     },
//! );
//!
//! let mut connection = InProcessConnection::new();
//! connection.install(bind_host(&world, implementation)?);
//! let mut binding = bind_service(&world, connection);
//! let sum = binding.call("demo/calculator", "add", vec![2u32.into(), 3u32.into()])?;
//! assert_eq!(sum, Value::U32(5));
//! ```

pub mod abi;
pub mod bind;
pub mod connection;
pub mod error;
#[macro_use]
pub(crate) mod logging;
pub mod prelude;
pub mod resource;
pub mod world;

// Re-export the codec surface
pub use abi::{
    CanonicalAbiError, FlatReader, LinearMemory, TypeDescriptor, TypeRef, Value, WireType,
    WireValue, MAX_LIST_LEN,
};

// Re-export resource handle types
pub use resource::{
    BorrowToken, Handle, HostRep, Representation, ResourceError, ResourceHandleTable,
    ResourceTables, ResourceType, ResourceTypeId, TeardownReport,
};

// Re-export the binding surface
pub use bind::{
    bind_host, bind_service, BindError, CallContext, FunctionSignature, HostImplementation,
    HostResourceImpl, NativeFn, RawFn, ServiceBinding, MAX_FLAT_PARAMS, MAX_FLAT_RESULTS,
};
#[cfg(feature = "async")]
pub use bind::AsyncServiceBinding;

// Re-export world composition
pub use world::{
    ComposeError, FunctionKind, InterfaceDescriptor, QualifiedFunction, WorldDescriptor,
};

// Re-export transports
pub use connection::{Connection, InProcessConnection};
#[cfg(feature = "async")]
pub use connection::{Deferred, DeferredCompletion};

// Re-export unified error types
pub use error::{Error, Result};
