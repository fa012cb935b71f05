//! Service-side binding: calling a peer's exports natively.
//!
//! [`ServiceBinding`] prepares a world's export table once (signature plus
//! derived calling convention per function) and then lowers arguments,
//! dispatches over the connection, and lifts results on every call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::{CanonicalAbiError, FlatReader, TypeDescriptor, Value, WireValue};
use crate::connection::Connection;
use crate::logging;
use crate::resource::{Handle, ResourceTypeId};
use crate::world::{constructor_name, method_name, resource_drop_name, WorldDescriptor};

use super::signature::{CallingConvention, FunctionSignature, ParamConvention, ResultConvention};
use super::BindError;

/// One export with its convention derived ahead of time.
struct PreparedFunction {
    index: u32,
    signature: Arc<FunctionSignature>,
    convention: CallingConvention,
}

/// A native-callable view of a peer's exports over a connection.
pub struct ServiceBinding<C: Connection> {
    connection: C,
    functions: Vec<Arc<PreparedFunction>>,
    lookup: HashMap<(String, String), usize>,
}

/// Bind the export surface of a world over a connection.
pub fn bind_service<C: Connection>(world: &WorldDescriptor, connection: C) -> ServiceBinding<C> {
    ServiceBinding::new(world, connection)
}

impl<C: Connection> ServiceBinding<C> {
    pub fn new(world: &WorldDescriptor, connection: C) -> Self {
        let mut functions = Vec::with_capacity(world.export_functions().len());
        let mut lookup = HashMap::new();
        for (index, function) in world.export_functions().iter().enumerate() {
            lookup.insert(
                (function.interface.clone(), function.name.clone()),
                index,
            );
            functions.push(Arc::new(PreparedFunction {
                index: index as u32,
                signature: Arc::clone(&function.signature),
                convention: function.signature.convention(),
            }));
        }
        logging::debug!(functions = functions.len(), "prepared service binding");
        Self {
            connection,
            functions,
            lookup,
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Call an exported function with native arguments.
    ///
    /// When the signature's result is a `result` type, the ok payload is
    /// unwrapped and the error case surfaces as [`BindError::CallFailed`].
    pub fn call(
        &mut self,
        interface: &str,
        function: &str,
        args: Vec<Value>,
    ) -> crate::Result<Value> {
        let prepared = self.prepared(interface, function)?;
        let (raw, retptr) = self.start(&prepared, args)?;
        let results = self.connection.call_raw(prepared.index, &raw)?;
        self.finish(&prepared, &results, retptr)
    }

    /// Construct a resource, returning the owned handle.
    pub fn construct(
        &mut self,
        interface: &str,
        resource: &ResourceTypeId,
        args: Vec<Value>,
    ) -> crate::Result<Handle> {
        match self.call(interface, &constructor_name(resource), args)? {
            Value::Own(handle) => Ok(handle),
            other => Err(CanonicalAbiError::TypeMismatch {
                expected: "own".to_string(),
                got: other.kind_name().to_string(),
            }
            .into()),
        }
    }

    /// Call a resource method; the receiver borrow is passed implicitly.
    pub fn call_method(
        &mut self,
        interface: &str,
        resource: &ResourceTypeId,
        method: &str,
        handle: Handle,
        mut args: Vec<Value>,
    ) -> crate::Result<Value> {
        args.insert(0, Value::Borrow(handle));
        self.call(interface, &method_name(resource, method), args)
    }

    /// Drop an owned resource handle on the peer.
    pub fn drop_resource(
        &mut self,
        interface: &str,
        resource: &ResourceTypeId,
        handle: Handle,
    ) -> crate::Result<()> {
        self.call(
            interface,
            &resource_drop_name(resource),
            vec![Value::Own(handle)],
        )?;
        Ok(())
    }

    fn prepared(&self, interface: &str, function: &str) -> crate::Result<Arc<PreparedFunction>> {
        self.lookup
            .get(&(interface.to_string(), function.to_string()))
            .and_then(|index| self.functions.get(*index))
            .cloned()
            .ok_or_else(|| {
                BindError::UnknownExport {
                    interface: interface.to_string(),
                    function: function.to_string(),
                }
                .into()
            })
    }

    /// Lower native arguments into raw call arguments, allocating the spill
    /// block and return pointer as the convention requires.
    fn start(
        &mut self,
        prepared: &PreparedFunction,
        args: Vec<Value>,
    ) -> crate::Result<(Vec<WireValue>, Option<u32>)> {
        let signature = &prepared.signature;
        if args.len() != signature.params().len() {
            return Err(BindError::ArgumentCount {
                function: signature.name().to_string(),
                expected: signature.params().len(),
                got: args.len(),
            }
            .into());
        }

        let memory = self.connection.memory();
        let mut raw = Vec::with_capacity(prepared.convention.flat_params.len());
        match prepared.convention.params {
            ParamConvention::Direct => {
                for ((_, ty), value) in signature.params().iter().zip(&args) {
                    ty.lower_flat(value, memory, &mut raw)?;
                }
            }
            ParamConvention::Indirect => {
                let tuple_ty = &prepared.convention.params_tuple;
                let bytes = tuple_ty.lower(&Value::Tuple(args), memory)?;
                let ptr = memory.alloc(tuple_ty.size(), tuple_ty.align());
                memory.write(ptr, &bytes);
                raw.push(WireValue::I32(ptr as i32));
            }
        }

        let retptr = match (prepared.convention.result, signature.result()) {
            (ResultConvention::Indirect, Some(ty)) => {
                let ptr = memory.alloc(ty.size(), ty.align());
                raw.push(WireValue::I32(ptr as i32));
                Some(ptr)
            }
            _ => None,
        };
        Ok((raw, retptr))
    }

    /// Lift raw results back into a native value and unwrap the declared
    /// `result` outcome.
    fn finish(
        &mut self,
        prepared: &PreparedFunction,
        results: &[WireValue],
        retptr: Option<u32>,
    ) -> crate::Result<Value> {
        let value = match (prepared.convention.result, prepared.signature.result()) {
            (ResultConvention::Direct, Some(ty)) => {
                let mut reader = FlatReader::new(results);
                ty.lift_flat(&mut reader, self.connection.memory())?
            }
            (ResultConvention::Indirect, Some(ty)) => {
                let ptr = retptr.ok_or(CanonicalAbiError::MissingWireValue)?;
                let bytes = self.connection.read_memory(ptr, ty.size() as u32)?;
                ty.lift(&bytes, self.connection.memory())?
            }
            _ => Value::unit(),
        };

        match (
            prepared.signature.result().map(Arc::as_ref),
            value,
        ) {
            (Some(TypeDescriptor::Result(_)), Value::Result(outcome)) => match outcome {
                Ok(payload) => Ok(payload.map_or_else(Value::unit, |boxed| *boxed)),
                Err(payload) => Err(BindError::CallFailed {
                    payload: payload.map(|boxed| *boxed),
                }
                .into()),
            },
            (_, value) => Ok(value),
        }
    }
}

/// Shared, task-safe service binding over a deferred-capable connection.
#[cfg(feature = "async")]
pub struct AsyncServiceBinding<C: Connection + Send> {
    inner: Arc<tokio::sync::Mutex<ServiceBinding<C>>>,
}

#[cfg(feature = "async")]
impl<C: Connection + Send> Clone for AsyncServiceBinding<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(feature = "async")]
impl<C: Connection + Send> AsyncServiceBinding<C> {
    pub fn new(binding: ServiceBinding<C>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(binding)),
        }
    }

    /// Call an exported function, awaiting a deferred completion.
    ///
    /// The binding lock is held only while lowering and lifting; the await
    /// on the peer's response runs unlocked, so concurrent calls proceed.
    pub async fn call(
        &self,
        interface: &str,
        function: &str,
        args: Vec<Value>,
    ) -> crate::Result<Value> {
        let (prepared, deferred, retptr) = {
            let mut inner = self.inner.lock().await;
            let prepared = inner.prepared(interface, function)?;
            let (raw, retptr) = inner.start(&prepared, args)?;
            let deferred = inner.connection.call_raw_deferred(prepared.index, &raw)?;
            (prepared, deferred, retptr)
        };
        let results = deferred.await?;
        let mut inner = self.inner.lock().await;
        inner.finish(&prepared, &results, retptr)
    }

    pub async fn construct(
        &self,
        interface: &str,
        resource: &ResourceTypeId,
        args: Vec<Value>,
    ) -> crate::Result<Handle> {
        match self.call(interface, &constructor_name(resource), args).await? {
            Value::Own(handle) => Ok(handle),
            other => Err(CanonicalAbiError::TypeMismatch {
                expected: "own".to_string(),
                got: other.kind_name().to_string(),
            }
            .into()),
        }
    }

    pub async fn call_method(
        &self,
        interface: &str,
        resource: &ResourceTypeId,
        method: &str,
        handle: Handle,
        mut args: Vec<Value>,
    ) -> crate::Result<Value> {
        args.insert(0, Value::Borrow(handle));
        self.call(interface, &method_name(resource, method), args)
            .await
    }

    pub async fn drop_resource(
        &self,
        interface: &str,
        resource: &ResourceTypeId,
        handle: Handle,
    ) -> crate::Result<()> {
        self.call(
            interface,
            &resource_drop_name(resource),
            vec![Value::Own(handle)],
        )
        .await?;
        Ok(())
    }
}
