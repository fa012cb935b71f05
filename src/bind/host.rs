//! Host-side binding: native implementations behind the raw convention.
//!
//! [`bind_host`] turns a [`HostImplementation`] into the flat table of
//! [`RawFn`]s a world's exports dispatch on. Each adapter lifts raw
//! arguments, pins borrow tokens, invokes the native function, and lowers
//! the result back through the derived calling convention.

use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::{CanonicalAbiError, FlatReader, TypeDescriptor, TypeRef, Value, WireValue};
use crate::logging;
use crate::resource::{Destructor, HostRep, ResourceTypeId};
use crate::world::{FunctionKind, QualifiedFunction, WorldDescriptor};

use super::signature::{CallingConvention, FunctionSignature, ParamConvention, ResultConvention};
use super::{collect_borrows, release_borrows, BindError, CallContext, NativeFn, RawFn};

/// Constructor producing a fresh host representation.
pub type ConstructorFn =
    Arc<dyn Fn(&mut CallContext<'_>, Vec<Value>) -> crate::Result<HostRep> + Send + Sync>;

/// A resource method invoked over its resolved host representation.
pub type MethodFn = Arc<
    dyn Fn(&mut CallContext<'_>, HostRep, Vec<Value>) -> crate::Result<Value> + Send + Sync,
>;

/// Host implementation of one resource kind.
#[derive(Default)]
pub struct HostResourceImpl {
    constructor: Option<ConstructorFn>,
    methods: HashMap<String, MethodFn>,
    destructor: Option<Destructor>,
}

impl HostResourceImpl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constructor(
        mut self,
        f: impl Fn(&mut CallContext<'_>, Vec<Value>) -> crate::Result<HostRep>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.constructor = Some(Arc::new(f));
        self
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&mut CallContext<'_>, HostRep, Vec<Value>) -> crate::Result<Value>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn with_destructor(mut self, f: impl Fn(HostRep) + Send + Sync + 'static) -> Self {
        self.destructor = Some(Arc::new(f));
        self
    }
}

/// The host's implementations for a world's exported surface.
#[derive(Default)]
pub struct HostImplementation {
    functions: HashMap<(String, String), NativeFn>,
    resources: HashMap<ResourceTypeId, HostResourceImpl>,
}

impl HostImplementation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(
        mut self,
        interface: impl Into<String>,
        name: impl Into<String>,
        f: impl Fn(&mut CallContext<'_>, Vec<Value>) -> crate::Result<Value>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.functions
            .insert((interface.into(), name.into()), Arc::new(f));
        self
    }

    pub fn with_resource(mut self, id: ResourceTypeId, resource: HostResourceImpl) -> Self {
        self.resources.insert(id, resource);
        self
    }
}

/// Bind a host implementation to a world's export table.
///
/// Fails at bind time, not call time, when an exported function or resource
/// lifecycle entry has no implementation.
pub fn bind_host(
    world: &WorldDescriptor,
    implementation: HostImplementation,
) -> crate::Result<Vec<RawFn>> {
    let mut table = Vec::with_capacity(world.export_functions().len());
    for function in world.export_functions() {
        table.push(bind_one(function, &implementation)?);
    }
    logging::debug!(functions = table.len(), "bound host export table");
    Ok(table)
}

fn missing(function: &QualifiedFunction) -> crate::Error {
    BindError::MissingImplementation {
        interface: function.interface.clone(),
        function: function.name.clone(),
    }
    .into()
}

fn bind_one(
    function: &QualifiedFunction,
    implementation: &HostImplementation,
) -> crate::Result<RawFn> {
    let native = match &function.kind {
        FunctionKind::Free => implementation
            .functions
            .get(&(function.interface.clone(), function.name.clone()))
            .cloned()
            .ok_or_else(|| missing(function))?,
        FunctionKind::Constructor(id) => {
            let resource = implementation
                .resources
                .get(id)
                .ok_or_else(|| missing(function))?;
            let constructor = resource
                .constructor
                .clone()
                .ok_or_else(|| missing(function))?;
            let destructor = resource.destructor.clone();
            let id = id.clone();
            Arc::new(move |ctx: &mut CallContext<'_>, args: Vec<Value>| {
                let table = ctx.tables.get_handle_table(&id);
                if let Some(destructor) = &destructor {
                    table.ensure_destructor(destructor);
                }
                let rep = constructor(ctx, args)?;
                let handle = table.register_host_representation(rep);
                Ok(Value::Own(handle))
            }) as NativeFn
        }
        FunctionKind::Method { resource, method } => {
            let resource_impl = implementation
                .resources
                .get(resource)
                .ok_or_else(|| missing(function))?;
            let method_fn = resource_impl
                .methods
                .get(method)
                .cloned()
                .ok_or_else(|| missing(function))?;
            let id = resource.clone();
            let name = function.name.clone();
            Arc::new(move |ctx: &mut CallContext<'_>, mut args: Vec<Value>| {
                if args.is_empty() {
                    return Err(BindError::ArgumentCount {
                        function: name.clone(),
                        expected: 1,
                        got: 0,
                    }
                    .into());
                }
                let handle = match args.remove(0) {
                    Value::Borrow(handle) => handle,
                    other => {
                        return Err(CanonicalAbiError::TypeMismatch {
                            expected: "borrow".to_string(),
                            got: other.kind_name().to_string(),
                        }
                        .into());
                    }
                };
                let rep = ctx
                    .tables
                    .get_handle_table(&id)
                    .resolve_host_representation(handle)?;
                method_fn(ctx, rep, args)
            }) as NativeFn
        }
        FunctionKind::ResourceDrop(id) => {
            let id = id.clone();
            Arc::new(move |ctx: &mut CallContext<'_>, mut args: Vec<Value>| {
                let handle = match args.pop() {
                    Some(Value::Own(handle)) => handle,
                    Some(other) => {
                        return Err(CanonicalAbiError::TypeMismatch {
                            expected: "own".to_string(),
                            got: other.kind_name().to_string(),
                        }
                        .into());
                    }
                    None => return Err(CanonicalAbiError::MissingWireValue.into()),
                };
                ctx.tables.get_handle_table(&id).drop_own(handle)?;
                Ok(Value::unit())
            }) as NativeFn
        }
    };
    Ok(raw_adapter(function, native))
}

/// Wrap a native function in the raw calling convention.
fn raw_adapter(function: &QualifiedFunction, native: NativeFn) -> RawFn {
    let signature = Arc::clone(&function.signature);
    let convention = signature.convention();
    let name = format!("{}#{}", function.interface, function.name);
    Arc::new(move |ctx: &mut CallContext<'_>, raw: &[WireValue]| {
        if raw.len() != convention.flat_params.len() {
            return Err(BindError::ArgumentCount {
                function: name.clone(),
                expected: convention.flat_params.len(),
                got: raw.len(),
            }
            .into());
        }
        let (args, retptr) = lift_arguments(&signature, &convention, ctx, raw)?;

        let mut tokens = Vec::new();
        for ((_, ty), value) in signature.params().iter().zip(&args) {
            if let Err(err) = collect_borrows(ty, value, ctx.tables, &mut tokens) {
                release_borrows(tokens);
                return Err(err);
            }
        }
        let outcome = native(ctx, args);
        release_borrows(tokens);

        let value = match outcome {
            Ok(value) => value,
            // Handle-lifecycle failures are infrastructure errors and stay
            // catchable as themselves rather than becoming a wire result
            Err(err) if err.is_resource() => return Err(err),
            Err(err) => lower_native_error(&name, signature.result(), err)?,
        };
        lower_result(&convention, signature.result(), &value, ctx, retptr)
    })
}

/// Decode raw arguments into native values, plus the return pointer when
/// the result convention is indirect.
fn lift_arguments(
    signature: &FunctionSignature,
    convention: &CallingConvention,
    ctx: &mut CallContext<'_>,
    raw: &[WireValue],
) -> crate::Result<(Vec<Value>, Option<u32>)> {
    let mut reader = FlatReader::new(raw);
    let args = match convention.params {
        ParamConvention::Direct => {
            let mut args = Vec::with_capacity(signature.params().len());
            for (_, ty) in signature.params() {
                args.push(ty.lift_flat(&mut reader, ctx.memory)?);
            }
            args
        }
        ParamConvention::Indirect => {
            let ptr = reader.next_i32()? as u32;
            let size = convention.params_tuple.size() as u32;
            let bytes = ctx.memory.read(ptr, size)?.to_vec();
            match convention.params_tuple.lift(&bytes, ctx.memory)? {
                Value::Tuple(elements) => elements,
                other => {
                    return Err(CanonicalAbiError::TypeMismatch {
                        expected: "tuple".to_string(),
                        got: other.kind_name().to_string(),
                    }
                    .into());
                }
            }
        }
    };
    let retptr = match convention.result {
        ResultConvention::Indirect => Some(reader.next_i32()? as u32),
        _ => None,
    };
    Ok((args, retptr))
}

/// Encode a native result per the result convention.
fn lower_result(
    convention: &CallingConvention,
    result_ty: Option<&TypeRef>,
    value: &Value,
    ctx: &mut CallContext<'_>,
    retptr: Option<u32>,
) -> crate::Result<Vec<WireValue>> {
    match (convention.result, result_ty) {
        (ResultConvention::Direct, Some(ty)) => {
            let mut out = Vec::new();
            ty.lower_flat(value, ctx.memory, &mut out)?;
            Ok(out)
        }
        (ResultConvention::Indirect, Some(ty)) => {
            let ptr = retptr.ok_or(CanonicalAbiError::MissingWireValue)?;
            let bytes = ty.lower(value, ctx.memory)?;
            ctx.memory.write(ptr, &bytes);
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

/// Surface a native failure through the signature's declared error case,
/// or refuse when the signature cannot carry it.
fn lower_native_error(
    function: &str,
    result_ty: Option<&TypeRef>,
    err: crate::Error,
) -> crate::Result<Value> {
    if let Some(TypeDescriptor::Result(r)) = result_ty.map(Arc::as_ref) {
        match r.err.as_deref() {
            None => {
                logging::debug!(function, error = %err, "native call failed");
                return Ok(Value::Result(Err(None)));
            }
            Some(TypeDescriptor::String) => {
                logging::debug!(function, error = %err, "native call failed");
                return Ok(Value::Result(Err(Some(Box::new(Value::String(
                    err.to_string(),
                ))))));
            }
            Some(_) => {}
        }
    }
    Err(BindError::ProtocolViolation {
        function: function.to_string(),
        message: err.to_string(),
    }
    .into())
}
