//! Function binding: from typed signatures to the raw calling convention.
//!
//! The binder produces two bidirectional adapters over one lifting/lowering
//! core: [`bind_host`] wraps a native service implementation into a raw
//! callable table, and [`bind_service`] wraps a raw callable table back
//! into a native-callable surface.

mod error;
mod host;
mod service;
mod signature;

pub use error::BindError;
pub use host::{bind_host, ConstructorFn, HostImplementation, HostResourceImpl, MethodFn};
pub use service::{bind_service, ServiceBinding};
#[cfg(feature = "async")]
pub use service::AsyncServiceBinding;
pub use signature::{
    CallingConvention, FunctionSignature, ParamConvention, ResultConvention, MAX_FLAT_PARAMS,
    MAX_FLAT_RESULTS,
};

use std::sync::Arc;

use crate::abi::{LinearMemory, TypeDescriptor, Value, WireValue};
use crate::resource::{BorrowToken, ResourceHandleTable, ResourceTables};
use crate::logging;

/// Execution context owned by the transport for the duration of one call:
/// the linear-memory view plus this instantiation's handle tables.
pub struct CallContext<'a> {
    pub memory: &'a mut LinearMemory,
    pub tables: &'a ResourceTables,
}

/// A native function bound on the host side.
pub type NativeFn =
    Arc<dyn Fn(&mut CallContext<'_>, Vec<Value>) -> crate::Result<Value> + Send + Sync>;

/// A raw callable obeying the wire calling convention.
pub type RawFn =
    Arc<dyn Fn(&mut CallContext<'_>, &[WireValue]) -> crate::Result<Vec<WireValue>> + Send + Sync>;

/// Take borrow tokens for every borrow-handle argument of a call, so a
/// mid-call drop of the owner fails with `ResourceInUse` instead of
/// invalidating the reference.
pub(crate) fn collect_borrows(
    ty: &TypeDescriptor,
    value: &Value,
    tables: &ResourceTables,
    out: &mut Vec<(ResourceHandleTable, BorrowToken)>,
) -> crate::Result<()> {
    match (ty, value) {
        (TypeDescriptor::Borrow(id), Value::Borrow(handle)) => {
            let table = tables.get_handle_table(id);
            let token = table.allocate_borrow(*handle)?;
            out.push((table, token));
        }
        (TypeDescriptor::Record(r), Value::Record(fields)) => {
            for (field, (_, value)) in r.fields.iter().zip(fields) {
                collect_borrows(&field.ty, value, tables, out)?;
            }
        }
        (TypeDescriptor::Tuple(t), Value::Tuple(elements)) => {
            for (ty, value) in t.types.iter().zip(elements) {
                collect_borrows(ty, value, tables, out)?;
            }
        }
        (TypeDescriptor::Variant(v), Value::Variant { case, payload }) => {
            if let (Some(idx), Some(payload)) = (v.case_index(case), payload) {
                if let Some(payload_ty) = v.cases.get(idx).and_then(|c| c.payload.as_ref()) {
                    collect_borrows(payload_ty, payload, tables, out)?;
                }
            }
        }
        (TypeDescriptor::Option(o), Value::Option(Some(inner))) => {
            collect_borrows(&o.payload, inner, tables, out)?;
        }
        (TypeDescriptor::Result(r), Value::Result(res)) => {
            let (ty, payload) = match res {
                Ok(p) => (&r.ok, p),
                Err(p) => (&r.err, p),
            };
            if let (Some(ty), Some(payload)) = (ty, payload) {
                collect_borrows(ty, payload, tables, out)?;
            }
        }
        (TypeDescriptor::List(l), Value::List(elements)) => {
            for element in elements {
                collect_borrows(&l.element, element, tables, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Release borrow tokens taken for a call. Runs on both success and
/// failure paths; a stale token here indicates the table was torn down
/// mid-call and is logged rather than masking the call's own outcome.
pub(crate) fn release_borrows(tokens: Vec<(ResourceHandleTable, BorrowToken)>) {
    for (table, token) in tokens {
        if let Err(_err) = table.release_borrow(token) {
            logging::warn!(error = %_err, "failed to release borrow token");
        }
    }
}
