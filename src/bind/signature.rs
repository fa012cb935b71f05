//! Function signatures and calling-convention derivation.

use crate::abi::{TypeDescriptor, TypeRef, WireType};

/// Flattened arguments beyond this count are spilled to linear memory and
/// passed as one pointer.
pub const MAX_FLAT_PARAMS: usize = 16;

/// Flattened results beyond this count are written through a
/// caller-allocated return pointer.
pub const MAX_FLAT_RESULTS: usize = 1;

/// A typed function signature: ordered parameters plus a single optional
/// result descriptor (itself possibly an option/result/tuple to express
/// "no result" or "multiple results").
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    name: String,
    params: Vec<(String, TypeRef)>,
    result: Option<TypeRef>,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            result: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    pub fn with_result(mut self, ty: TypeRef) -> Self {
        self.result = Some(ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[(String, TypeRef)] {
        &self.params
    }

    pub fn result(&self) -> Option<&TypeRef> {
        self.result.as_ref()
    }

    /// Derive the raw calling convention for this signature. Deterministic:
    /// both sides of a boundary compute the same classification.
    pub fn convention(&self) -> CallingConvention {
        let params_tuple =
            TypeDescriptor::tuple(self.params.iter().map(|(_, ty)| ty.clone()));

        let mut param_types = Vec::new();
        for (_, ty) in &self.params {
            ty.flat_types(&mut param_types);
        }
        let params = if param_types.len() > MAX_FLAT_PARAMS {
            param_types = vec![WireType::I32];
            ParamConvention::Indirect
        } else {
            ParamConvention::Direct
        };

        let result = match &self.result {
            None => ResultConvention::Unit,
            Some(ty) if ty.flat_count() <= MAX_FLAT_RESULTS => ResultConvention::Direct,
            Some(_) => {
                // Trailing return pointer
                param_types.push(WireType::I32);
                ResultConvention::Indirect
            }
        };

        CallingConvention {
            params,
            result,
            flat_params: param_types,
            params_tuple,
        }
    }
}

/// How arguments reach the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamConvention {
    /// Each argument's flattened scalars are passed directly.
    Direct,
    /// Arguments are lowered as a tuple into memory; one pointer is passed.
    Indirect,
}

/// How the result returns to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultConvention {
    /// The signature declares no result.
    Unit,
    /// The result's flattened scalars are returned directly.
    Direct,
    /// The callee writes the lowered result through a caller-allocated
    /// pointer passed as the trailing argument.
    Indirect,
}

/// The derived raw calling convention of one signature.
#[derive(Debug, Clone)]
pub struct CallingConvention {
    pub params: ParamConvention,
    pub result: ResultConvention,
    /// Core types of the raw argument list, including the spill pointer
    /// and trailing return pointer where applicable.
    pub flat_params: Vec<WireType>,
    /// Synthetic tuple descriptor over the parameter types, used for the
    /// spill layout and for walking argument values.
    pub params_tuple: TypeRef,
}
