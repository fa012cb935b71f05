//! Resource kinds and their per-instantiation handle tables.
//!
//! A [`ResourceType`] is shared metadata: the name of a resource kind plus
//! its constructor and method signatures. Handle state is separate: each
//! connected instantiation owns one [`ResourceHandleTable`] per resource
//! kind, reached through [`ResourceTables`], so simultaneous instantiations
//! never share or cross-contaminate handles.

mod error;
mod table;

pub use error::ResourceError;
pub use table::{
    BorrowToken, Destructor, Handle, HostRep, Representation, ResourceHandleTable, TeardownReport,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::abi::TypeRef;
use crate::bind::FunctionSignature;

/// Identifies a resource kind by its qualified `interface/resource` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTypeId(Arc<str>);

impl ResourceTypeId {
    pub fn new(interface: &str, resource: &str) -> Self {
        Self(format!("{interface}/{resource}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The unqualified resource name.
    pub fn resource_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared metadata for one resource kind.
#[derive(Debug)]
pub struct ResourceType {
    id: ResourceTypeId,
    constructor: Option<Vec<(String, TypeRef)>>,
    methods: Vec<FunctionSignature>,
    has_destructor: bool,
}

impl ResourceType {
    pub fn new(id: ResourceTypeId) -> Self {
        Self {
            id,
            constructor: None,
            methods: Vec::new(),
            has_destructor: false,
        }
    }

    /// Declare a constructor with the given parameter list. The constructor
    /// implicitly returns an owned handle of this resource.
    pub fn with_constructor(mut self, params: Vec<(String, TypeRef)>) -> Self {
        self.constructor = Some(params);
        self
    }

    /// Declare a method. The receiver handle is implicit and not part of
    /// the signature's parameter list.
    pub fn with_method(mut self, signature: FunctionSignature) -> Self {
        self.methods.push(signature);
        self
    }

    /// Declare that dropping an owned handle runs a destructor.
    pub fn with_destructor(mut self) -> Self {
        self.has_destructor = true;
        self
    }

    pub fn id(&self) -> &ResourceTypeId {
        &self.id
    }

    pub fn constructor(&self) -> Option<&[(String, TypeRef)]> {
        self.constructor.as_deref()
    }

    pub fn methods(&self) -> &[FunctionSignature] {
        &self.methods
    }

    pub fn has_destructor(&self) -> bool {
        self.has_destructor
    }
}

/// Per-instantiation map of resource kind to handle table, created lazily.
#[derive(Default, Clone)]
pub struct ResourceTables {
    tables: Arc<Mutex<HashMap<ResourceTypeId, ResourceHandleTable>>>,
}

impl ResourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<ResourceTypeId, ResourceHandleTable>> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The handle table for a resource kind, created on first use.
    pub fn get_handle_table(&self, id: &ResourceTypeId) -> ResourceHandleTable {
        self.tables().entry(id.clone()).or_default().clone()
    }

    /// Tear down every table, merging their reports.
    pub fn close_all(&self) -> TeardownReport {
        let tables = std::mem::take(&mut *self.tables());
        let mut report = TeardownReport::default();
        for table in tables.values() {
            report.merge(table.close());
        }
        report
    }
}
