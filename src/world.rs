//! Interfaces and worlds.
//!
//! An [`InterfaceDescriptor`] groups named types, free functions, and
//! resource kinds under one interface name. A [`WorldDescriptor`] composes
//! interfaces into the import and export surface of one component boundary
//! and derives the flat, deterministically-ordered function tables both
//! sides of the boundary index into.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::abi::{TypeDescriptor, TypeRef};
use crate::bind::FunctionSignature;
use crate::resource::{ResourceType, ResourceTypeId};

/// Errors detected while composing interfaces into a world.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Interface '{interface}' appears more than once in the world")]
    DuplicateInterface { interface: String },

    #[error("Function '{function}' references resource '{resource}' which no interface in the world declares")]
    UnresolvedResource { resource: String, function: String },
}

/// A named collection of types, functions, and resources.
#[derive(Debug, Default)]
pub struct InterfaceDescriptor {
    id: String,
    types: Vec<(String, TypeRef)>,
    functions: Vec<FunctionSignature>,
    resources: Vec<ResourceType>,
}

impl InterfaceDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Register a named type alias for use by generated bindings.
    pub fn with_type(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.types.push((name.into(), ty));
        self
    }

    pub fn with_function(mut self, signature: FunctionSignature) -> Self {
        self.functions.push(signature);
        self
    }

    pub fn with_resource(mut self, resource: ResourceType) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn types(&self) -> &[(String, TypeRef)] {
        &self.types
    }

    pub fn functions(&self) -> &[FunctionSignature] {
        &self.functions
    }

    pub fn resources(&self) -> &[ResourceType] {
        &self.resources
    }
}

/// What a qualified function does: a plain call or one leg of a resource's
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Constructor(ResourceTypeId),
    Method {
        resource: ResourceTypeId,
        method: String,
    },
    ResourceDrop(ResourceTypeId),
}

/// One entry of a world's flat function table.
#[derive(Debug, Clone)]
pub struct QualifiedFunction {
    pub interface: String,
    pub name: String,
    pub signature: Arc<FunctionSignature>,
    pub kind: FunctionKind,
}

/// The composed import/export surface of one boundary.
#[derive(Debug)]
pub struct WorldDescriptor {
    imports: Vec<InterfaceDescriptor>,
    exports: Vec<InterfaceDescriptor>,
    import_table: Vec<QualifiedFunction>,
    export_table: Vec<QualifiedFunction>,
}

impl WorldDescriptor {
    /// Compose interfaces into a world, checking that interface names are
    /// unique and that every handle type a function mentions refers to a
    /// resource some interface declares.
    pub fn compose(
        imports: Vec<InterfaceDescriptor>,
        exports: Vec<InterfaceDescriptor>,
    ) -> Result<Self, ComposeError> {
        let mut seen = BTreeSet::new();
        for interface in imports.iter().chain(&exports) {
            if !seen.insert(interface.id.clone()) {
                return Err(ComposeError::DuplicateInterface {
                    interface: interface.id.clone(),
                });
            }
        }

        let declared: BTreeSet<ResourceTypeId> = imports
            .iter()
            .chain(&exports)
            .flat_map(|i| i.resources.iter().map(|r| r.id().clone()))
            .collect();

        let import_table = function_table(&imports, &declared)?;
        let export_table = function_table(&exports, &declared)?;

        Ok(Self {
            imports,
            exports,
            import_table,
            export_table,
        })
    }

    pub fn imports(&self) -> &[InterfaceDescriptor] {
        &self.imports
    }

    pub fn exports(&self) -> &[InterfaceDescriptor] {
        &self.exports
    }

    /// The flat table of functions this boundary's peer must provide.
    pub fn import_functions(&self) -> &[QualifiedFunction] {
        &self.import_table
    }

    /// The flat table of functions this boundary provides, in the index
    /// order raw calls dispatch on.
    pub fn export_functions(&self) -> &[QualifiedFunction] {
        &self.export_table
    }

    /// Locate an exported function by interface and qualified name,
    /// returning its table index.
    pub fn find_export(&self, interface: &str, function: &str) -> Option<(u32, &QualifiedFunction)> {
        self.export_table
            .iter()
            .enumerate()
            .find(|(_, f)| f.interface == interface && f.name == function)
            .map(|(i, f)| (i as u32, f))
    }
}

/// Qualified name of a resource constructor.
pub fn constructor_name(resource: &ResourceTypeId) -> String {
    format!("[constructor]{}", resource.resource_name())
}

/// Qualified name of a resource method.
pub fn method_name(resource: &ResourceTypeId, method: &str) -> String {
    format!("[method]{}.{method}", resource.resource_name())
}

/// Qualified name of a resource's drop entry.
pub fn resource_drop_name(resource: &ResourceTypeId) -> String {
    format!("[resource-drop]{}", resource.resource_name())
}

fn function_table(
    interfaces: &[InterfaceDescriptor],
    declared: &BTreeSet<ResourceTypeId>,
) -> Result<Vec<QualifiedFunction>, ComposeError> {
    // Interfaces and functions keep declaration order; a BTreeMap here
    // would reorder them and silently change call indices across versions.
    let mut table = Vec::new();
    for interface in interfaces {
        for signature in &interface.functions {
            check_resources(signature, declared)?;
            table.push(QualifiedFunction {
                interface: interface.id.clone(),
                name: signature.name().to_string(),
                signature: Arc::new(signature.clone()),
                kind: FunctionKind::Free,
            });
        }
        for resource in &interface.resources {
            let id = resource.id().clone();
            if let Some(params) = resource.constructor() {
                let mut signature = FunctionSignature::new(constructor_name(&id));
                for (name, ty) in params {
                    signature = signature.with_param(name.clone(), Arc::clone(ty));
                }
                let signature = signature.with_result(TypeDescriptor::own(id.clone()));
                check_resources(&signature, declared)?;
                table.push(QualifiedFunction {
                    interface: interface.id.clone(),
                    name: signature.name().to_string(),
                    signature: Arc::new(signature),
                    kind: FunctionKind::Constructor(id.clone()),
                });
            }
            for method in resource.methods() {
                let mut signature =
                    FunctionSignature::new(method_name(&id, method.name()))
                        .with_param("self", TypeDescriptor::borrow(id.clone()));
                for (name, ty) in method.params() {
                    signature = signature.with_param(name.clone(), Arc::clone(ty));
                }
                if let Some(result) = method.result() {
                    signature = signature.with_result(Arc::clone(result));
                }
                check_resources(&signature, declared)?;
                table.push(QualifiedFunction {
                    interface: interface.id.clone(),
                    name: signature.name().to_string(),
                    signature: Arc::new(signature),
                    kind: FunctionKind::Method {
                        resource: id.clone(),
                        method: method.name().to_string(),
                    },
                });
            }
            let drop_signature = FunctionSignature::new(resource_drop_name(&id))
                .with_param("handle", TypeDescriptor::own(id.clone()));
            table.push(QualifiedFunction {
                interface: interface.id.clone(),
                name: drop_signature.name().to_string(),
                signature: Arc::new(drop_signature),
                kind: FunctionKind::ResourceDrop(id.clone()),
            });
        }
    }
    Ok(table)
}

fn check_resources(
    signature: &FunctionSignature,
    declared: &BTreeSet<ResourceTypeId>,
) -> Result<(), ComposeError> {
    let mut referenced = BTreeSet::new();
    for (_, ty) in signature.params() {
        ty.collect_resource_ids(&mut referenced);
    }
    if let Some(result) = signature.result() {
        result.collect_resource_ids(&mut referenced);
    }
    for id in referenced {
        if !declared.contains(&id) {
            return Err(ComposeError::UnresolvedResource {
                resource: id.to_string(),
                function: signature.name().to_string(),
            });
        }
    }
    Ok(())
}

// Keeps the per-interface type map queryable by generated bindings.
impl WorldDescriptor {
    /// Look up a named type declared by any interface in the world.
    pub fn resolve_type(&self, interface: &str, name: &str) -> Option<&TypeRef> {
        self.imports
            .iter()
            .chain(&self.exports)
            .find(|i| i.id == interface)
            .and_then(|i| {
                i.types
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, ty)| ty)
            })
    }

    /// All resource kinds declared across the world, keyed by id.
    pub fn resources(&self) -> BTreeMap<ResourceTypeId, &ResourceType> {
        self.imports
            .iter()
            .chain(&self.exports)
            .flat_map(|i| i.resources.iter())
            .map(|r| (r.id().clone(), r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> InterfaceDescriptor {
        InterfaceDescriptor::new("demo/calculator").with_function(
            FunctionSignature::new("add")
                .with_param("left", TypeDescriptor::u32())
                .with_param("right", TypeDescriptor::u32())
                .with_result(TypeDescriptor::u32()),
        )
    }

    fn counter_interface() -> InterfaceDescriptor {
        let id = ResourceTypeId::new("demo/counters", "counter");
        InterfaceDescriptor::new("demo/counters").with_resource(
            ResourceType::new(id)
                .with_constructor(vec![("start".to_string(), TypeDescriptor::u32())])
                .with_method(
                    FunctionSignature::new("increment").with_result(TypeDescriptor::u32()),
                )
                .with_destructor(),
        )
    }

    #[test]
    fn export_table_is_deterministic() {
        let world = WorldDescriptor::compose(vec![], vec![calculator(), counter_interface()])
            .expect("compose");
        let names: Vec<&str> = world
            .export_functions()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "add",
                "[constructor]counter",
                "[method]counter.increment",
                "[resource-drop]counter",
            ]
        );
    }

    #[test]
    fn duplicate_interface_is_rejected() {
        let err = WorldDescriptor::compose(vec![calculator()], vec![calculator()]).unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateInterface { .. }));
    }

    #[test]
    fn undeclared_resource_reference_is_rejected() {
        let stray = ResourceTypeId::new("demo/other", "widget");
        let iface = InterfaceDescriptor::new("demo/stray").with_function(
            FunctionSignature::new("take").with_param("w", TypeDescriptor::borrow(stray)),
        );
        let err = WorldDescriptor::compose(vec![], vec![iface]).unwrap_err();
        assert!(matches!(err, ComposeError::UnresolvedResource { .. }));
    }

    #[test]
    fn named_types_resolve_across_interfaces() {
        let point = TypeDescriptor::record([
            ("x", TypeDescriptor::s32()),
            ("y", TypeDescriptor::s32()),
        ]);
        let geometry = InterfaceDescriptor::new("demo/geometry").with_type("point", point);
        let world =
            WorldDescriptor::compose(vec![geometry], vec![calculator()]).expect("compose");

        let resolved = world
            .resolve_type("demo/geometry", "point")
            .expect("declared type");
        assert!(matches!(resolved.as_ref(), TypeDescriptor::Record(_)));
        assert!(world.resolve_type("demo/geometry", "segment").is_none());
        assert!(world.resolve_type("demo/physics", "point").is_none());
    }

    #[test]
    fn method_signatures_gain_implicit_receiver() {
        let world =
            WorldDescriptor::compose(vec![], vec![counter_interface()]).expect("compose");
        let (_, method) = world
            .find_export("demo/counters", "[method]counter.increment")
            .expect("method present");
        assert_eq!(method.signature.params().len(), 1);
        assert!(matches!(
            method.signature.params()[0].1.as_ref(),
            TypeDescriptor::Borrow(_)
        ));
    }
}
