//! C4 — Facet Contract Registry.
//!
//! A process-scoped registry of named contracts, each describing the
//! methods and properties a facet must provide. `spark-core` has no direct
//! counterpart (its `contract` module covers cross-cutting runtime
//! primitives like `Deadline`/`Cancellation`, not a structural-contract
//! registry), so this module follows spec §4.4/§9 directly: explicit
//! descriptors consulted at `Verify` time, never runtime reflection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KernelError, KernelResult};
use crate::facet::Facet;

/// A named specification of the methods/properties a facet must provide,
/// plus an optional custom validator for anything the declared-method/
/// property lists can't express (spec §3 "Contract").
pub struct Contract {
    pub name: &'static str,
    pub required_methods: Vec<&'static str>,
    pub required_properties: Vec<&'static str>,
    validate: Option<Arc<dyn Fn(&dyn Facet) -> KernelResult<()> + Send + Sync>>,
}

impl Contract {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            required_methods: Vec::new(),
            required_properties: Vec::new(),
            validate: None,
        }
    }

    pub fn requiring_methods(mut self, methods: Vec<&'static str>) -> Self {
        self.required_methods = methods;
        self
    }

    pub fn requiring_properties(mut self, properties: Vec<&'static str>) -> Self {
        self.required_properties = properties;
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&dyn Facet) -> KernelResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validator));
        self
    }
}

/// C4 — process-scoped contract registry. `spark-core`'s source pattern is
/// a global singleton (`defaultContractRegistry`); spec §9 asks that this
/// be kept as a process-wide registry with an explicit constructor and the
/// option to inject a private registry for tests, which is exactly the
/// shape below — no `static`/`OnceCell` singleton, callers own an instance
/// and pass it (or an `Arc` clone of it) down through the builder.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    inner: Arc<RwLock<HashMap<&'static str, Arc<Contract>>>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract. Fails with [`KernelError::Duplicate`] if a
    /// contract of the same name is already registered.
    pub fn register(&self, contract: Contract) -> KernelResult<()> {
        let mut guard = self.inner.write();
        if guard.contains_key(contract.name) {
            return Err(KernelError::Duplicate(contract.name.to_string()));
        }
        guard.insert(contract.name, Arc::new(contract));
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Contract>> {
        self.inner.read().get(name).cloned()
    }

    /// Validate that `facet` satisfies the contract named `name`: every
    /// required method must be declared, every required property must be
    /// declared and resolve to a non-null value, and any custom validator
    /// must pass. Failure lists every missing item in one
    /// [`KernelError::Contract`] (spec §4.4).
    pub fn enforce(&self, name: &str, facet: &dyn Facet) -> KernelResult<()> {
        let contract = self
            .get(name)
            .ok_or_else(|| KernelError::Duplicate(format!("unknown contract `{name}`")))?;

        let declared_methods = facet.declared_methods();
        let declared_properties = facet.declared_properties();

        let mut missing: Vec<String> = Vec::new();
        for method in &contract.required_methods {
            if !declared_methods.contains(method) {
                missing.push(format!("method:{method}"));
            }
        }
        for property in &contract.required_properties {
            let present = declared_properties.contains(property)
                && facet.property(property).is_some();
            if !present {
                missing.push(format!("property:{property}"));
            }
        }
        if !missing.is_empty() {
            return Err(KernelError::Contract {
                contract: contract.name.to_string(),
                missing,
            });
        }
        if let Some(validate) = &contract.validate {
            validate(facet)?;
        }
        Ok(())
    }
}
