//! Name to implementation lookup used for dispatch.
//!
//! The catalog is built explicitly and handed to the engine. There is no
//! process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::errors::{EngineError, EngineResult};
use crate::operation::{DynOperation, NoopOperation, Operation};

#[derive(Clone, Default)]
pub struct OperationCatalog {
    operations: HashMap<String, Arc<dyn DynOperation>>,
    lenient: bool,
}

impl fmt::Debug for OperationCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationCatalog")
            .field("operations", &self.names())
            .field("lenient", &self.lenient)
            .finish()
    }
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation under its own name, replacing any previous entry.
    pub fn register<O: Operation>(&mut self, operation: O) -> &mut Self {
        let name = Operation::name(&operation).to_string();
        self.operations.insert(name, Arc::new(operation));
        self
    }

    pub fn with<O: Operation>(mut self, operation: O) -> Self {
        self.register(operation);
        self
    }

    /// In lenient mode unknown names resolve to a [`NoopOperation`] instead of an error.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn DynOperation>> {
        self.operations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Total resolution used by the engine.
    pub fn resolve(&self, name: &str) -> EngineResult<Arc<dyn DynOperation>> {
        if let Some(op) = self.lookup(name) {
            return Ok(op);
        }
        if self.lenient {
            warn!(operation = name, "unknown operation, substituting no-op");
            return Ok(Arc::new(NoopOperation::new(name)));
        }
        Err(EngineError::UnknownOperation {
            name: name.to_string(),
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
