//! Immutable activity and workflow registries.
//!
//! Both registries are lookup tables built once at process start via a
//! builder and never mutated afterwards. Workers share them behind `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use workloom_types::error::ActivityError;
use workloom_types::task::ActivityOptions;

use crate::workflow::definition::WorkflowDefinition;

// ---------------------------------------------------------------------------
// ActivityHandler
// ---------------------------------------------------------------------------

/// An executable activity.
///
/// Boxed-future signature so handlers can be stored as trait objects in the
/// registry. Handlers receive the task's positional args and return an
/// opaque result value; retry and timeout policy live in the engine, not
/// here.
pub trait ActivityHandler: Send + Sync {
    fn execute(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>>;
}

/// A registered activity: its handler plus declared execution policy.
#[derive(Clone)]
pub struct ActivityRegistration {
    pub handler: Arc<dyn ActivityHandler>,
    pub options: ActivityOptions,
}

// ---------------------------------------------------------------------------
// ActivityRegistry
// ---------------------------------------------------------------------------

/// Builder for `ActivityRegistry`. Registration happens once at startup.
#[derive(Default)]
pub struct ActivityRegistryBuilder {
    entries: HashMap<String, ActivityRegistration>,
}

impl ActivityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity by name. A duplicate name replaces the earlier
    /// registration.
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn ActivityHandler>,
        options: ActivityOptions,
    ) -> Self {
        self.entries
            .insert(name.into(), ActivityRegistration { handler, options });
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Immutable name -> activity lookup table.
#[derive(Clone)]
pub struct ActivityRegistry {
    entries: Arc<HashMap<String, ActivityRegistration>>,
}

impl ActivityRegistry {
    pub fn get(&self, name: &str) -> Option<&ActivityRegistration> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WorkflowRegistry
// ---------------------------------------------------------------------------

/// Builder for `WorkflowRegistry`.
#[derive(Default)]
pub struct WorkflowRegistryBuilder {
    entries: HashMap<String, Arc<dyn WorkflowDefinition>>,
}

impl WorkflowRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition under its own `name()`.
    pub fn register(mut self, definition: Arc<dyn WorkflowDefinition>) -> Self {
        self.entries
            .insert(definition.name().to_string(), definition);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Immutable name -> workflow definition lookup table.
#[derive(Clone)]
pub struct WorkflowRegistry {
    entries: Arc<HashMap<String, Arc<dyn WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkflowDefinition>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
