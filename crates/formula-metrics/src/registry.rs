//! Named metric methods.
//!
//! A [`MethodRegistry`] maps method names to callables of the form
//! `fn(&Table, &Params) -> Result<MethodOutput, MethodError>`. Registries are plain values that
//! can be built per run and passed to [`crate::generate_metrics`]; when none is passed the lazily
//! created process-wide [`default_registry`] is used.

use crate::error::{MethodError, MetricsError, MetricsResult};
use crate::result::MethodOutput;
use crate::similarity::close_matches;
use crate::table::Table;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

const MAX_SUGGESTIONS: usize = 3;
const SUGGESTION_CUTOFF: f64 = 0.4;

/// Keyword parameters passed to a method invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(serde_json::Map<String, serde_json::Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(serde_json::Value::as_bool)
    }

    /// String parameter that a method cannot run without.
    pub fn require_str(&self, key: &str) -> Result<&str, MethodError> {
        self.get_str(key)
            .ok_or_else(|| format!("missing required string parameter '{key}'").into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

pub type MethodFn =
    Arc<dyn Fn(&Table, &Params) -> Result<MethodOutput, MethodError> + Send + Sync + 'static>;

/// Optional hints attached to a registered method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodMetadata {
    /// Column holding the value when the method returns a table.
    pub value_column: Option<String>,
    pub description: Option<String>,
}

impl MethodMetadata {
    pub fn value_column(column: impl Into<String>) -> Self {
        Self {
            value_column: Some(column.into()),
            description: None,
        }
    }
}

pub struct MetricMethod {
    name: String,
    func: MethodFn,
    metadata: MethodMetadata,
}

impl MetricMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &MethodMetadata {
        &self.metadata
    }

    pub fn value_column(&self) -> Option<&str> {
        self.metadata.value_column.as_deref()
    }

    pub fn call(&self, table: &Table, params: &Params) -> Result<MethodOutput, MethodError> {
        (self.func)(table, params)
    }
}

impl fmt::Debug for MetricMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricMethod")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct MethodRegistry {
    methods: Mutex<BTreeMap<String, Arc<MetricMethod>>>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<MetricMethod>>> {
        match self.methods.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `func` under `name`. Re-registering a name replaces the previous method.
    pub fn register<F>(
        &self,
        name: impl Into<String>,
        func: F,
        metadata: MethodMetadata,
    ) -> MetricsResult<()>
    where
        F: Fn(&Table, &Params) -> Result<MethodOutput, MethodError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MetricsError::MethodRegistration {
                name,
                reason: "method name must not be empty".to_string(),
            });
        }

        let method = Arc::new(MetricMethod {
            name: name.clone(),
            func: Arc::new(func),
            metadata,
        });
        if self.lock().insert(name.clone(), method).is_some() {
            log::warn!("overwriting existing metric method '{name}'");
        }
        log::debug!("registered metric method '{name}'");
        Ok(())
    }

    /// Register a method without metadata.
    pub fn register_fn<F>(&self, name: impl Into<String>, func: F) -> MetricsResult<()>
    where
        F: Fn(&Table, &Params) -> Result<MethodOutput, MethodError> + Send + Sync + 'static,
    {
        self.register(name, func, MethodMetadata::default())
    }

    pub fn get(&self, name: &str) -> MetricsResult<Arc<MetricMethod>> {
        let methods = self.lock();
        if let Some(method) = methods.get(name) {
            return Ok(Arc::clone(method));
        }

        let available: Vec<String> = methods.keys().cloned().collect();
        drop(methods);
        let suggestions = close_matches(
            name,
            available.iter().map(String::as_str),
            MAX_SUGGESTIONS,
            SUGGESTION_CUTOFF,
        );
        Err(MetricsError::MethodNotFound {
            name: name.to_string(),
            available,
            suggestions,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Registered names in sorted order; empty when nothing is registered.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Registered names in sorted order; an empty registry is an error.
    pub fn list_method_names(&self) -> MetricsResult<Vec<String>> {
        let names = self.names();
        if names.is_empty() {
            return Err(MetricsError::EmptyRegistry {
                operation: "list method names".to_string(),
            });
        }
        Ok(names)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        let mut methods = self.lock();
        let n = methods.len();
        methods.clear();
        log::debug!("cleared {n} metric method(s)");
    }
}

/// Process-wide registry used when no explicit registry is supplied.
pub fn default_registry() -> &'static MethodRegistry {
    static REGISTRY: OnceLock<MethodRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MethodRegistry::new)
}

/// Register `func` in the [`default_registry`].
pub fn register_method<F>(name: impl Into<String>, func: F, metadata: MethodMetadata) -> MetricsResult<()>
where
    F: Fn(&Table, &Params) -> Result<MethodOutput, MethodError> + Send + Sync + 'static,
{
    default_registry().register(name, func, metadata)
}
