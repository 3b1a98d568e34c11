//! Named backend constructors.
//!
//! A [`BackendRegistry`] maps backend names to constructors so that a queue
//! can pick its storage from configuration. There is no global registry;
//! callers own one and pass it where it is needed.
//!
//! ```rust
//! use persisting_core::{BackendContext, BackendRegistry};
//!
//! let registry = BackendRegistry::with_defaults();
//! assert_eq!(registry.list(), vec!["columnar", "memory", "persisting"]);
//!
//! let backend = registry
//!     .create("memory", &BackendContext::new("bucket-1"))
//!     .unwrap();
//! assert_eq!(backend.name(), "memory");
//! ```

use crate::backend::{PartitionBackend, QueueBackend};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a constructor gets to build one partition.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Partition identifier.
    pub bucket_id: String,
    /// Directory for durable backends.
    pub storage_path: Option<PathBuf>,
    /// Backend options, parsed with [`Config::from_options`].
    pub options: serde_json::Value,
}

impl BackendContext {
    /// A context with no storage path and no options.
    pub fn new(bucket_id: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            storage_path: None,
            options: serde_json::Value::Null,
        }
    }

    /// Sets the storage directory.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Sets the backend options.
    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    fn require_storage_path(&self, backend: &str) -> CoreResult<&Path> {
        self.storage_path.as_deref().ok_or_else(|| {
            CoreError::invalid_config(format!("backend '{backend}' requires a storage path"))
        })
    }

    fn has_option(&self, key: &str) -> bool {
        self.options.get(key).is_some()
    }
}

/// Builds a backend from a context.
pub type BackendConstructor =
    Arc<dyn Fn(&BackendContext) -> CoreResult<Box<dyn QueueBackend>> + Send + Sync>;

/// Backend constructors by name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `memory`, `columnar` and `persisting` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |ctx| {
            let config = Config::from_options(&ctx.options)?;
            Ok(Box::new(PartitionBackend::memory(ctx.bucket_id.clone(), config)?)
                as Box<dyn QueueBackend>)
        });
        registry.register("columnar", |ctx| {
            let path = ctx.require_storage_path("columnar")?;
            let mut config = Config::from_options(&ctx.options)?;
            if !ctx.has_option("enable_wal") {
                config.enable_wal = false;
            }
            Ok(Box::new(PartitionBackend::columnar(ctx.bucket_id.clone(), path, config)?)
                as Box<dyn QueueBackend>)
        });
        registry.register("persisting", |ctx| {
            let path = ctx.require_storage_path("persisting")?;
            let config = Config::from_options(&ctx.options)?;
            Ok(Box::new(PartitionBackend::persisting(ctx.bucket_id.clone(), path, config)?)
                as Box<dyn QueueBackend>)
        });
        registry
    }

    /// Registers a constructor, replacing any previous one with that name.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&BackendContext) -> CoreResult<Box<dyn QueueBackend>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// The constructor registered under `name`.
    pub fn get(&self, name: &str) -> Option<BackendConstructor> {
        self.constructors.get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Builds the backend registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownBackend`] for an unregistered name, or
    /// whatever the constructor returns.
    pub fn create(&self, name: &str, ctx: &BackendContext) -> CoreResult<Box<dyn QueueBackend>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| CoreError::UnknownBackend {
                name: name.to_string(),
                available: self.list().into_iter().map(String::from).collect(),
            })?;
        constructor(ctx)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persisting_codec::Record;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn unknown_backend_lists_available() {
        let registry = BackendRegistry::with_defaults();
        let err = registry
            .create("parquet", &BackendContext::new("b1"))
            .err().unwrap();
        match err {
            CoreError::UnknownBackend { name, available } => {
                assert_eq!(name, "parquet");
                assert_eq!(available, vec!["columnar", "memory", "persisting"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn durable_backends_need_a_path() {
        let registry = BackendRegistry::with_defaults();
        let result = registry.create("persisting", &BackendContext::new("b1"));
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn columnar_defaults_to_no_wal() {
        let temp = tempdir().unwrap();
        let registry = BackendRegistry::with_defaults();

        let ctx = BackendContext::new("b1").with_storage_path(temp.path().join("plain"));
        let backend = registry.create("columnar", &ctx).unwrap();
        assert!(!backend.stats().wal_enabled);

        let ctx = BackendContext::new("b1")
            .with_storage_path(temp.path().join("logged"))
            .with_options(json!({ "enable_wal": true }));
        let backend = registry.create("columnar", &ctx).unwrap();
        assert!(backend.stats().wal_enabled);
    }

    #[test]
    fn options_reach_the_backend() {
        let temp = tempdir().unwrap();
        let registry = BackendRegistry::with_defaults();
        let ctx = BackendContext::new("b1")
            .with_storage_path(temp.path())
            .with_options(json!({ "batch_size": 2, "wal_sync_interval": 0 }));
        let backend = registry.create("persisting", &ctx).unwrap();

        backend.put(Record::new().with("id", "1")).unwrap();
        backend.put(Record::new().with("id", "2")).unwrap();
        let stats = backend.stats();
        assert_eq!(stats.sync_mode, "sync");
        assert_eq!(stats.persisted_count, 2);
    }

    #[test]
    fn custom_constructor() {
        let mut registry = BackendRegistry::new();
        assert!(!registry.contains("mem"));
        registry.register("mem", |ctx| {
            Ok(Box::new(PartitionBackend::memory(ctx.bucket_id.clone(), Config::default())?)
                as Box<dyn QueueBackend>)
        });
        assert!(registry.contains("mem"));
        assert!(registry.get("mem").is_some());

        let backend = registry.create("mem", &BackendContext::new("x")).unwrap();
        assert_eq!(backend.bucket_id(), "x");
    }
}
