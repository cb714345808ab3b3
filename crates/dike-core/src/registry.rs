//! Adapter registries.
//!
//! A registry maps adapter names to descriptors that build fresh adapter
//! instances. Inputs and sinks live in two separate registries bundled in
//! [`Registries`], which the composition root constructs and fills before
//! composing a pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::adapter::{Input, Sink};

type Factory<T> = dyn Fn() -> Box<T> + Send + Sync;

/// A named factory for adapter instances.
pub struct Descriptor<T: ?Sized> {
    name: String,
    factory: Arc<Factory<T>>,
}

/// Descriptor of an input adapter.
pub type InputDescriptor = Descriptor<dyn Input>;

/// Descriptor of a sink adapter.
pub type SinkDescriptor = Descriptor<dyn Sink>;

impl<T: ?Sized> Descriptor<T> {
    /// Creates a descriptor from a name and a factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// The unique adapter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a fresh adapter instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<T> {
        (self.factory)()
    }
}

impl<T: ?Sized> Clone for Descriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Thread-safe name to descriptor mapping.
pub struct Registry<T: ?Sized> {
    adapters: RwLock<HashMap<String, Descriptor<T>>>,
}

/// Registry of input adapters.
pub type InputRegistry = Registry<dyn Input>;

/// Registry of sink adapters.
pub type SinkRegistry = Registry<dyn Sink>;

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `descriptor` under its name.
    ///
    /// If the name is taken the previous descriptor is replaced and returned.
    pub fn register(&self, descriptor: Descriptor<T>) -> Option<Descriptor<T>> {
        let name = descriptor.name.clone();
        let replaced = self.adapters.write().insert(name.clone(), descriptor);
        if replaced.is_some() {
            warn!(adapter = %name, "adapter registered twice, keeping the latest");
        } else {
            debug!(adapter = %name, "adapter registered");
        }
        replaced
    }

    /// Returns a copy of the current mapping, ordered by name.
    ///
    /// Later registrations are not reflected in the returned map.
    #[must_use]
    pub fn adapters(&self) -> BTreeMap<String, Descriptor<T>> {
        self.adapters
            .read()
            .iter()
            .map(|(name, descriptor)| (name.clone(), descriptor.clone()))
            .collect()
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }
}

/// The input and sink registries of one process.
#[derive(Debug, Default)]
pub struct Registries {
    /// Input adapters.
    pub inputs: InputRegistry,
    /// Sink adapters.
    pub sinks: SinkRegistry,
}

impl Registries {
    /// Creates empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
