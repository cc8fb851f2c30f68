//! Service locator consulted when components are constructed.
//!
//! Services are shared, type-keyed values (clocks, input state, the
//! scheduler's [`Registrar`](crate::Registrar), ...) that a component's
//! [`Component::create`](crate::Component::create) may resolve. A missing
//! service surfaces as a [`ComponentError::MissingService`] from
//! `add_component`, not a panic.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ComponentError;

/// A concurrent, type-keyed map of shared services.
#[derive(Default)]
pub struct Services {
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty service map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a service, replacing any previous service of the same type.
    pub fn insert<S: Any + Send + Sync>(&self, service: S) {
        self.insert_arc(Arc::new(service));
    }

    /// Provide an already shared service.
    ///
    /// Returns `true` if a service of the same type was replaced.
    pub fn insert_arc<S: Any + Send + Sync>(&self, service: Arc<S>) -> bool {
        self.entries.insert(TypeId::of::<S>(), service).is_some()
    }

    /// Resolve a service.
    #[must_use]
    pub fn get<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        let entry = self
            .entries
            .get(&TypeId::of::<S>())
            .map(|entry| entry.value().clone())?;
        entry.downcast::<S>().ok()
    }

    /// Resolve a service that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::MissingService`] if no service of type `S`
    /// has been provided.
    pub fn require<S: Any + Send + Sync>(&self) -> Result<Arc<S>, ComponentError> {
        self.get::<S>().ok_or(ComponentError::MissingService {
            service: type_name::<S>(),
        })
    }

    /// Returns `true` if a service of type `S` has been provided.
    #[must_use]
    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<S>())
    }

    /// Withdraw a service. Components already holding it keep their `Arc`.
    pub fn remove<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        let (_, entry) = self.entries.remove(&TypeId::of::<S>())?;
        entry.downcast::<S>().ok()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("len", &self.entries.len())
            .finish()
    }
}
