//! Runtime catalog of component types, addressed by name.
//!
//! Statically typed code calls [`GameObject::add_component`] directly. Data
//! driven code (scene files, consoles, scripting) only has a name; the catalog
//! maps that name to a registered [`Component`] type. A name that was never
//! registered does not satisfy the component contract and is rejected before
//! the object's registry is touched.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::component::{Component, ComponentTypeId};
use crate::error::ComponentError;
use crate::game_object::GameObject;

type AttachFn = fn(&GameObject) -> Result<(), ComponentError>;

#[derive(Clone, Copy)]
struct CatalogEntry {
    type_id: ComponentTypeId,
    attach: AttachFn,
}

/// Maps component type names to constructors.
#[derive(Default)]
pub struct ComponentCatalog {
    entries: DashMap<&'static str, CatalogEntry>,
}

impl ComponentCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under [`Component::type_name`].
    ///
    /// Returns `false` if the name was already taken.
    pub fn register<T: Component>(&self) -> bool {
        match self.entries.entry(T::type_name()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CatalogEntry {
                    type_id: T::component_type_id(),
                    attach: attach::<T>,
                });
                true
            }
        }
    }

    /// Returns `true` if `name` is a registered component type.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The type id registered under `name`.
    #[must_use]
    pub fn type_id_of(&self, name: &str) -> Option<ComponentTypeId> {
        self.entries.get(name).map(|entry| entry.type_id)
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn attach(
        &self,
        object: &GameObject,
        name: &str,
    ) -> Result<ComponentTypeId, ComponentError> {
        // Copy the entry out so no shard lock is held while handlers run.
        let entry = self
            .entries
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| ComponentError::UnknownType {
                name: name.to_string(),
            })?;
        (entry.attach)(object)?;
        Ok(entry.type_id)
    }
}

impl std::fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("names", &self.names())
            .finish()
    }
}

fn attach<T: Component>(object: &GameObject) -> Result<(), ComponentError> {
    object.add_component::<T>().map(drop)
}
