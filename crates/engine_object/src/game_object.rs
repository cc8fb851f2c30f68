//! The [`GameObject`]: a transform, a component registry, and an active flag.
//!
//! Objects are shared handles; clones refer to the same object. Lifecycle
//! verbs fan out as follows:
//!
//! | verb                    | delivered to                                       |
//! |-------------------------|----------------------------------------------------|
//! | `Awake`                 | the object only (components are awoken on attach)  |
//! | `OnEnable`, `OnDisable` | every attached component                           |
//! | `Update`                | active children first (depth-first), then components |
//! | `OnDestroy`             | every attached component; then the transform detaches |
//!
//! An inactive child is skipped together with its whole subtree. `OnDestroy`
//! never cascades to children here; the scheduler decides what to destroy.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::catalog::ComponentCatalog;
use crate::component::{Component, ComponentRef, ComponentTypeId, ErasedComponent};
use crate::error::{ComponentError, MessageError};
use crate::id::{GameObjectId, next_object_id};
use crate::message::{Lifecycle, Message};
use crate::services::Services;
use crate::transform::Transform;

type Registry = HashMap<ComponentTypeId, Arc<dyn ErasedComponent>>;

struct ObjectInner {
    id: GameObjectId,
    name: String,
    active: AtomicBool,
    transform: Transform,
    components: RwLock<Registry>,
    services: Arc<Services>,
}

/// An addressable entity aggregating a [`Transform`], a component registry,
/// and an active flag.
///
/// Objects start inactive; the scheduler activates them when they are
/// drained from its pending-add set.
#[derive(Clone)]
pub struct GameObject {
    inner: Arc<ObjectInner>,
}

/// A non-owning reference to a [`GameObject`].
#[derive(Clone, Default)]
pub struct WeakGameObject {
    inner: Weak<ObjectInner>,
}

impl WeakGameObject {
    /// The owning handle, if the object is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<GameObject> {
        self.inner.upgrade().map(|inner| GameObject { inner })
    }
}

impl fmt::Debug for WeakGameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakGameObject({object})"),
            None => f.write_str("WeakGameObject(<dropped>)"),
        }
    }
}

impl GameObject {
    /// Create an object with its own, empty service map.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_services(name, Arc::new(Services::new()))
    }

    /// Create an object whose components resolve dependencies from `services`.
    #[must_use]
    pub fn with_services(name: impl Into<String>, services: Arc<Services>) -> Self {
        let name = name.into();
        let inner = Arc::new_cyclic(|weak| ObjectInner {
            id: next_object_id(),
            name,
            active: AtomicBool::new(false),
            transform: Transform::new(WeakGameObject {
                inner: weak.clone(),
            }),
            components: RwLock::new(HashMap::new()),
            services,
        });
        Self { inner }
    }

    /// The object's unique id.
    #[must_use]
    pub fn id(&self) -> GameObjectId {
        self.inner.id
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The object's transform.
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.inner.transform
    }

    /// The service map components are constructed from.
    #[must_use]
    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    /// The parent object, if any.
    #[must_use]
    pub fn parent(&self) -> Option<GameObject> {
        self.transform().parent()?.game_object()
    }

    /// Iterates over direct child objects (a snapshot).
    #[must_use]
    pub fn children(&self) -> std::vec::IntoIter<GameObject> {
        self.transform().child_objects()
    }

    /// Returns the object's own active flag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Sets the active flag, then sends `OnEnable` or `OnDisable` to every
    /// component. Children are not toggled.
    ///
    /// # Errors
    ///
    /// Propagates the first component handler failure. The flag is set
    /// regardless.
    pub fn set_active(&self, active: bool) -> anyhow::Result<()> {
        self.inner.active.store(active, Ordering::Release);
        self.send_message(Lifecycle::toggle(active))
    }

    /// A non-owning reference to this object.
    #[must_use]
    pub fn downgrade(&self) -> WeakGameObject {
        WeakGameObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &GameObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Constructs a `T`, attaches it, sends it `Awake`, then enables it (which
    /// sends `OnEnable`). The component is visible to lookups as soon as it is
    /// attached.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::Duplicate`] if a `T` is already attached.
    /// - Any error from [`Component::create`]; the registry is unchanged.
    /// - [`ComponentError::Lifecycle`] if `Awake` or `OnEnable` fails; the
    ///   component stays attached.
    pub fn add_component<T: Component>(&self) -> Result<ComponentRef<T>, ComponentError> {
        let type_id = T::component_type_id();
        if self.has_component_id(type_id) {
            return Err(self.duplicate_error::<T>());
        }

        let mut component = T::create(&self.inner.services)?;
        component.base_mut().attach(self);
        let handle = ComponentRef::new(component);

        {
            let mut components = self.inner.components.write();
            if components.contains_key(&type_id) {
                return Err(self.duplicate_error::<T>());
            }
            components.insert(type_id, handle.erased());
        }
        debug!(object = %self, component = T::type_name(), "component added");

        handle
            .send_message(Lifecycle::Awake)
            .map_err(|source| ComponentError::Lifecycle {
                type_name: T::type_name(),
                message: Lifecycle::Awake,
                source,
            })?;
        handle
            .set_enabled(true)
            .map_err(|source| ComponentError::Lifecycle {
                type_name: T::type_name(),
                message: Lifecycle::OnEnable,
                source,
            })?;
        Ok(handle)
    }

    /// Attaches the component registered in `catalog` under `name`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::UnknownType`] if `name` is not registered (the
    /// registry is unchanged), otherwise as [`add_component`](Self::add_component).
    pub fn add_component_named(
        &self,
        catalog: &ComponentCatalog,
        name: &str,
    ) -> Result<ComponentTypeId, ComponentError> {
        catalog.attach(self, name)
    }

    /// Looks up the attached `T`.
    #[must_use]
    pub fn get_component<T: Component>(&self) -> Option<ComponentRef<T>> {
        match self.get_required_component::<T>() {
            Ok(handle) => Some(handle),
            Err(ComponentError::Missing { .. }) => None,
            Err(err) => {
                warn!(object = %self, error = %err, "component lookup failed");
                None
            }
        }
    }

    /// Looks up the attached `T`, failing if absent.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Missing`] if no `T` is attached, or
    /// [`ComponentError::TypeMismatch`] if the slot holds another Rust type
    /// with the same type name.
    pub fn get_required_component<T: Component>(&self) -> Result<ComponentRef<T>, ComponentError> {
        let slot = self
            .inner
            .components
            .read()
            .get(&T::component_type_id())
            .cloned()
            .ok_or_else(|| ComponentError::Missing {
                type_name: T::type_name(),
                object: self.to_string(),
            })?;
        ComponentRef::downcast(slot)
    }

    /// Returns `true` if a `T` is attached.
    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        self.has_component_id(T::component_type_id())
    }

    /// Returns `true` if a component with this type id is attached.
    #[must_use]
    pub fn has_component_id(&self, type_id: ComponentTypeId) -> bool {
        self.inner.components.read().contains_key(&type_id)
    }

    /// Sends `OnDestroy` to the attached `T`, then detaches it.
    ///
    /// Returns whether the component was removed from the registry. A failing
    /// `OnDestroy` handler is logged and does not prevent removal.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Missing`] if no `T` is attached.
    pub fn remove_component<T: Component>(&self) -> Result<bool, ComponentError> {
        let handle = self.get_required_component::<T>()?;
        if let Err(err) = handle.send_message(Lifecycle::OnDestroy) {
            warn!(object = %self, component = T::type_name(), error = ?err, "OnDestroy failed during removal");
        }
        let removed = self
            .inner
            .components
            .write()
            .remove(&T::component_type_id())
            .is_some();
        debug!(object = %self, component = T::type_name(), removed, "component removed");
        Ok(removed)
    }

    /// Number of attached components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner.components.read().len()
    }

    /// Type ids of the attached components, sorted.
    #[must_use]
    pub fn component_type_ids(&self) -> Vec<ComponentTypeId> {
        let mut ids: Vec<_> = self.inner.components.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Delivers a lifecycle verb, fanning out as described in the module docs.
    ///
    /// # Errors
    ///
    /// Propagates the first handler failure; remaining recipients are skipped.
    pub fn send_message(&self, verb: Lifecycle) -> anyhow::Result<()> {
        match verb {
            Lifecycle::Awake => {
                trace!(object = %self, "awake");
                Ok(())
            }
            Lifecycle::OnEnable | Lifecycle::OnDisable => self.broadcast(verb.into()),
            Lifecycle::Update => {
                for child in self.children() {
                    if child.is_active() {
                        child.send_message(Lifecycle::Update)?;
                    }
                }
                self.broadcast(verb.into())
            }
            Lifecycle::OnDestroy => {
                let delivered = self.broadcast(verb.into());
                self.transform().set_parent(None)?;
                delivered
            }
        }
    }

    /// Free-form messages cannot be addressed to an object; send them to one
    /// of its components instead.
    ///
    /// # Errors
    ///
    /// Always returns [`MessageError::Unsupported`].
    pub fn send_named(&self, name: &str) -> Result<(), MessageError> {
        Err(MessageError::Unsupported {
            name: name.to_string(),
            object: self.to_string(),
        })
    }

    /// Creates a root copy of this object: same services, absolute position,
    /// and active flag, with a [`Component::duplicate`] of every component.
    /// Each copy is bound to the new object, sent `Awake`, and enabled.
    /// Children are not copied.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Busy`] if a component is mutably borrowed, or
    /// [`ComponentError::Lifecycle`] if a copy's `Awake`/`OnEnable` fails.
    pub fn duplicate(&self) -> Result<GameObject, ComponentError> {
        let copy = GameObject::with_services(
            format!("{} (Clone)", self.name()),
            self.inner.services.clone(),
        );
        copy.transform().set_position(self.transform().position());
        copy.inner.active.store(self.is_active(), Ordering::Release);

        let slots: Vec<_> = self
            .inner
            .components
            .read()
            .iter()
            .map(|(type_id, slot)| (*type_id, slot.clone()))
            .collect();
        for (type_id, slot) in slots {
            let duplicate = slot.duplicate_for(&copy)?;
            copy.inner
                .components
                .write()
                .insert(type_id, duplicate.clone());

            let type_name = duplicate.type_name();
            duplicate
                .send(Lifecycle::Awake.into())
                .map_err(|source| ComponentError::Lifecycle {
                    type_name,
                    message: Lifecycle::Awake,
                    source,
                })?;
            duplicate
                .set_enabled(true)
                .map_err(|source| ComponentError::Lifecycle {
                    type_name,
                    message: Lifecycle::OnEnable,
                    source,
                })?;
        }

        debug!(original = %self, copy = %copy, "object duplicated");
        Ok(copy)
    }

    fn broadcast(&self, message: Message<'_>) -> anyhow::Result<()> {
        let slots: Vec<_> = self.inner.components.read().values().cloned().collect();
        for slot in slots {
            slot.send(message)
                .with_context(|| format!("{message} on `{}` of {self}", slot.type_name()))?;
        }
        Ok(())
    }

    fn duplicate_error<T: Component>(&self) -> ComponentError {
        ComponentError::Duplicate {
            type_name: T::type_name(),
            object: self.to_string(),
        }
    }
}

impl PartialEq for GameObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for GameObject {}

impl fmt::Display for GameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner.name, self.inner.id)
    }
}

impl fmt::Debug for GameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameObject")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("active", &self.is_active())
            .field("components", &self.component_count())
            .finish()
    }
}
