//! Core [`Component`] trait and the storage that backs it.
//!
//! A component is a capability-typed unit of behaviour owned by exactly one
//! [`GameObject`]. Each object stores at most one instance per
//! [`ComponentTypeId`]; the registry holds type-erased cells and hands out
//! typed [`ComponentRef`] handles on lookup.
//!
//! ## Type identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm, so the same name always produces the same
//! id, independent of compiler version or build.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};

use crate::error::ComponentError;
use crate::game_object::{GameObject, WeakGameObject};
use crate::message::{Handler, Lifecycle, Message, dispatch};
use crate::services::Services;

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

/// State every component carries: the enabled flag and a weak reference to
/// the owning object.
///
/// Concrete components embed one and expose it through [`Component::base`].
/// Cloning a base yields a detached one (disabled, no owner), which is what a
/// [`Component::duplicate`] implementation wants.
#[derive(Debug, Default)]
pub struct ComponentBase {
    enabled: bool,
    owner: WeakGameObject,
}

impl ComponentBase {
    /// A detached, disabled base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the component is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The owning object, if it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<GameObject> {
        self.owner.upgrade()
    }

    pub(crate) fn set_enabled_flag(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Binds the base to a new owner. The component starts disabled; the
    /// registry enables it after `Awake`.
    pub(crate) fn attach(&mut self, owner: &GameObject) {
        self.owner = owner.downgrade();
        self.enabled = false;
    }
}

impl Clone for ComponentBase {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// The component capability contract.
///
/// # Examples
///
/// ```rust
/// use engine_object::{Component, ComponentBase, ComponentError, Handler, Lifecycle, Message, Services};
///
/// #[derive(Default)]
/// struct Health {
///     base: ComponentBase,
///     current: f32,
/// }
///
/// impl Health {
///     fn regenerate(&mut self) -> anyhow::Result<()> {
///         self.current = (self.current + 1.0).min(100.0);
///         Ok(())
///     }
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
///
///     fn create(_services: &Services) -> Result<Self, ComponentError> {
///         Ok(Self { current: 100.0, ..Self::default() })
///     }
///
///     fn base(&self) -> &ComponentBase { &self.base }
///     fn base_mut(&mut self) -> &mut ComponentBase { &mut self.base }
///
///     fn handler(message: Message<'_>) -> Option<Handler<Self>> {
///         match message {
///             Message::Lifecycle(Lifecycle::Update) => Some(Self::regenerate),
///             _ => None,
///         }
///     }
///
///     fn duplicate(&self) -> Self {
///         Self { base: self.base.clone(), current: self.current }
///     }
/// }
/// ```
pub trait Component: Sized + Send + 'static {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }

    /// Builds a fresh instance, resolving dependencies from `services`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::MissingService`] or
    /// [`ComponentError::Construction`] when an instance cannot be built.
    fn create(services: &Services) -> Result<Self, ComponentError>;

    /// The embedded [`ComponentBase`].
    fn base(&self) -> &ComponentBase;

    /// The embedded [`ComponentBase`], mutably.
    fn base_mut(&mut self) -> &mut ComponentBase;

    /// The dispatch table: the handler for `message`, if any.
    fn handler(_message: Message<'_>) -> Option<Handler<Self>> {
        None
    }

    /// Produces an independent instance with equal observable state.
    fn duplicate(&self) -> Self;

    /// Returns `true` if the component is enabled.
    fn is_enabled(&self) -> bool {
        self.base().is_enabled()
    }

    /// The owning object, if it is still alive.
    fn owner(&self) -> Option<GameObject> {
        self.base().owner()
    }

    /// Stores the enabled flag, then sends `OnEnable` or `OnDisable`.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error; the flag is updated regardless.
    fn set_enabled(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.base_mut().set_enabled_flag(enabled);
        dispatch(self, Lifecycle::toggle(enabled).into()).map(drop)
    }
}

/// Owned storage for one component instance.
///
/// The reentrant lock lets a handler running on the simulation thread reach
/// back into its own object; a nested borrow of the *same* component fails
/// with [`ComponentError::Busy`] instead of deadlocking.
pub(crate) struct ComponentCell<T> {
    value: ReentrantMutex<RefCell<T>>,
}

impl<T: Component> ComponentCell<T> {
    fn new(value: T) -> Self {
        Self {
            value: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ComponentError> {
        let guard = self.value.lock();
        let value = guard.try_borrow().map_err(|_| ComponentError::Busy {
            type_name: T::type_name(),
        })?;
        Ok(f(&value))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, ComponentError> {
        let guard = self.value.lock();
        let mut value = guard.try_borrow_mut().map_err(|_| ComponentError::Busy {
            type_name: T::type_name(),
        })?;
        Ok(f(&mut value))
    }
}

/// Object-safe view of a [`ComponentCell`], stored in the registry.
pub(crate) trait ErasedComponent: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn send(&self, message: Message<'_>) -> anyhow::Result<()>;

    fn set_enabled(&self, enabled: bool) -> anyhow::Result<()>;

    fn duplicate_for(&self, owner: &GameObject) -> Result<Arc<dyn ErasedComponent>, ComponentError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> ErasedComponent for ComponentCell<T> {
    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn send(&self, message: Message<'_>) -> anyhow::Result<()> {
        self.with_mut(|component| dispatch(component, message))?
            .map(drop)
    }

    fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.with_mut(|component| component.set_enabled(enabled))?
    }

    fn duplicate_for(&self, owner: &GameObject) -> Result<Arc<dyn ErasedComponent>, ComponentError> {
        let mut copy = self.with(T::duplicate)?;
        copy.base_mut().attach(owner);
        Ok(Arc::new(ComponentCell::new(copy)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A shared, typed handle to a component attached to a [`GameObject`].
pub struct ComponentRef<T: Component> {
    cell: Arc<ComponentCell<T>>,
}

impl<T: Component> ComponentRef<T> {
    pub(crate) fn new(component: T) -> Self {
        Self {
            cell: Arc::new(ComponentCell::new(component)),
        }
    }

    pub(crate) fn erased(&self) -> Arc<dyn ErasedComponent> {
        self.cell.clone()
    }

    pub(crate) fn downcast(slot: Arc<dyn ErasedComponent>) -> Result<Self, ComponentError> {
        slot.into_any()
            .downcast::<ComponentCell<T>>()
            .map(|cell| Self { cell })
            .map_err(|_| ComponentError::TypeMismatch {
                type_name: T::type_name(),
            })
    }

    /// Runs `f` with shared access to the component.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Busy`] if the component is mutably borrowed
    /// by a handler on this thread.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ComponentError> {
        self.cell.with(f)
    }

    /// Runs `f` with exclusive access to the component.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Busy`] if the component is already borrowed
    /// on this thread.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, ComponentError> {
        self.cell.with_mut(f)
    }

    /// Delivers a lifecycle verb to the component.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error, or [`ComponentError::Busy`].
    pub fn send_message(&self, verb: Lifecycle) -> anyhow::Result<()> {
        self.cell.send(verb.into())
    }

    /// Delivers a free-form message to the component. Unknown names are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error, or [`ComponentError::Busy`].
    pub fn send_named(&self, name: &str) -> anyhow::Result<()> {
        self.cell.send(Message::named(name))
    }

    /// Enables or disables the component, sending `OnEnable`/`OnDisable`.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error, or [`ComponentError::Busy`].
    pub fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        ErasedComponent::set_enabled(&*self.cell, enabled)
    }

    /// Returns `true` if the component is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Busy`] if the component is mutably borrowed.
    pub fn is_enabled(&self) -> Result<bool, ComponentError> {
        self.with(T::is_enabled)
    }

    /// The owning object, if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Busy`] if the component is mutably borrowed.
    pub fn owner(&self) -> Result<Option<GameObject>, ComponentError> {
        self.with(T::owner)
    }

    /// Returns `true` if both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Component> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Component> fmt::Debug for ComponentRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("type_name", &T::type_name())
            .finish_non_exhaustive()
    }
}
