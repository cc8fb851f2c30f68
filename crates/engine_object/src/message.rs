//! Message dispatch.
//!
//! A message is either one of the fixed [`Lifecycle`] verbs or a free-form
//! name. Each component type declares its dispatch table through
//! [`Component::handler`]; a message with no entry in the table is a silent
//! no-op.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::Component;

/// The fixed set of lifecycle verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Sent once when a component is attached, and by the scheduler on registration.
    Awake,
    /// Sent when a component is enabled or its object is activated.
    OnEnable,
    /// Sent when a component is disabled or its object is deactivated.
    OnDisable,
    /// Sent once per frame to enabled components of active objects.
    Update,
    /// Sent before a component or object is dropped.
    OnDestroy,
}

impl Lifecycle {
    /// Every verb, in declaration order.
    pub const ALL: [Lifecycle; 5] = [
        Lifecycle::Awake,
        Lifecycle::OnEnable,
        Lifecycle::OnDisable,
        Lifecycle::Update,
        Lifecycle::OnDestroy,
    ];

    /// The verb's handler name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Lifecycle::Awake => "Awake",
            Lifecycle::OnEnable => "OnEnable",
            Lifecycle::OnDisable => "OnDisable",
            Lifecycle::Update => "Update",
            Lifecycle::OnDestroy => "OnDestroy",
        }
    }

    /// Looks up a verb by its handler name (case-sensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.name() == name)
    }

    /// `OnEnable` for `true`, `OnDisable` for `false`.
    #[must_use]
    pub const fn toggle(enabled: bool) -> Self {
        if enabled {
            Lifecycle::OnEnable
        } else {
            Lifecycle::OnDisable
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message addressed to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    /// One of the lifecycle verbs.
    Lifecycle(Lifecycle),
    /// A free-form message name.
    Named(&'a str),
}

impl<'a> Message<'a> {
    /// Builds a message from a name. Names that spell a lifecycle verb resolve
    /// to that verb, so `"Update"` reaches the same handler as
    /// [`Lifecycle::Update`].
    #[must_use]
    pub fn named(name: &'a str) -> Self {
        match Lifecycle::from_name(name) {
            Some(verb) => Message::Lifecycle(verb),
            None => Message::Named(name),
        }
    }

    /// The handler name this message resolves against.
    #[must_use]
    pub fn name(&self) -> &'a str {
        match *self {
            Message::Lifecycle(verb) => verb.name(),
            Message::Named(name) => name,
        }
    }
}

impl From<Lifecycle> for Message<'_> {
    fn from(verb: Lifecycle) -> Self {
        Message::Lifecycle(verb)
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message handler: a plain function over the component.
pub type Handler<T> = fn(&mut T) -> anyhow::Result<()>;

/// Delivers `message` to `target`.
///
/// Returns `Ok(true)` if a handler ran and `Ok(false)` if the component has
/// no handler for the message. Disabled components ignore
/// [`Lifecycle::Update`].
///
/// # Errors
///
/// Propagates the handler's error.
pub fn dispatch<T: Component>(target: &mut T, message: Message<'_>) -> anyhow::Result<bool> {
    if message == Message::Lifecycle(Lifecycle::Update) && !target.is_enabled() {
        return Ok(false);
    }
    match T::handler(message) {
        Some(handler) => {
            handler(target)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
