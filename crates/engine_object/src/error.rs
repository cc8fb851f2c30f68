//! Error types for contract violations.
//!
//! These fail at the call site and are never swallowed. Failures raised by
//! message handlers are plain [`anyhow::Error`]s; the scheduler isolates and
//! logs those instead.

use crate::message::Lifecycle;

/// Errors raised by the per-object component registry.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// A component of this type is already attached to the object.
    #[error("component `{type_name}` is already attached to {object}")]
    Duplicate {
        /// The component type name.
        type_name: &'static str,
        /// Display form of the owning object.
        object: String,
    },

    /// No component of this type is attached to the object.
    #[error("component `{type_name}` is not attached to {object}")]
    Missing {
        /// The component type name.
        type_name: &'static str,
        /// Display form of the owning object.
        object: String,
    },

    /// The name does not refer to a registered component type.
    #[error("`{name}` is not a registered component type")]
    UnknownType {
        /// The name that failed to resolve.
        name: String,
    },

    /// Two distinct Rust types share the same component type name.
    #[error("component slot `{type_name}` holds a different Rust type")]
    TypeMismatch {
        /// The component type name.
        type_name: &'static str,
    },

    /// A service the component depends on has not been provided.
    #[error("required service `{service}` is not registered")]
    MissingService {
        /// The Rust type name of the missing service.
        service: &'static str,
    },

    /// The component's constructor refused to build an instance.
    #[error("failed to construct component `{type_name}`: {reason}")]
    Construction {
        /// The component type name.
        type_name: &'static str,
        /// Why construction failed.
        reason: String,
    },

    /// The component is already borrowed by a handler running on this thread.
    #[error("component `{type_name}` is busy running a handler")]
    Busy {
        /// The component type name.
        type_name: &'static str,
    },

    /// A lifecycle handler failed while the component was being attached.
    #[error("`{message:?}` handler of component `{type_name}` failed")]
    Lifecycle {
        /// The component type name.
        type_name: &'static str,
        /// The verb being delivered.
        message: Lifecycle,
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised when addressing a message to an unsupported target.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Free-form messages can only be addressed to components.
    #[error("cannot send named message `{name}` to game object {object}; address a component")]
    Unsupported {
        /// The message name.
        name: String,
        /// Display form of the object.
        object: String,
    },
}

/// Errors raised when re-parenting transforms.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    /// The new parent is the transform itself or one of its descendants.
    #[error("cannot parent {child} under {parent}: it would create a cycle")]
    Cycle {
        /// Display form of the transform being moved.
        child: String,
        /// Display form of the requested parent.
        parent: String,
    },

    /// The transform's owning object has already been dropped.
    #[error("transform no longer belongs to a live game object")]
    Detached,
}
