//! # engine_object
//!
//! The runtime core of the engine's object model: game objects, their
//! components, the transform hierarchy they form, and the scheduler that
//! brings them to life frame by frame.
//!
//! This crate provides:
//!
//! - [`GameObject`]: a named object with a [`Transform`], an active flag, and
//!   at most one component per type.
//! - [`Component`] trait: the contract gameplay behaviour must satisfy,
//!   including its message dispatch table.
//! - [`Transform`]: parent/child hierarchy with cached absolute and local
//!   positions.
//! - [`GameObjectSystem`]: the lifecycle scheduler with deferred registration,
//!   destroy/add/update passes, and per-object failure isolation.
//! - [`Services`] and [`ComponentCatalog`]: dependency lookup for component
//!   construction, and runtime construction by name.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use engine_object::{EventLog, GameObject, GameObjectSystem, Vec3};
//!
//! let log = Arc::new(EventLog::new());
//! let mut system = GameObjectSystem::new(log.clone());
//!
//! let ship = GameObject::new("ship");
//! let turret = GameObject::new("turret");
//! turret.transform().set_parent(Some(ship.transform())).unwrap();
//! ship.transform().set_position(Vec3::new(10.0, 0.0, 0.0));
//!
//! system.register(&ship);
//! system.register(&turret);
//! let report = system.step();
//!
//! assert_eq!(report.added, 2);
//! assert_eq!(turret.transform().position(), Vec3::new(10.0, 0.0, 0.0));
//! assert_eq!(log.counts(), (2, 0));
//! ```

pub mod catalog;
pub mod component;
pub mod error;
pub mod events;
pub mod game_object;
pub mod id;
pub mod message;
pub mod scheduler;
pub mod services;
pub mod system;
pub mod transform;

pub use catalog::ComponentCatalog;
pub use component::{Component, ComponentBase, ComponentRef, ComponentTypeId};
pub use error::{ComponentError, HierarchyError, MessageError};
pub use events::{EventLog, EventSink, NullSink, ObjectEvent};
pub use game_object::{GameObject, WeakGameObject};
pub use glam::Vec3;
pub use id::{GameObjectId, IdAllocator};
pub use message::{Handler, Lifecycle, Message, dispatch};
pub use scheduler::{FrameReport, GameObjectSystem, GameObjectSystemConfig, Registrar};
pub use services::Services;
pub use system::System;
pub use transform::{Children, Transform};
