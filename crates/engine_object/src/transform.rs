//! Parent/child transform hierarchy.
//!
//! Every [`GameObject`] owns exactly one [`Transform`]. A transform stores both
//! its absolute position and its position relative to its parent; every
//! mutation re-derives the other, so either can be read without walking the
//! ancestor chain. The invariants:
//!
//! - with a parent `P`: `position == P.position + local_position`
//! - without a parent: `local_position == position`
//! - `T` is in `P`'s children iff `T`'s parent is `P`, and no transform is its
//!   own ancestor.
//!
//! Moving a transform re-derives the absolute positions of its descendants
//! from their stored local positions, so the first invariant holds for the
//! whole subtree.
//!
//! Parent and child hold each other's objects strongly, so a transform only
//! stops having a parent through [`Transform::set_parent`]. Detaching (which
//! `OnDestroy` does for the destroyed object) breaks the link.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::HierarchyError;
use crate::game_object::{GameObject, WeakGameObject};

/// A shared handle to a hierarchy node. Clones refer to the same node.
#[derive(Clone)]
pub struct Transform {
    node: Arc<TransformNode>,
}

struct TransformNode {
    owner: WeakGameObject,
    state: Mutex<TransformState>,
}

#[derive(Default)]
struct TransformState {
    position: Vec3,
    local_position: Vec3,
    parent: Option<GameObject>,
    children: Vec<GameObject>,
}

impl Transform {
    pub(crate) fn new(owner: WeakGameObject) -> Self {
        Self {
            node: Arc::new(TransformNode {
                owner,
                state: Mutex::new(TransformState::default()),
            }),
        }
    }

    /// Absolute position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.node.state.lock().position
    }

    /// Position relative to the parent (equal to [`position`](Self::position)
    /// for a root).
    #[must_use]
    pub fn local_position(&self) -> Vec3 {
        self.node.state.lock().local_position
    }

    /// Sets the absolute position and re-derives the local one.
    pub fn set_position(&self, position: Vec3) {
        let local_position = match self.parent() {
            Some(parent) => position - parent.position(),
            None => position,
        };
        self.store(position, local_position);
        self.propagate();
    }

    /// Sets the position relative to the parent and re-derives the absolute one.
    pub fn set_local_position(&self, local_position: Vec3) {
        let position = match self.parent() {
            Some(parent) => parent.position() + local_position,
            None => local_position,
        };
        self.store(position, local_position);
        self.propagate();
    }

    /// Moves the transform by `delta` in absolute space.
    pub fn translate(&self, delta: Vec3) {
        self.set_position(self.position() + delta);
    }

    /// The parent transform, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Transform> {
        let parent = self.node.state.lock().parent.clone()?;
        Some(parent.transform().clone())
    }

    /// Returns `true` if the transform has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Iterates over strict ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Transform> + use<> {
        std::iter::successors(self.parent(), Transform::parent)
    }

    /// Re-parents the transform, preserving its absolute position.
    ///
    /// `None` detaches it, making it a root. With `Some(parent)` the transform
    /// leaves its old parent's children, joins `parent`'s, and its local
    /// position is re-derived as `position - parent.position`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::Cycle`] if `parent` is this transform or one of
    /// its descendants, and [`HierarchyError::Detached`] if the owning object
    /// of either transform has already been dropped.
    pub fn set_parent(&self, parent: Option<&Transform>) -> Result<(), HierarchyError> {
        let object = self.game_object().ok_or(HierarchyError::Detached)?;
        let parent_object = parent
            .map(|parent| parent.game_object().ok_or(HierarchyError::Detached))
            .transpose()?;

        if let Some(parent) = parent
            && (parent.ptr_eq(self) || parent.ancestors().any(|t| t.ptr_eq(self)))
        {
            return Err(HierarchyError::Cycle {
                child: self.to_string(),
                parent: parent.to_string(),
            });
        }

        let previous = self.node.state.lock().parent.take();
        if let Some(previous) = &previous {
            previous
                .transform()
                .node
                .state
                .lock()
                .children
                .retain(|child| !child.ptr_eq(&object));
        }

        match parent.zip(parent_object) {
            None => {
                let mut guard = self.node.state.lock();
                let state = &mut *guard;
                state.local_position = state.position;
            }
            Some((parent, parent_object)) => {
                let parent_position = {
                    let mut parent_state = parent.node.state.lock();
                    parent_state.children.push(object);
                    parent_state.position
                };
                let mut guard = self.node.state.lock();
                let state = &mut *guard;
                state.parent = Some(parent_object);
                state.local_position = state.position - parent_position;
            }
        }

        trace!(transform = %self, parent = ?parent.map(ToString::to_string), "re-parented");
        Ok(())
    }

    /// Iterates over the direct children. The sequence is a snapshot taken at
    /// call time; call again to observe later changes.
    #[must_use]
    pub fn children(&self) -> Children {
        Children {
            inner: self.child_objects(),
        }
    }

    /// Iterates over the objects owning the direct children.
    #[must_use]
    pub fn child_objects(&self) -> std::vec::IntoIter<GameObject> {
        self.node.state.lock().children.clone().into_iter()
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.node.state.lock().children.len()
    }

    /// The object owning this transform, if it is still alive.
    #[must_use]
    pub fn game_object(&self) -> Option<GameObject> {
        self.node.owner.upgrade()
    }

    /// Returns `true` if both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Transform) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    fn store(&self, position: Vec3, local_position: Vec3) {
        let mut state = self.node.state.lock();
        state.position = position;
        state.local_position = local_position;
    }

    fn propagate(&self) {
        let (base, children) = {
            let state = self.node.state.lock();
            (state.position, state.children.clone())
        };
        for child in children {
            let transform = child.transform();
            {
                let mut guard = transform.node.state.lock();
                let state = &mut *guard;
                state.position = base + state.local_position;
            }
            transform.propagate();
        }
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Transform {}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node.state.lock();
        f.debug_struct("Transform")
            .field("position", &state.position)
            .field("local_position", &state.local_position)
            .field("children", &state.children.len())
            .finish()
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.game_object() {
            Some(object) => write!(f, "transform of {object}"),
            None => f.write_str("detached transform"),
        }
    }
}

/// Iterator over a transform's direct children.
#[derive(Debug)]
pub struct Children {
    inner: std::vec::IntoIter<GameObject>,
}

impl Iterator for Children {
    type Item = Transform;

    fn next(&mut self) -> Option<Transform> {
        self.inner.next().map(|object| object.transform().clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Children {}
