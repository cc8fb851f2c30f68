//! The game-object lifecycle scheduler.
//!
//! [`GameObjectSystem`] owns the authoritative active set and drives the
//! per-frame passes. Registration and destruction requests arrive through a
//! [`Registrar`] from any thread and are parked in two pending sets, each
//! behind its own lock:
//!
//! 1. **Destroy pass**: snapshot pending-remove, then deliver `OnDestroy` to
//!    each snapshotted object and drop it from the active set. Requests made
//!    while the pass runs wait for the next frame.
//! 2. **Add pass**: drain pending-add, activate each object (`OnEnable`), and
//!    insert it into the active set.
//! 3. **Update pass**: deliver `Update` to every active root object; children
//!    are reached through their parents.
//!
//! Locks are held only while copying or draining a pending set, never while
//! handler code runs. Handler failures, including panics, are logged per
//! object and never abort a pass.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use crate::events::{EventSink, ObjectEvent};
use crate::game_object::GameObject;
use crate::id::GameObjectId;
use crate::message::Lifecycle;
use crate::system::System;

type ObjectSet = BTreeMap<GameObjectId, GameObject>;

/// Configuration for a [`GameObjectSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameObjectSystemConfig {
    /// Ordering value reported to the frame loop.
    pub priority: i32,
    /// Convert handler panics into logged failures instead of unwinding
    /// through the frame.
    pub catch_panics: bool,
}

impl Default for GameObjectSystemConfig {
    fn default() -> Self {
        Self {
            priority: GameObjectSystem::PRIORITY,
            catch_panics: true,
        }
    }
}

impl GameObjectSystemConfig {
    /// Override the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Enable or disable panic isolation.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }
}

#[derive(Default)]
struct PendingSets {
    add: Mutex<ObjectSet>,
    remove: Mutex<ObjectSet>,
}

/// A cloneable handle for queueing objects into or out of a
/// [`GameObjectSystem`]. Safe to use from any thread, including from
/// handlers running inside a frame.
#[derive(Clone)]
pub struct Registrar {
    pending: Arc<PendingSets>,
    catch_panics: bool,
}

impl Registrar {
    /// Sends `Awake` to `object` on the calling thread, then queues it for
    /// activation on the next frame.
    ///
    /// Object-level `Awake` reaches no component handler (components are
    /// awoken on attach). A failing or panicking `Awake` is logged and does
    /// not prevent queueing.
    pub fn register(&self, object: &GameObject) {
        self.enqueue(object, || object.send_message(Lifecycle::Awake));
    }

    fn enqueue(&self, object: &GameObject, awake: impl FnOnce() -> anyhow::Result<()>) {
        deliver(self.catch_panics, object, Lifecycle::Awake, awake);
        self.pending.add.lock().insert(object.id(), object.clone());
        trace!(object = %object, "queued for activation");
    }

    /// Queues `object` for destruction on the next frame. Queueing an object
    /// twice is a no-op.
    pub fn unregister(&self, object: &GameObject) {
        self.pending
            .remove
            .lock()
            .entry(object.id())
            .or_insert_with(|| object.clone());
        trace!(object = %object, "queued for destruction");
    }

    /// Objects waiting for activation.
    #[must_use]
    pub fn pending_add_count(&self) -> usize {
        self.pending.add.lock().len()
    }

    /// Objects waiting for destruction.
    #[must_use]
    pub fn pending_remove_count(&self) -> usize {
        self.pending.remove.lock().len()
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("pending_add", &self.pending_add_count())
            .field("pending_remove", &self.pending_remove_count())
            .finish()
    }
}

/// What a single [`GameObjectSystem::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The frame number, starting at 1.
    pub frame: u64,
    /// Objects sent `OnDestroy` by the destroy pass.
    pub destroyed: usize,
    /// Objects inserted into the active set.
    pub added: usize,
    /// Root objects whose `Update` completed.
    pub updated: usize,
    /// Handler failures caught during the frame.
    pub failures: usize,
}

/// The lifecycle scheduler.
pub struct GameObjectSystem {
    config: GameObjectSystemConfig,
    active: ObjectSet,
    registrar: Registrar,
    sink: Arc<dyn EventSink>,
    frame: u64,
}

impl GameObjectSystem {
    /// Default priority: ahead of gameplay systems.
    pub const PRIORITY: i32 = -100;

    /// Create a scheduler reporting transitions to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_config(sink, GameObjectSystemConfig::default())
    }

    /// Create a scheduler with an explicit configuration.
    #[must_use]
    pub fn with_config(sink: Arc<dyn EventSink>, config: GameObjectSystemConfig) -> Self {
        Self {
            config,
            active: BTreeMap::new(),
            registrar: Registrar {
                pending: Arc::new(PendingSets::default()),
                catch_panics: config.catch_panics,
            },
            sink,
            frame: 0,
        }
    }

    /// The scheduler's configuration.
    #[must_use]
    pub fn config(&self) -> &GameObjectSystemConfig {
        &self.config
    }

    /// A handle for registering and unregistering objects.
    #[must_use]
    pub fn registrar(&self) -> Registrar {
        self.registrar.clone()
    }

    /// Shorthand for [`Registrar::register`].
    pub fn register(&self, object: &GameObject) {
        self.registrar.register(object);
    }

    /// Shorthand for [`Registrar::unregister`].
    pub fn unregister(&self, object: &GameObject) {
        self.registrar.unregister(object);
    }

    /// Number of frames stepped so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Size of the active set.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if `object` is in the active set.
    #[must_use]
    pub fn is_active(&self, object: &GameObject) -> bool {
        self.active.contains_key(&object.id())
    }

    /// The active set, in creation order.
    #[must_use]
    pub fn active_objects(&self) -> Vec<GameObject> {
        self.active.values().cloned().collect()
    }

    /// Objects waiting for activation.
    #[must_use]
    pub fn pending_add_count(&self) -> usize {
        self.registrar.pending_add_count()
    }

    /// Objects waiting for destruction.
    #[must_use]
    pub fn pending_remove_count(&self) -> usize {
        self.registrar.pending_remove_count()
    }

    /// Runs the destroy, add, and update passes for one frame.
    pub fn step(&mut self) -> FrameReport {
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        self.destroy_pass(&mut report);
        self.add_pass(&mut report);
        self.update_pass(&mut report);

        debug!(
            frame = report.frame,
            destroyed = report.destroyed,
            added = report.added,
            updated = report.updated,
            failures = report.failures,
            active = self.active.len(),
            "frame complete"
        );
        report
    }

    /// Sends `OnDestroy` to every active root, then empties the active and
    /// pending sets without emitting events. Returns the number of roots
    /// destroyed.
    pub fn shut_down(&mut self) -> usize {
        let catch_panics = self.config.catch_panics;
        let mut destroyed = 0;
        for object in self.active_roots() {
            deliver(catch_panics, &object, Lifecycle::OnDestroy, || {
                object.send_message(Lifecycle::OnDestroy)
            });
            destroyed += 1;
        }

        let active = std::mem::take(&mut self.active).len();
        let pending_add = std::mem::take(&mut *self.registrar.pending.add.lock()).len();
        let pending_remove = std::mem::take(&mut *self.registrar.pending.remove.lock()).len();
        info!(destroyed, active, pending_add, pending_remove, "game objects shut down");
        destroyed
    }

    fn destroy_pass(&mut self, report: &mut FrameReport) {
        let snapshot: Vec<GameObject> = self.registrar.pending.remove.lock().values().cloned().collect();

        for object in snapshot {
            let id = object.id();
            if self.active.contains_key(&id) {
                if !self.deliver(&object, Lifecycle::OnDestroy, || {
                    object.send_message(Lifecycle::OnDestroy)
                }) {
                    report.failures += 1;
                }
                self.registrar.pending.remove.lock().remove(&id);
                self.active.remove(&id);
                self.sink.notify(&ObjectEvent::Removed(object));
                report.destroyed += 1;
                continue;
            }

            let was_pending = self.registrar.pending.add.lock().remove(&id).is_some();
            self.registrar.pending.remove.lock().remove(&id);
            if was_pending {
                // Never activated, so there is no removal to report.
                if !self.deliver(&object, Lifecycle::OnDestroy, || {
                    object.send_message(Lifecycle::OnDestroy)
                }) {
                    report.failures += 1;
                }
                report.destroyed += 1;
            } else {
                trace!(object = %object, "dropped destroy request for unknown object");
            }
        }
    }

    fn add_pass(&mut self, report: &mut FrameReport) {
        let pending = std::mem::take(&mut *self.registrar.pending.add.lock());

        for (id, object) in pending {
            if self.active.contains_key(&id) {
                trace!(object = %object, "already active");
                continue;
            }
            if !self.deliver(&object, Lifecycle::OnEnable, || object.set_active(true)) {
                report.failures += 1;
            }
            self.active.insert(id, object.clone());
            self.sink.notify(&ObjectEvent::Added(object));
            report.added += 1;
        }
    }

    fn update_pass(&mut self, report: &mut FrameReport) {
        for object in self.active_roots() {
            if self.deliver(&object, Lifecycle::Update, || {
                object.send_message(Lifecycle::Update)
            }) {
                report.updated += 1;
            } else {
                report.failures += 1;
            }
        }
    }

    fn active_roots(&self) -> Vec<GameObject> {
        self.active
            .values()
            .filter(|object| object.is_active() && object.transform().is_root())
            .cloned()
            .collect()
    }

    fn deliver(
        &self,
        object: &GameObject,
        verb: Lifecycle,
        handler: impl FnOnce() -> anyhow::Result<()>,
    ) -> bool {
        deliver(self.config.catch_panics, object, verb, handler)
    }
}

impl fmt::Debug for GameObjectSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameObjectSystem")
            .field("config", &self.config)
            .field("frame", &self.frame)
            .field("active", &self.active.len())
            .field("registrar", &self.registrar)
            .finish_non_exhaustive()
    }
}

impl System for GameObjectSystem {
    fn name(&self) -> &str {
        "game_objects"
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        info!(
            priority = self.config.priority,
            catch_panics = self.config.catch_panics,
            "game object system initialized"
        );
        Ok(())
    }

    fn update(&mut self) {
        self.step();
    }

    fn clean_up(&mut self) {
        self.shut_down();
    }
}

/// Runs one handler invocation for `object`, logging any failure. Returns
/// `true` on success.
fn deliver(
    catch_panics: bool,
    object: &GameObject,
    verb: Lifecycle,
    handler: impl FnOnce() -> anyhow::Result<()>,
) -> bool {
    let outcome = if catch_panics {
        panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(&*payload)
            ))
        })
    } else {
        handler()
    };

    match outcome {
        Ok(()) => true,
        Err(err) => {
            error!(
                object_id = %object.id(),
                object = object.name(),
                message = %verb,
                error = ?err,
                "lifecycle handler failed"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::component::{Component, ComponentBase};
    use crate::error::ComponentError;
    use crate::events::EventLog;
    use crate::message::{Handler, Message};
    use crate::services::Services;

    type Journal = Mutex<Vec<String>>;

    /// Appends `<object>:<verb>` to the shared journal.
    #[derive(Default)]
    struct Tracker {
        base: ComponentBase,
        journal: Arc<Journal>,
    }

    impl Tracker {
        fn record(&mut self, verb: Lifecycle) -> anyhow::Result<()> {
            let owner = self
                .owner()
                .map_or_else(|| "?".to_string(), |o| o.name().to_string());
            self.journal.lock().push(format!("{owner}:{verb}"));
            Ok(())
        }
    }

    impl Component for Tracker {
        fn type_name() -> &'static str {
            "Tracker"
        }

        fn create(services: &Services) -> Result<Self, ComponentError> {
            Ok(Self {
                journal: services.require::<Journal>()?,
                ..Self::default()
            })
        }

        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn handler(message: Message<'_>) -> Option<Handler<Self>> {
            match message {
                Message::Lifecycle(Lifecycle::OnEnable) => {
                    Some(|t: &mut Self| t.record(Lifecycle::OnEnable))
                }
                Message::Lifecycle(Lifecycle::OnDisable) => {
                    Some(|t: &mut Self| t.record(Lifecycle::OnDisable))
                }
                Message::Lifecycle(Lifecycle::Update) => {
                    Some(|t: &mut Self| t.record(Lifecycle::Update))
                }
                Message::Lifecycle(Lifecycle::OnDestroy) => {
                    Some(|t: &mut Self| t.record(Lifecycle::OnDestroy))
                }
                _ => None,
            }
        }

        fn duplicate(&self) -> Self {
            Self {
                base: self.base.clone(),
                journal: self.journal.clone(),
            }
        }
    }

    #[derive(Default)]
    struct Faulty {
        base: ComponentBase,
    }

    impl Faulty {
        fn fail(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("update failed")
        }

        fn explode(&mut self) -> anyhow::Result<()> {
            panic!("destroy panicked")
        }
    }

    impl Component for Faulty {
        fn type_name() -> &'static str {
            "Faulty"
        }

        fn create(_services: &Services) -> Result<Self, ComponentError> {
            Ok(Self::default())
        }

        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn handler(message: Message<'_>) -> Option<Handler<Self>> {
            match message {
                Message::Lifecycle(Lifecycle::Update) => Some(Self::fail),
                Message::Lifecycle(Lifecycle::OnDestroy) => Some(Self::explode),
                _ => None,
            }
        }

        fn duplicate(&self) -> Self {
            Self::default()
        }
    }

    struct Fixture {
        system: GameObjectSystem,
        log: Arc<EventLog>,
        services: Arc<Services>,
        journal: Arc<Journal>,
    }

    impl Fixture {
        fn new() -> Self {
            let log = Arc::new(EventLog::new());
            let services = Arc::new(Services::new());
            let journal = Arc::new(Journal::default());
            services.insert_arc(journal.clone());
            Self {
                system: GameObjectSystem::new(log.clone()),
                log,
                services,
                journal,
            }
        }

        fn object(&self, name: &str) -> GameObject {
            let object = GameObject::with_services(name, self.services.clone());
            object.add_component::<Tracker>().unwrap();
            object
        }

        fn drain(&self) -> Vec<String> {
            std::mem::take(&mut *self.journal.lock())
        }
    }

    #[test]
    fn test_register_activates_on_next_step() {
        let mut fx = Fixture::new();
        let object = fx.object("hero");
        fx.drain();

        fx.system.register(&object);
        assert_eq!(fx.system.pending_add_count(), 1);
        assert!(!fx.system.is_active(&object));
        assert!(!object.is_active());

        let report = fx.system.step();
        assert_eq!(report.frame, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.updated, 1);
        assert!(fx.system.is_active(&object));
        assert!(object.is_active());
        assert_eq!(fx.system.pending_add_count(), 0);
        // Added objects are updated in the frame they are activated.
        assert_eq!(fx.drain(), vec!["hero:OnEnable", "hero:Update"]);
        assert_eq!(fx.log.take(), vec![ObjectEvent::Added(object)]);
    }

    #[test]
    fn test_unregister_destroys_and_notifies() {
        let mut fx = Fixture::new();
        let object = fx.object("doomed");
        fx.system.register(&object);
        fx.system.step();
        fx.drain();
        fx.log.take();

        fx.system.unregister(&object);
        fx.system.unregister(&object);
        assert_eq!(fx.system.pending_remove_count(), 1);

        let report = fx.system.step();
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(fx.system.active_count(), 0);
        assert_eq!(fx.system.pending_remove_count(), 0);
        assert_eq!(fx.drain(), vec!["doomed:OnDestroy"]);
        assert_eq!(fx.log.take(), vec![ObjectEvent::Removed(object)]);
    }

    #[test]
    fn test_destroy_while_pending_add_emits_nothing() {
        let mut fx = Fixture::new();
        let object = fx.object("fleeting");
        fx.drain();

        fx.system.register(&object);
        fx.system.unregister(&object);
        let report = fx.system.step();

        assert_eq!(report.added, 0);
        assert_eq!(report.destroyed, 1);
        assert_eq!(fx.system.active_count(), 0);
        assert_eq!(fx.system.pending_add_count(), 0);
        assert_eq!(fx.system.pending_remove_count(), 0);
        assert!(fx.log.is_empty());
        assert_eq!(fx.drain(), vec!["fleeting:OnDestroy"]);
    }

    #[test]
    fn test_unregister_unknown_object_is_dropped() {
        let mut fx = Fixture::new();
        let stranger = fx.object("stranger");
        fx.drain();

        fx.system.unregister(&stranger);
        let report = fx.system.step();

        assert_eq!(report, FrameReport { frame: 1, ..FrameReport::default() });
        assert_eq!(fx.system.pending_remove_count(), 0);
        assert!(fx.drain().is_empty());
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_reregistering_active_object_is_ignored() {
        let mut fx = Fixture::new();
        let object = fx.object("twice");
        fx.system.register(&object);
        fx.system.step();
        fx.drain();
        fx.log.take();

        fx.system.register(&object);
        let report = fx.system.step();

        assert_eq!(report.added, 0);
        assert_eq!(fx.drain(), vec!["twice:Update"]);
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_only_roots_are_updated_directly() {
        let mut fx = Fixture::new();
        let parent = fx.object("parent");
        let child = fx.object("child");
        child.transform().set_parent(Some(parent.transform())).unwrap();
        fx.system.register(&parent);
        fx.system.register(&child);
        fx.drain();

        let report = fx.system.step();

        assert_eq!(report.added, 2);
        assert_eq!(report.updated, 1);
        let journal = fx.drain();
        assert_eq!(journal.iter().filter(|line| *line == "child:Update").count(), 1);
        assert_eq!(journal.iter().filter(|line| *line == "parent:Update").count(), 1);
    }

    #[test]
    fn test_handler_failures_are_isolated() {
        let mut fx = Fixture::new();
        let faulty = fx.object("faulty");
        faulty.add_component::<Faulty>().unwrap();
        let healthy = fx.object("healthy");
        fx.system.register(&faulty);
        fx.system.register(&healthy);
        fx.drain();

        let report = fx.system.step();
        assert_eq!(report.updated, 1);
        assert_eq!(report.failures, 1);
        assert!(fx.drain().contains(&"healthy:Update".to_string()));

        // A panicking OnDestroy still completes the removal.
        fx.system.unregister(&faulty);
        let report = fx.system.step();
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.failures, 1);
        assert!(!fx.system.is_active(&faulty));
        assert_eq!(fx.log.counts(), (2, 1));
    }

    #[test]
    fn test_failing_awake_still_queues() {
        let mut fx = Fixture::new();
        let registrar = fx.system.registrar();
        assert!(fx.system.config().catch_panics);
        let panicking = fx.object("panicking");
        let failing = fx.object("failing");
        fx.drain();

        registrar.enqueue(&panicking, || panic!("awake panicked"));
        registrar.enqueue(&failing, || anyhow::bail!("awake failed"));
        assert_eq!(registrar.pending_add_count(), 2);

        let report = fx.system.step();
        assert_eq!(report.added, 2);
        assert!(fx.system.is_active(&panicking));
        assert!(fx.system.is_active(&failing));
    }

    #[test]
    fn test_shut_down_destroys_roots_without_events() {
        let mut fx = Fixture::new();
        let a = fx.object("a");
        let b = fx.object("b");
        fx.system.register(&a);
        fx.system.step();
        fx.system.register(&b);
        fx.system.unregister(&a);
        fx.drain();
        fx.log.take();

        assert_eq!(fx.system.shut_down(), 1);
        assert_eq!(fx.drain(), vec!["a:OnDestroy"]);
        assert_eq!(fx.system.active_count(), 0);
        assert_eq!(fx.system.pending_add_count(), 0);
        assert_eq!(fx.system.pending_remove_count(), 0);
        assert!(fx.log.is_empty());
    }

    #[test]
    fn test_system_contract() {
        let mut system = GameObjectSystem::with_config(
            Arc::new(crate::events::NullSink),
            GameObjectSystemConfig::default().with_priority(7),
        );
        assert_eq!(system.priority(), 7);
        assert_eq!(system.name(), "game_objects");
        system.initialize().unwrap();
        System::update(&mut system);
        System::update(&mut system);
        assert_eq!(system.frame(), 2);
        system.clean_up();
        assert_eq!(system.active_count(), 0);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static");
        let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 42");
    }
}
