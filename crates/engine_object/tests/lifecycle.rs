//! End-to-end behaviour of the scheduler, hierarchy, and message fan-out.

use std::sync::Arc;
use std::thread;

use engine_object::{
    Component, ComponentBase, ComponentError, EventLog, GameObject, GameObjectSystem, Handler,
    Lifecycle, Message, NullSink, ObjectEvent, Registrar, Services, Vec3,
};

/// Counts the lifecycle verbs it receives.
#[derive(Debug, Default)]
struct Counter {
    base: ComponentBase,
    enables: u32,
    disables: u32,
    updates: u32,
    destroys: u32,
    fail_updates: bool,
}

impl Counter {
    fn on_enable(&mut self) -> anyhow::Result<()> {
        self.enables += 1;
        Ok(())
    }

    fn on_disable(&mut self) -> anyhow::Result<()> {
        self.disables += 1;
        Ok(())
    }

    fn update(&mut self) -> anyhow::Result<()> {
        self.updates += 1;
        if self.fail_updates {
            anyhow::bail!("update #{} rejected", self.updates);
        }
        Ok(())
    }

    fn on_destroy(&mut self) -> anyhow::Result<()> {
        self.destroys += 1;
        Ok(())
    }
}

impl Component for Counter {
    fn type_name() -> &'static str {
        "Counter"
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
            Message::Lifecycle(Lifecycle::OnEnable) => Some(Self::on_enable),
            Message::Lifecycle(Lifecycle::OnDisable) => Some(Self::on_disable),
            Message::Lifecycle(Lifecycle::Update) => Some(Self::update),
            Message::Lifecycle(Lifecycle::OnDestroy) => Some(Self::on_destroy),
            _ => None,
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.clone(),
            fail_updates: self.fail_updates,
            ..Self::default()
        }
    }
}

/// On destruction, queues another object for destruction.
#[derive(Default)]
struct Reaper {
    base: ComponentBase,
    registrar: Option<Arc<Registrar>>,
    victim: Option<GameObject>,
}

impl Reaper {
    fn on_destroy(&mut self) -> anyhow::Result<()> {
        if let (Some(registrar), Some(victim)) = (&self.registrar, &self.victim) {
            registrar.unregister(victim);
        }
        Ok(())
    }
}

impl Component for Reaper {
    fn type_name() -> &'static str {
        "Reaper"
    }

    fn create(services: &Services) -> Result<Self, ComponentError> {
        Ok(Self {
            registrar: Some(services.require::<Registrar>()?),
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
            Message::Lifecycle(Lifecycle::OnDestroy) => Some(Self::on_destroy),
            _ => None,
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.clone(),
            registrar: self.registrar.clone(),
            victim: self.victim.clone(),
        }
    }
}

fn counted(name: &str) -> GameObject {
    let object = GameObject::new(name);
    object.add_component::<Counter>().unwrap();
    object
}

fn counts(object: &GameObject) -> (u32, u32, u32, u32) {
    object
        .get_required_component::<Counter>()
        .unwrap()
        .with(|c| (c.enables, c.disables, c.updates, c.destroys))
        .unwrap()
}

fn updates(object: &GameObject) -> u32 {
    counts(object).2
}

#[test]
fn test_concurrent_registration() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 32;

    let log = Arc::new(EventLog::new());
    let mut system = GameObjectSystem::new(log.clone());
    let registrar = system.registrar();

    let objects: Vec<GameObject> = (0..THREADS * PER_THREAD)
        .map(|i| counted(&format!("object-{i}")))
        .collect();

    thread::scope(|scope| {
        for chunk in objects.chunks(PER_THREAD) {
            let registrar = registrar.clone();
            scope.spawn(move || {
                for object in chunk {
                    registrar.register(object);
                }
            });
        }
    });

    assert_eq!(system.pending_add_count(), THREADS * PER_THREAD);
    let report = system.step();

    assert_eq!(report.added, THREADS * PER_THREAD);
    assert_eq!(system.active_count(), THREADS * PER_THREAD);
    assert_eq!(log.counts(), (THREADS * PER_THREAD, 0));
    for object in &objects {
        // One OnEnable from attaching the component, one from activation.
        assert_eq!(counts(object), (2, 0, 1, 0));
        assert!(object.is_active());
    }
}

#[test]
fn test_concurrent_register_and_unregister() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let registrar = system.registrar();
    let objects: Vec<GameObject> = (0..64).map(|i| counted(&format!("churn-{i}"))).collect();

    thread::scope(|scope| {
        let adder = registrar.clone();
        let objects_ref = &objects;
        scope.spawn(move || {
            for object in objects_ref {
                adder.register(object);
            }
        });
        let remover = registrar.clone();
        scope.spawn(move || {
            for object in objects_ref.iter().step_by(2) {
                remover.unregister(object);
            }
        });
    });

    system.step();
    system.step();

    // Every odd object survives; every even object is gone, whichever thread
    // won the race for it.
    assert_eq!(system.active_count(), 32);
    for (i, object) in objects.iter().enumerate() {
        assert_eq!(system.is_active(object), i % 2 == 1, "object {i}");
    }
    assert_eq!(system.pending_add_count(), 0);
    assert_eq!(system.pending_remove_count(), 0);
}

#[test]
fn test_unregister_during_destroy_waits_for_next_frame() {
    let log = Arc::new(EventLog::new());
    let mut system = GameObjectSystem::new(log.clone());
    let services = Arc::new(Services::new());
    services.insert(system.registrar());

    let reaper = GameObject::with_services("reaper", services.clone());
    let victim = GameObject::with_services("victim", services);
    reaper.add_component::<Reaper>()
        .unwrap()
        .with_mut(|r| r.victim = Some(victim.clone()))
        .unwrap();
    victim.add_component::<Counter>().unwrap();

    system.register(&reaper);
    system.register(&victim);
    system.step();
    log.take();

    system.unregister(&reaper);
    let report = system.step();

    assert_eq!(report.destroyed, 1);
    assert!(!system.is_active(&reaper));
    assert!(system.is_active(&victim));
    assert_eq!(system.pending_remove_count(), 1);
    assert_eq!(counts(&victim).3, 0);
    assert_eq!(updates(&victim), 2);
    assert_eq!(log.take(), vec![ObjectEvent::Removed(reaper)]);

    let report = system.step();
    assert_eq!(report.destroyed, 1);
    assert!(!system.is_active(&victim));
    assert_eq!(counts(&victim).3, 1);
    assert_eq!(log.take(), vec![ObjectEvent::Removed(victim)]);
}

#[test]
fn test_failing_update_does_not_stop_the_frame() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let objects: Vec<GameObject> = (0..5).map(|i| counted(&format!("root-{i}"))).collect();
    objects[2]
        .get_component::<Counter>()
        .unwrap()
        .with_mut(|c| c.fail_updates = true)
        .unwrap();
    for object in &objects {
        system.register(object);
    }

    let first = system.step();
    let second = system.step();

    assert_eq!((first.updated, first.failures), (4, 1));
    assert_eq!((second.updated, second.failures), (4, 1));
    // The failure is terminal for that message only.
    for object in &objects {
        assert_eq!(updates(object), 2);
    }
}

#[test]
fn test_inactive_subtree_is_skipped() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let root = counted("root");
    let child = counted("child");
    let grandchild = counted("grandchild");
    child.transform().set_parent(Some(root.transform())).unwrap();
    grandchild.transform().set_parent(Some(child.transform())).unwrap();
    for object in [&root, &child, &grandchild] {
        system.register(object);
    }

    let report = system.step();
    assert_eq!(report.updated, 1);
    for object in [&root, &child, &grandchild] {
        assert_eq!(updates(object), 1);
    }

    child.set_active(false).unwrap();
    assert_eq!(counts(&child).1, 1);
    system.step();

    assert_eq!(updates(&root), 2);
    assert_eq!(updates(&child), 1);
    // Skipped even though its own flag is still set.
    assert!(grandchild.is_active());
    assert_eq!(updates(&grandchild), 1);

    child.set_active(true).unwrap();
    system.step();
    assert_eq!(updates(&grandchild), 2);
}

#[test]
fn test_destroying_parent_does_not_cascade() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let parent = counted("parent");
    let child = counted("child");
    child.transform().set_parent(Some(parent.transform())).unwrap();
    system.register(&parent);
    system.register(&child);
    system.step();

    system.unregister(&parent);
    system.step();

    assert!(!system.is_active(&parent));
    assert_eq!(counts(&parent).3, 1);
    // The child is neither destroyed nor reachable from a root any more.
    assert!(system.is_active(&child));
    assert_eq!(counts(&child).3, 0);
    assert_eq!(updates(&child), 1);
    assert!(child.parent().unwrap().ptr_eq(&parent));
}

#[test]
fn test_destroyed_parent_stays_attached_after_last_handle_drops() {
    let mut system = GameObjectSystem::new(Arc::new(NullSink));
    let parent = counted("parent");
    let child = counted("child");
    parent.transform().set_position(Vec3::new(10.0, 0.0, 0.0));
    child.transform().set_parent(Some(parent.transform())).unwrap();
    child.transform().set_local_position(Vec3::X);
    system.register(&parent);
    system.register(&child);
    system.step();
    assert_eq!(updates(&child), 1);

    system.unregister(&parent);
    system.step();
    drop(parent);
    system.step();

    let transform = child.transform();
    assert!(!transform.is_root());
    assert_eq!(child.parent().unwrap().name(), "parent");
    assert_eq!(transform.position(), Vec3::new(11.0, 0.0, 0.0));
    assert_eq!(transform.local_position(), Vec3::X);
    assert_eq!(updates(&child), 1);

    transform.set_parent(None).unwrap();
    assert_eq!(transform.local_position(), transform.position());
    system.step();
    assert_eq!(updates(&child), 2);
}

#[test]
fn test_hierarchy_positions_through_frames() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let ship = counted("ship");
    let turret = counted("turret");
    ship.transform().set_position(Vec3::new(10.0, 0.0, 0.0));
    turret.transform().set_position(Vec3::new(12.0, 1.0, 0.0));
    turret.transform().set_parent(Some(ship.transform())).unwrap();
    system.register(&ship);
    system.register(&turret);
    system.step();

    assert_eq!(turret.transform().local_position(), Vec3::new(2.0, 1.0, 0.0));

    ship.transform().translate(Vec3::new(0.0, 0.0, 5.0));
    assert_eq!(turret.transform().position(), Vec3::new(12.0, 1.0, 5.0));

    turret.transform().set_parent(None).unwrap();
    assert_eq!(turret.transform().position(), turret.transform().local_position());
    assert_eq!(ship.transform().child_count(), 0);

    // Now a root, the turret is updated on its own.
    let report = system.step();
    assert_eq!(report.updated, 2);
}

#[test]
fn test_duplicate_registers_independently() {
    let mut system = GameObjectSystem::new(Arc::new(EventLog::new()));
    let original = counted("drone");
    system.register(&original);
    system.step();

    let copy = original.duplicate().unwrap();
    assert!(copy.is_active());
    assert_eq!(counts(&copy), (1, 0, 0, 0));

    system.register(&copy);
    system.step();
    assert_eq!(system.active_count(), 2);
    assert_eq!(updates(&original), 2);
    assert_eq!(updates(&copy), 1);
}
