//! A small demo scene: a ship with a turret, and short-lived probes that
//! drift away from it until they expire.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use engine_object::{
    Component, ComponentBase, ComponentCatalog, ComponentError, EventSink, GameObject, Handler,
    Lifecycle, Message, ObjectEvent, Registrar, Services, System, Vec3,
};
use tracing::{error, info};

/// Moves its object by `velocity` every frame.
#[derive(Debug, Default)]
pub struct Mover {
    base: ComponentBase,
    pub velocity: Vec3,
}

impl Mover {
    fn step(&mut self) -> anyhow::Result<()> {
        let owner = self.owner().context("mover outlived its object")?;
        owner.transform().translate(self.velocity);
        Ok(())
    }

    fn boost(&mut self) -> anyhow::Result<()> {
        self.velocity *= 2.0;
        Ok(())
    }
}

impl Component for Mover {
    fn type_name() -> &'static str {
        "Mover"
    }

    fn create(_services: &Services) -> Result<Self, ComponentError> {
        Ok(Self {
            velocity: Vec3::X,
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
            Message::Lifecycle(Lifecycle::Update) => Some(Self::step),
            Message::Named("boost") => Some(Self::boost),
            _ => None,
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.clone(),
            velocity: self.velocity,
        }
    }
}

/// Unregisters its object after a number of frames.
#[derive(Debug)]
pub struct Lifetime {
    base: ComponentBase,
    pub frames_left: u32,
    registrar: Arc<Registrar>,
}

impl Lifetime {
    /// Frames a fresh `Lifetime` lasts.
    pub const DEFAULT_FRAMES: u32 = 90;

    fn count_down(&mut self) -> anyhow::Result<()> {
        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            let owner = self.owner().context("lifetime outlived its object")?;
            self.registrar.unregister(&owner);
        }
        Ok(())
    }

    fn expired(&mut self) -> anyhow::Result<()> {
        if let Some(owner) = self.owner() {
            info!(object = %owner, "expired");
        }
        Ok(())
    }
}

impl Component for Lifetime {
    fn type_name() -> &'static str {
        "Lifetime"
    }

    fn create(services: &Services) -> Result<Self, ComponentError> {
        Ok(Self {
            base: ComponentBase::new(),
            frames_left: Self::DEFAULT_FRAMES,
            registrar: services.require::<Registrar>()?,
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
            Message::Lifecycle(Lifecycle::Update) => Some(Self::count_down),
            Message::Lifecycle(Lifecycle::OnDestroy) => Some(Self::expired),
            _ => None,
        }
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.clone(),
            frames_left: self.frames_left,
            registrar: self.registrar.clone(),
        }
    }
}

/// Counts add/remove transitions.
#[derive(Debug, Default)]
pub struct SceneStats {
    added: AtomicU64,
    removed: AtomicU64,
}

impl SceneStats {
    /// Objects added and removed so far.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        (
            self.added.load(Ordering::Relaxed),
            self.removed.load(Ordering::Relaxed),
        )
    }
}

impl EventSink for SceneStats {
    fn notify(&self, event: &ObjectEvent) {
        let counter = match event {
            ObjectEvent::Added(_) => &self.added,
            ObjectEvent::Removed(_) => &self.removed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        info!(%event, "scene changed");
    }
}

/// Launches a probe from a template every `interval` frames.
pub struct Launcher {
    template: GameObject,
    registrar: Registrar,
    interval: u64,
    frame: u64,
    launched: u64,
}

impl Launcher {
    /// Priority of the launcher: after the object system.
    pub const PRIORITY: i32 = 0;

    #[must_use]
    pub fn new(template: GameObject, registrar: Registrar, interval: u64) -> Self {
        Self {
            template,
            registrar,
            interval: interval.max(1),
            frame: 0,
            launched: 0,
        }
    }
}

impl System for Launcher {
    fn name(&self) -> &str {
        "launcher"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn update(&mut self) {
        self.frame += 1;
        if self.frame % self.interval != 0 {
            return;
        }
        match self.template.duplicate() {
            Ok(probe) => {
                self.registrar.register(&probe);
                self.launched += 1;
            }
            Err(err) => error!(template = %self.template, error = %err, "launch failed"),
        }
    }

    fn clean_up(&mut self) {
        info!(launched = self.launched, "launcher stopped");
    }
}

/// The objects making up the demo scene.
#[derive(Debug)]
pub struct Scene {
    pub ship: GameObject,
    pub turret: GameObject,
    pub probe_template: GameObject,
}

/// Builds the demo scene and registers it through `registrar`.
///
/// # Errors
///
/// Fails if a component cannot be attached or the hierarchy cannot be built.
pub fn build_scene(registrar: &Registrar) -> anyhow::Result<Scene> {
    let services = Arc::new(Services::new());
    services.insert(registrar.clone());

    let catalog = ComponentCatalog::new();
    catalog.register::<Mover>();
    catalog.register::<Lifetime>();

    let ship = GameObject::with_services("ship", services.clone());
    ship.add_component_named(&catalog, "Mover")?;
    ship.transform().set_position(Vec3::new(0.0, 0.0, -10.0));

    let turret = GameObject::with_services("turret", services.clone());
    turret.transform().set_parent(Some(ship.transform()))?;
    turret.transform().set_local_position(Vec3::Y);

    let probe_template = GameObject::with_services("probe", services);
    probe_template
        .add_component::<Mover>()?
        .with_mut(|mover| mover.velocity = Vec3::new(0.0, 0.5, 0.0))?;
    probe_template
        .add_component::<Lifetime>()?
        .with_mut(|lifetime| lifetime.frames_left = 30)?;

    ship.get_required_component::<Mover>()?.send_named("boost")?;

    registrar.register(&ship);
    registrar.register(&turret);
    info!(objects = 2, components = ?catalog.names(), "scene built");

    Ok(Scene {
        ship,
        turret,
        probe_template,
    })
}
