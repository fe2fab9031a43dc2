use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use super::camera_controller::CameraController;
use super::input::{InputEvent, InputQueue, SharedInputQueue};
use super::model_lifecycle::ModelLifecycleManager;
use super::pointer_lock::PointerLockHost;
use crate::config::AppConfig;
use crate::model::{AssetSource, EngineFactory, Scene};

/// Per-frame outcome, mostly for the debug panel and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub events_applied: usize,
    pub displacement: Vec3,
    pub computed: bool,
}

/// Top-level owner of the camera, the model lifecycle and the scene graph.
///
/// Host callbacks push into the shared `InputQueue`; `frame` drains it, then
/// updates the camera, then steps the particle engine. Nothing else mutates
/// this state.
pub struct FrameLoop<F: EngineFactory> {
    pub camera: CameraController,
    pub models: ModelLifecycleManager<F>,
    pub scene: Scene,
    events: SharedInputQueue,
}

impl<F: EngineFactory> FrameLoop<F> {
    pub fn new(config: &AppConfig, factory: F, aspect: f32) -> Self {
        Self {
            camera: CameraController::new(&config.camera, aspect),
            models: ModelLifecycleManager::new(config.catalog(), factory),
            scene: Scene::new(),
            events: Rc::new(RefCell::new(InputQueue::new())),
        }
    }

    /// Handle for event callbacks to enqueue into.
    pub fn events(&self) -> SharedInputQueue {
        self.events.clone()
    }

    pub fn push(&self, event: InputEvent) {
        self.events.borrow_mut().push(event);
    }

    /// Run one frame: apply queued events in order, move the camera, step the simulation.
    pub fn frame(&mut self, dt: f32, assets: &dyn AssetSource, host: &mut dyn PointerLockHost) -> FrameReport {
        // take the batch first so handlers may enqueue follow-ups for the next frame
        let batch: Vec<InputEvent> = self.events.borrow_mut().drain().collect();
        let events_applied = batch.len();
        for event in batch {
            self.apply(event, assets, host);
        }

        let displacement = self.camera.update(dt);
        let computed = self.models.update();

        FrameReport { events_applied, displacement, computed }
    }

    fn apply(&mut self, event: InputEvent, assets: &dyn AssetSource, host: &mut dyn PointerLockHost) {
        match event {
            InputEvent::KeyDown(code) => {
                let (escape, reset) = {
                    let processor = self.camera.processor();
                    (processor.is_escape(&code), processor.wants_model_reset(&code))
                };
                if escape {
                    self.camera.release_lock(host);
                } else if reset {
                    // Reset failures are already logged by the manager.
                    let _ = self.models.reset(assets, &mut self.scene);
                }
                self.camera.set_key(&code, true);
            }
            InputEvent::KeyUp(code) => self.camera.set_key(&code, false),
            InputEvent::MouseMove { dx, dy } => self.camera.on_mouse_delta(dx, dy),
            InputEvent::LockRequested => self.camera.request_lock(host),
            InputEvent::PointerLockChanged { locked } => self.camera.on_lock_change(locked),
            InputEvent::PointerLockError => self.camera.on_lock_error(),
            InputEvent::FocusLost => {
                self.camera.clear_keys();
                self.camera.release_lock(host);
            }
            InputEvent::Resized { width, height } => {
                if width > 0 && height > 0 {
                    self.camera.resize(width as f32 / height as f32);
                }
            }
            InputEvent::ActivateModel(id) => {
                let _ = self.models.activate(&id, assets, &mut self.scene);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetStore, EngineError, ModelAsset, ModelParams, ParticleEngine, SceneNodeId};

    struct Nop(SceneNodeId);

    impl ParticleEngine for Nop {
        fn node(&self) -> SceneNodeId {
            self.0
        }
        fn compute(&mut self) {}
        fn apply_params(&mut self, _params: &ModelParams) {}
        fn release_geometry(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn release_material(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn release_compute(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct NopFactory;

    impl EngineFactory for NopFactory {
        type Engine = Nop;
        fn construct(&mut self, _asset: &ModelAsset, _params: &ModelParams) -> Result<Nop, EngineError> {
            Ok(Nop(SceneNodeId(1)))
        }
    }

    #[derive(Default)]
    struct Host {
        requests: usize,
        exits: usize,
    }

    impl PointerLockHost for Host {
        fn request_pointer_lock(&mut self) {
            self.requests += 1;
        }
        fn exit_pointer_lock(&mut self) {
            self.exits += 1;
        }
    }

    #[test]
    fn events_queued_before_lock_change_are_applied_in_order() {
        let mut fl = FrameLoop::new(&AppConfig::default(), NopFactory, 1.0);
        let assets = AssetStore::new();
        let mut host = Host::default();

        // stray motion before the grant must not rotate, motion after it must
        fl.push(InputEvent::MouseMove { dx: 50.0, dy: 0.0 });
        fl.push(InputEvent::PointerLockChanged { locked: true });
        fl.push(InputEvent::MouseMove { dx: 10.0, dy: 0.0 });
        let report = fl.frame(0.016, &assets, &mut host);

        assert_eq!(report.events_applied, 3);
        assert!((fl.camera.camera().yaw() + 0.02).abs() < 1e-6);
    }

    #[test]
    fn click_and_escape_go_through_the_host() {
        let mut fl = FrameLoop::new(&AppConfig::default(), NopFactory, 1.0);
        let assets = AssetStore::new();
        let mut host = Host::default();

        fl.push(InputEvent::LockRequested);
        fl.frame(0.016, &assets, &mut host);
        assert_eq!(host.requests, 1);
        assert!(!fl.camera.is_locked());

        fl.push(InputEvent::PointerLockChanged { locked: true });
        fl.push(InputEvent::LockRequested);
        fl.push(InputEvent::KeyDown("Escape".into()));
        fl.frame(0.016, &assets, &mut host);
        assert_eq!(host.requests, 1);
        assert_eq!(host.exits, 1);
    }

    #[test]
    fn focus_loss_stops_movement() {
        let mut fl = FrameLoop::new(&AppConfig::default(), NopFactory, 1.0);
        let assets = AssetStore::new();
        let mut host = Host::default();
        fl.push(InputEvent::PointerLockChanged { locked: true });
        fl.push(InputEvent::KeyDown("KeyW".into()));
        assert_ne!(fl.frame(0.1, &assets, &mut host).displacement, Vec3::ZERO);

        fl.push(InputEvent::FocusLost);
        assert_eq!(fl.frame(0.1, &assets, &mut host).displacement, Vec3::ZERO);
    }

    #[test]
    fn focus_loss_releases_a_held_lock() {
        let mut fl = FrameLoop::new(&AppConfig::default(), NopFactory, 1.0);
        let assets = AssetStore::new();
        let mut host = Host::default();
        fl.push(InputEvent::FocusLost);
        fl.frame(0.0, &assets, &mut host);
        assert_eq!(host.exits, 0);

        fl.push(InputEvent::PointerLockChanged { locked: true });
        fl.push(InputEvent::FocusLost);
        fl.frame(0.0, &assets, &mut host);
        assert_eq!(host.exits, 1);
    }

    #[test]
    fn resize_updates_aspect() {
        let mut fl = FrameLoop::new(&AppConfig::default(), NopFactory, 1.0);
        fl.push(InputEvent::Resized { width: 1600, height: 800 });
        fl.push(InputEvent::Resized { width: 0, height: 800 });
        fl.frame(0.0, &AssetStore::new(), &mut Host::default());
        assert_eq!(fl.camera.camera().aspect, 2.0);
    }
}
