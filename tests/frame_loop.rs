//! End-to-end behavior of the frame loop with a recording engine and lock host.

use std::cell::RefCell;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

use glam::Vec3;
use particle_gallery::config::AppConfig;
use particle_gallery::controller::{FrameLoop, InputEvent, LifecycleError, NotReadyReason, PointerLockHost};
use particle_gallery::model::{
    AssetStore, Color, EngineError, EngineFactory, ModelAsset, ModelParams, ParticleEngine, SceneNodeId,
};

#[derive(Default)]
struct Ledger {
    live: usize,
    max_live: usize,
    built: u64,
    computed: u64,
    applied: Vec<ModelParams>,
}

struct RecordingEngine {
    node: SceneNodeId,
    ledger: Rc<RefCell<Ledger>>,
    released: bool,
}

impl ParticleEngine for RecordingEngine {
    fn node(&self) -> SceneNodeId {
        self.node
    }

    fn compute(&mut self) {
        self.ledger.borrow_mut().computed += 1;
    }

    fn apply_params(&mut self, params: &ModelParams) {
        self.ledger.borrow_mut().applied.push(*params);
    }

    fn release_geometry(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn release_material(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn release_compute(&mut self) -> Result<(), EngineError> {
        if !std::mem::replace(&mut self.released, true) {
            self.ledger.borrow_mut().live -= 1;
        }
        Ok(())
    }
}

struct RecordingFactory {
    ledger: Rc<RefCell<Ledger>>,
    fail: bool,
}

impl EngineFactory for RecordingFactory {
    type Engine = RecordingEngine;

    fn construct(&mut self, asset: &ModelAsset, _params: &ModelParams) -> Result<RecordingEngine, EngineError> {
        if self.fail {
            return Err(EngineError::TooManyParticles { count: asset.vertex_count(), limit: 0 });
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.built += 1;
        ledger.live += 1;
        ledger.max_live = ledger.max_live.max(ledger.live);
        Ok(RecordingEngine { node: SceneNodeId(ledger.built), ledger: self.ledger.clone(), released: false })
    }
}

#[derive(Default)]
struct RecordingHost {
    requests: usize,
    exits: usize,
}

impl PointerLockHost for RecordingHost {
    fn request_pointer_lock(&mut self) {
        self.requests += 1;
    }

    fn exit_pointer_lock(&mut self) {
        self.exits += 1;
    }
}

struct Harness {
    fl: FrameLoop<RecordingFactory>,
    assets: AssetStore,
    host: RecordingHost,
    ledger: Rc<RefCell<Ledger>>,
}

impl Harness {
    fn new() -> Self {
        let config = AppConfig::default();
        let ledger = Rc::new(RefCell::new(Ledger::default()));
        let factory = RecordingFactory { ledger: ledger.clone(), fail: false };
        let mut assets = AssetStore::new();
        for entry in &config.models {
            assets.insert(entry.id.clone(), ModelAsset::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z]));
        }
        Self { fl: FrameLoop::new(&config, factory, 16.0 / 9.0), assets, host: RecordingHost::default(), ledger }
    }

    fn frame(&mut self, dt: f32) -> particle_gallery::controller::FrameReport {
        self.fl.frame(dt, &self.assets, &mut self.host)
    }

    fn lock(&mut self) {
        self.fl.push(InputEvent::PointerLockChanged { locked: true });
        self.frame(0.0);
    }
}

#[test]
fn switching_models_keeps_at_most_one_live_engine() {
    let mut h = Harness::new();
    for id in ["athena", "hermes", "apollo"] {
        h.fl.push(InputEvent::ActivateModel(id.into()));
        h.frame(0.016);
    }

    let ledger = h.ledger.borrow();
    assert_eq!(ledger.max_live, 1);
    assert_eq!(ledger.live, 1);
    assert_eq!(ledger.built, 3);
    assert_eq!(h.fl.models.active_model(), Some("apollo"));
    assert_eq!(h.fl.scene.len(), 1);
}

#[test]
fn session_params_are_a_detached_copy_of_the_catalog() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::ActivateModel("apollo".into()));
    h.frame(0.016);

    let catalog_color = h.fl.models.catalog().get("apollo").map(|d| d.params().color);
    let mut params = *h.fl.models.session().params().expect("apollo is active");
    assert_eq!(Some(params.color), catalog_color);
    assert_eq!(Color::from_hex("#F777A8"), catalog_color);

    params.color = Color::rgb(0.0, 1.0, 0.0);
    h.fl.models.set_params(params);

    assert_eq!(h.fl.models.session().params().map(|p| p.color), Some(Color::rgb(0.0, 1.0, 0.0)));
    assert_eq!(h.fl.models.catalog().get("apollo").map(|d| d.params().color), catalog_color);
    assert_eq!(h.ledger.borrow().applied.last().map(|p| p.color), Some(Color::rgb(0.0, 1.0, 0.0)));
}

#[test]
fn reactivating_rebuilds_with_a_new_identity_and_catalog_params() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::ActivateModel("hermes".into()));
    h.frame(0.016);
    let first = h.fl.models.session().binding_id();

    let mut edited = *h.fl.models.session().params().expect("hermes is active");
    edited.size = 9.0;
    h.fl.models.set_params(edited);

    h.fl.push(InputEvent::ActivateModel("hermes".into()));
    h.frame(0.016);
    let second = h.fl.models.session().binding_id();

    assert!(first.is_some() && second.is_some());
    assert_ne!(first, second);
    assert_eq!(h.fl.models.session().params().map(|p| p.size), Some(1.7));
    assert_eq!(h.ledger.borrow().max_live, 1);
}

#[test]
fn reset_key_restarts_the_active_model() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::KeyDown("KeyR".into()));
    h.frame(0.016);
    assert_eq!(h.ledger.borrow().built, 0);

    h.fl.push(InputEvent::ActivateModel("athena".into()));
    h.frame(0.016);
    let before = h.fl.models.session().binding_id();

    h.fl.push(InputEvent::KeyDown("KeyR".into()));
    h.frame(0.016);
    assert_ne!(h.fl.models.session().binding_id(), before);
    assert_eq!(h.fl.models.active_model(), Some("athena"));
}

#[test]
fn update_without_engine_is_a_no_op() {
    let mut h = Harness::new();
    let report = h.frame(0.016);
    assert!(!report.computed);
    assert!(!h.fl.models.update());
    assert_eq!(h.ledger.borrow().computed, 0);
}

#[test]
fn every_frame_steps_the_engine_exactly_once() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::ActivateModel("apollo".into()));
    for _ in 0..5 {
        assert!(h.frame(0.016).computed);
    }
    assert_eq!(h.ledger.borrow().computed, 5);
}

#[test]
fn unknown_model_leaves_the_session_intact() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::ActivateModel("apollo".into()));
    h.frame(0.016);
    let binding = h.fl.models.session().binding_id();

    let err = h.fl.models.activate("zeus", &h.assets, &mut h.fl.scene).unwrap_err();
    assert!(matches!(err, LifecycleError::ModelNotReady { reason: NotReadyReason::NotInCatalog, .. }));

    assert_eq!(h.fl.models.active_model(), Some("apollo"));
    assert_eq!(h.fl.models.session().binding_id(), binding);
    assert_eq!(h.ledger.borrow().live, 1);
    assert_eq!(h.fl.scene.len(), 1);
}

#[test]
fn model_without_loaded_asset_is_not_ready() {
    let mut h = Harness::new();
    h.assets = AssetStore::new();
    let err = h.fl.models.activate("apollo", &h.assets, &mut h.fl.scene).unwrap_err();
    assert!(matches!(err, LifecycleError::ModelNotReady { reason: NotReadyReason::AssetMissing, .. }));
    assert_eq!(h.fl.models.active_model(), None);
}

#[test]
fn failed_construction_leaves_no_engine_but_keeps_rendering() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::ActivateModel("apollo".into()));
    h.frame(0.016);

    h.fl.models.factory_mut().fail = true;
    h.fl.push(InputEvent::ActivateModel("hermes".into()));
    let report = h.frame(0.016);

    assert!(!report.computed);
    assert!(!h.fl.models.has_binding());
    assert_eq!(h.fl.models.active_model(), Some("hermes"));
    assert_eq!(h.ledger.borrow().live, 0);
    assert!(h.fl.scene.is_empty());
}

#[test]
fn mouse_deltas_while_unlocked_do_not_rotate() {
    let mut h = Harness::new();
    for _ in 0..10 {
        h.fl.push(InputEvent::MouseMove { dx: 120.0, dy: -80.0 });
    }
    h.frame(0.016);
    assert_eq!(h.fl.camera.camera().yaw(), 0.0);
    assert_eq!(h.fl.camera.camera().pitch(), 0.0);
}

#[test]
fn pitch_stays_within_half_pi_for_any_input() {
    let mut h = Harness::new();
    h.lock();
    for dy in [10_000.0, -3.0, -50_000.0, 7.5, 1e9, -1e9] {
        h.fl.push(InputEvent::MouseMove { dx: 1.0, dy });
        h.frame(0.016);
        let pitch = h.fl.camera.camera().pitch();
        assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&pitch), "pitch {pitch} out of range");
    }
}

#[test]
fn diagonal_movement_is_not_faster() {
    let mut h = Harness::new();
    h.lock();
    h.fl.push(InputEvent::KeyDown("KeyW".into()));
    h.fl.push(InputEvent::KeyDown("KeyD".into()));
    let step = h.frame(0.016).displacement;
    assert!((step.length() - 0.032).abs() < 1e-5, "got {}", step.length());

    for keys in [&["KeyW"][..], &["KeyS", "KeyA"], &["ArrowUp", "KeyW", "KeyD"], &["KeyW", "KeyS"]] {
        h.fl.push(InputEvent::FocusLost);
        for key in keys {
            h.fl.push(InputEvent::KeyDown((*key).into()));
        }
        let step = h.frame(0.016).displacement;
        assert!(step.length() <= 0.032 + 1e-5, "{keys:?} moved {}", step.length());
    }
}

#[test]
fn escape_asks_the_host_to_release_and_shows_the_overlay_on_change() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::LockRequested);
    h.frame(0.0);
    assert_eq!(h.host.requests, 1);
    assert!(h.fl.camera.overlay_visible());

    h.lock();
    assert!(!h.fl.camera.overlay_visible());

    h.fl.push(InputEvent::KeyDown("Escape".into()));
    h.frame(0.0);
    assert_eq!(h.host.exits, 1);

    h.fl.push(InputEvent::PointerLockChanged { locked: false });
    h.frame(0.0);
    assert!(h.fl.camera.overlay_visible());
    assert!(!h.fl.camera.is_locked());
}

#[test]
fn losing_focus_while_locked_brings_the_overlay_back() {
    let mut h = Harness::new();
    h.lock();
    h.fl.push(InputEvent::KeyDown("KeyW".into()));
    h.fl.push(InputEvent::FocusLost);
    h.frame(0.016);
    assert_eq!(h.host.exits, 1);

    // the host answers the release the way the window and the browser do
    h.fl.push(InputEvent::PointerLockChanged { locked: false });
    let report = h.frame(0.016);
    assert_eq!(report.displacement, Vec3::ZERO);
    assert!(h.fl.camera.overlay_visible());
}

#[test]
fn denied_lock_keeps_the_overlay_and_allows_retry() {
    let mut h = Harness::new();
    h.fl.push(InputEvent::LockRequested);
    h.fl.push(InputEvent::PointerLockError);
    h.fl.push(InputEvent::LockRequested);
    h.frame(0.0);
    assert_eq!(h.host.requests, 2);
    assert!(h.fl.camera.overlay_visible());
}
