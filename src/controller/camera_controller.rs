use glam::Vec3;

use super::input::{InputProcessor, InputState};
use super::pointer_lock::{PointerLockHost, PointerLockSession};
use crate::config::CameraSettings;
use crate::model::{Camera, LockState};

/// First-person pointer-lock camera.
///
/// Owns the camera, the keyboard state and the lock session. Mouse look and
/// movement only take effect while the host reports the pointer as locked.
pub struct CameraController {
    camera: Camera,
    input: InputState,
    lock: PointerLockSession,
    processor: InputProcessor,
    pub move_speed: f32,
    pub look_sensitivity: f32,
    overlay_visible: bool,
}

impl CameraController {
    pub fn new(settings: &CameraSettings, aspect: f32) -> Self {
        Self {
            camera: Camera::new(
                Vec3::from(settings.initial_position),
                settings.fov_y_deg.to_radians(),
                aspect,
            ),
            input: InputState::new(),
            lock: PointerLockSession::new(),
            processor: InputProcessor::default(),
            move_speed: settings.move_speed,
            look_sensitivity: settings.look_sensitivity,
            overlay_visible: true,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn processor(&self) -> &InputProcessor {
        &self.processor
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// The "click to enable controls" overlay is shown exactly while unlocked.
    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn request_lock(&mut self, host: &mut dyn PointerLockHost) {
        self.lock.request(host);
    }

    pub fn release_lock(&mut self, host: &mut dyn PointerLockHost) {
        self.lock.release(host);
    }

    pub fn on_lock_change(&mut self, locked: bool) {
        self.lock.on_change(locked);
        self.overlay_visible = !locked;
    }

    pub fn on_lock_error(&mut self) {
        self.lock.on_error();
        self.overlay_visible = true;
    }

    /// Apply mouse look; ignored unless locked so stray events queued around
    /// a lock change cannot drift the view.
    pub fn on_mouse_delta(&mut self, dx: f32, dy: f32) {
        if !self.is_locked() {
            return;
        }
        self.camera
            .rotate(-dx * self.look_sensitivity, -dy * self.look_sensitivity);
    }

    pub fn set_key(&mut self, code: &str, pressed: bool) {
        self.input.set_key(code, pressed);
    }

    pub fn clear_keys(&mut self) {
        self.input.clear_keys();
    }

    /// Move the camera for one frame and return the applied displacement.
    pub fn update(&mut self, dt: f32) -> Vec3 {
        if !self.is_locked() {
            return Vec3::ZERO;
        }

        let mut intent = self.processor.movement_intent(&self.input);
        if intent == glam::Vec2::ZERO {
            return Vec3::ZERO;
        }
        intent = intent.normalize();

        // basis from this frame's orientation so strafing follows the latest look direction
        let direction = self.camera.forward() * intent.y + self.camera.right() * intent.x;
        let displacement = direction * self.move_speed * dt;
        self.camera.position += displacement;
        displacement
    }

    pub fn resize(&mut self, aspect: f32) {
        self.camera.set_aspect(aspect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    struct NullHost;

    impl PointerLockHost for NullHost {
        fn request_pointer_lock(&mut self) {}
        fn exit_pointer_lock(&mut self) {}
    }

    fn locked_controller() -> CameraController {
        let mut c = CameraController::new(&CameraSettings::default(), 16.0 / 9.0);
        c.on_lock_change(true);
        c
    }

    #[test]
    fn mouse_look_is_ignored_while_unlocked() {
        let mut c = CameraController::new(&CameraSettings::default(), 1.0);
        c.on_mouse_delta(120.0, -40.0);
        assert_eq!(c.camera().yaw(), 0.0);
        assert_eq!(c.camera().pitch(), 0.0);
    }

    #[test]
    fn mouse_right_turns_right_and_mouse_down_looks_down() {
        let mut c = locked_controller();
        c.on_mouse_delta(100.0, 50.0);
        assert!((c.camera().yaw() + 0.2).abs() < 1e-6);
        assert!((c.camera().pitch() + 0.1).abs() < 1e-6);
        assert!(c.camera().forward().x > 0.0);
        assert!(c.camera().forward().y < 0.0);
    }

    #[test]
    fn pitch_never_leaves_half_pi() {
        let mut c = locked_controller();
        for _ in 0..1000 {
            c.on_mouse_delta(3.0, -500.0);
        }
        assert!(c.camera().pitch() <= FRAC_PI_2);
        for _ in 0..1000 {
            c.on_mouse_delta(-3.0, 500.0);
        }
        assert!(c.camera().pitch() >= -FRAC_PI_2);
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let mut c = locked_controller();
        c.set_key("KeyW", true);
        c.set_key("KeyD", true);
        let moved = c.update(0.016);
        assert!((moved.length() - 0.032).abs() < 1e-5, "moved {}", moved.length());
    }

    #[test]
    fn zero_dt_and_no_keys_do_not_move() {
        let mut c = locked_controller();
        let start = c.camera().position;
        assert_eq!(c.update(0.016), Vec3::ZERO);
        c.set_key("KeyW", true);
        assert_eq!(c.update(0.0), Vec3::ZERO);
        assert_eq!(c.camera().position, start);
    }

    #[test]
    fn update_is_a_no_op_while_unlocked() {
        let mut c = CameraController::new(&CameraSettings::default(), 1.0);
        c.set_key("KeyW", true);
        let start = c.camera().position;
        assert_eq!(c.update(1.0), Vec3::ZERO);
        assert_eq!(c.camera().position, start);
    }

    #[test]
    fn strafe_follows_the_latest_look_direction() {
        let mut c = locked_controller();
        c.set_key("KeyD", true);
        c.on_mouse_delta(-(FRAC_PI_2 / c.look_sensitivity), 0.0);
        // after turning left by 90 degrees, strafing right heads along -Z
        let moved = c.update(1.0);
        assert!((moved - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-4, "moved {moved:?}");
    }

    #[test]
    fn overlay_tracks_lock_state() {
        let mut c = CameraController::new(&CameraSettings::default(), 1.0);
        assert!(c.overlay_visible());
        c.request_lock(&mut NullHost);
        assert!(c.overlay_visible());
        c.on_lock_change(true);
        assert!(!c.overlay_visible());
        c.on_lock_change(false);
        assert!(c.overlay_visible());
    }

    #[test]
    fn resize_only_touches_aspect() {
        let mut c = locked_controller();
        let pos = c.camera().position;
        c.resize(2.0);
        assert_eq!(c.camera().aspect, 2.0);
        assert_eq!(c.camera().position, pos);
        assert_eq!(c.camera().yaw(), 0.0);
    }
}
