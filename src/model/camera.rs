use glam::{Mat4, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;

/// Whether the host has granted exclusive pointer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

/// First-person camera: position plus yaw/pitch orientation (roll is always zero).
///
/// Yaw is applied before pitch so the horizon never rolls, and pitch stays
/// inside `[-π/2, π/2]`.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn new(position: Vec3, fov_y: f32, aspect: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y,
            aspect,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }

    pub fn yaw(&self) -> f32 { self.yaw }

    pub fn pitch(&self) -> f32 { self.pitch }

    /// Rotate by the given yaw/pitch increments, clamping pitch to avoid flipping over the poles.
    pub fn rotate(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Look direction; `-Z` at zero yaw and pitch.
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    /// Strafe direction, always horizontal since roll is fixed at zero.
    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view(&self) -> Mat4 {
        // inverse of the camera's world transform; stays valid at the pitch limits
        Mat4::from_rotation_translation(self.orientation(), self.position).inverse()
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }
}
