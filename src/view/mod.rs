// VIEW: GPU setup, particle engine and frame rendering
pub mod gpgpu;
pub mod gpu_init;
pub mod render;

pub use gpgpu::{GpgpuEngine, GpgpuFactory};
pub use gpu_init::{GpuContext, GpuInitError};
pub use render::{CameraResources, CameraUniform, EguiFrame, RenderState};

use crate::controller::FrameLoop;
use crate::model::ParticleEngine;

/// The live engine, but only while its node is attached to the scene.
pub fn visible_engine(frame_loop: &FrameLoop<GpgpuFactory>) -> Option<&GpgpuEngine> {
    frame_loop
        .models
        .session()
        .engine()
        .filter(|engine| frame_loop.scene.contains(engine.node()))
}
