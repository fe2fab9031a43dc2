//! Interface to a particle simulation engine instance.
//!
//! One `ParticleEngine` value owns everything one model needs on the GPU:
//! its geometry, its material and its compute resources. The lifecycle code
//! only ever calls `compute`, `apply_params` and the release steps, and it
//! calls them from the frame loop alone.

use std::fmt;

use super::assets::ModelAsset;
use super::catalog::ModelParams;
use super::scene::{SceneError, SceneNodeId};

/// The four teardown steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisposeStep {
    DetachFromScene,
    Geometry,
    Material,
    Compute,
}

impl DisposeStep {
    pub const ORDER: [DisposeStep; 4] = [
        DisposeStep::DetachFromScene,
        DisposeStep::Geometry,
        DisposeStep::Material,
        DisposeStep::Compute,
    ];
}

impl fmt::Display for DisposeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisposeStep::DetachFromScene => "detach from scene",
            DisposeStep::Geometry => "release geometry",
            DisposeStep::Material => "release material",
            DisposeStep::Compute => "release compute resources",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cannot build particles from an empty asset")]
    EmptyGeometry,
    #[error("asset has {count} vertices, engine limit is {limit}")]
    TooManyParticles { count: usize, limit: usize },
    #[error("scene graph: {0}")]
    Scene(#[from] SceneError),
    #[error("GPU: {0}")]
    Gpu(String),
}

/// One failed teardown step; the remaining steps still ran.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct DisposalStepFailed {
    pub step: DisposeStep,
    #[source]
    pub source: EngineError,
}

/// A live particle simulation bound to one model.
pub trait ParticleEngine {
    /// Scene node under which the particles are drawn.
    fn node(&self) -> SceneNodeId;

    /// Advance the simulation by one step. Call at most once per frame.
    fn compute(&mut self);

    /// Push edited parameters (debug panel) into the engine's uniforms.
    fn apply_params(&mut self, params: &ModelParams);

    fn release_geometry(&mut self) -> Result<(), EngineError>;

    fn release_material(&mut self) -> Result<(), EngineError>;

    fn release_compute(&mut self) -> Result<(), EngineError>;
}

/// Builds engines; the only way a new engine comes into existence.
pub trait EngineFactory {
    type Engine: ParticleEngine;

    fn construct(&mut self, asset: &ModelAsset, params: &ModelParams) -> Result<Self::Engine, EngineError>;
}
