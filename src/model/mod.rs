// MODEL: Camera, catalog, assets and the engine interface
pub mod assets;
pub mod camera;
pub mod catalog;
pub mod engine;
pub mod scene;

pub use assets::{AssetError, AssetSource, AssetStatus, AssetStore, ModelAsset};
pub use camera::{Camera, LockState};
pub use catalog::{Color, ModelCatalog, ModelDescriptor, ModelParams};
pub use engine::{DisposalStepFailed, DisposeStep, EngineError, EngineFactory, ParticleEngine};
pub use scene::{Scene, SceneError, SceneNodeId};
