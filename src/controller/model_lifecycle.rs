use std::fmt;

use super::engine_slot::{BindingId, EngineSlot};
use crate::model::{
    AssetSource, AssetStatus, EngineError, EngineFactory, ModelCatalog, ModelParams, ParticleEngine, Scene,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    NotInCatalog,
    AssetMissing,
    AssetEmpty,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotReadyReason::NotInCatalog => "not in catalog",
            NotReadyReason::AssetMissing => "asset not loaded",
            NotReadyReason::AssetEmpty => "asset has no geometry",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("model `{model_id}` not ready: {reason}")]
    ModelNotReady { model_id: String, reason: NotReadyReason },
    #[error("engine construction failed for `{model_id}`: {source}")]
    EngineConstructionFailed {
        model_id: String,
        #[source]
        source: EngineError,
    },
}

/// The model currently selected and the engine (if any) simulating it.
pub struct ActiveModelSession<E: ParticleEngine> {
    model_id: Option<String>,
    params: Option<ModelParams>,
    binding: EngineSlot<E>,
}

impl<E: ParticleEngine> ActiveModelSession<E> {
    fn empty() -> Self {
        Self { model_id: None, params: None, binding: EngineSlot::new() }
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn params(&self) -> Option<&ModelParams> {
        self.params.as_ref()
    }

    pub fn engine(&self) -> Option<&E> {
        self.binding.get()
    }

    pub fn binding_id(&self) -> Option<BindingId> {
        self.binding.binding_id()
    }
}

/// Owns the active model session and is the only code that creates, steps or
/// destroys particle engines.
pub struct ModelLifecycleManager<F: EngineFactory> {
    catalog: ModelCatalog,
    factory: F,
    session: ActiveModelSession<F::Engine>,
}

impl<F: EngineFactory> ModelLifecycleManager<F> {
    pub fn new(catalog: ModelCatalog, factory: F) -> Self {
        Self { catalog, factory, session: ActiveModelSession::empty() }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn session(&self) -> &ActiveModelSession<F::Engine> {
        &self.session
    }

    pub fn active_model(&self) -> Option<&str> {
        self.session.model_id()
    }

    pub fn has_binding(&self) -> bool {
        self.session.binding.is_occupied()
    }

    /// Switch to `model_id`, rebuilding the engine from a fresh copy of its catalog entry.
    ///
    /// Re-activating the current model is a full dispose/rebuild, which resets
    /// its simulation. If the model is not ready nothing is torn down.
    pub fn activate(
        &mut self,
        model_id: &str,
        assets: &dyn AssetSource,
        scene: &mut Scene,
    ) -> Result<BindingId, LifecycleError> {
        let not_ready = |reason| {
            let err = LifecycleError::ModelNotReady { model_id: model_id.to_string(), reason };
            tracing::warn!("{err}");
            err
        };

        let descriptor = self
            .catalog
            .get(model_id)
            .ok_or_else(|| not_ready(NotReadyReason::NotInCatalog))?;
        let asset = match assets.status(model_id) {
            AssetStatus::Ready(asset) => asset,
            AssetStatus::Missing => return Err(not_ready(NotReadyReason::AssetMissing)),
            AssetStatus::Empty => return Err(not_ready(NotReadyReason::AssetEmpty)),
        };

        let params = descriptor.instantiate();
        let factory = &mut self.factory;
        let replacement = self
            .session
            .binding
            .replace(scene, || factory.construct(asset, &params));

        self.session.model_id = Some(model_id.to_string());
        self.session.params = Some(params);

        match replacement.outcome {
            Ok(id) => {
                tracing::info!(
                    model = model_id,
                    binding = id.0,
                    particles = asset.vertex_count(),
                    disposal_failures = replacement.disposal_failures.len(),
                    "model activated"
                );
                Ok(id)
            }
            Err(source) => {
                let err = LifecycleError::EngineConstructionFailed { model_id: model_id.to_string(), source };
                tracing::error!("{err}");
                Err(err)
            }
        }
    }

    /// Re-activate the current model, restarting its simulation.
    pub fn reset(&mut self, assets: &dyn AssetSource, scene: &mut Scene) -> Option<Result<BindingId, LifecycleError>> {
        let id = self.session.model_id.clone()?;
        Some(self.activate(&id, assets, scene))
    }

    /// Advance the live engine by one step. Call exactly once per frame.
    pub fn update(&mut self) -> bool {
        match self.session.binding.get_mut() {
            Some(engine) => {
                engine.compute();
                true
            }
            None => false,
        }
    }

    /// Replace the session's parameters (debug-panel edits) and push them into
    /// the live engine. The catalog is never touched.
    pub fn set_params(&mut self, params: ModelParams) {
        if self.session.params.is_none() {
            return;
        }
        self.session.params = Some(params);
        if let Some(engine) = self.session.binding.get_mut() {
            engine.apply_params(&params);
        }
    }

    /// Tear down the live engine, e.g. before the GPU device goes away.
    pub fn shutdown(&mut self, scene: &mut Scene) {
        let failures = self.session.binding.dispose(scene);
        if !failures.is_empty() {
            tracing::warn!(failed_steps = failures.len(), "engine teardown at shutdown was incomplete");
        }
    }
}
