use crate::model::{DisposalStepFailed, DisposeStep, EngineError, ParticleEngine, Scene};

/// Identity of one occupant of an `EngineSlot`; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub u64);

/// Result of `EngineSlot::replace`.
#[derive(Debug)]
pub struct Replacement {
    /// Teardown steps of the previous occupant that failed (all steps were still attempted).
    pub disposal_failures: Vec<DisposalStepFailed>,
    /// Whether a new occupant was built; on error the slot is left empty.
    pub outcome: Result<BindingId, EngineError>,
}

/// Owned slot holding at most one live engine.
///
/// `replace` fully tears down the current occupant before the factory is
/// invoked, so two engines never hold GPU resources at the same time.
pub struct EngineSlot<E: ParticleEngine> {
    live: Option<(BindingId, E)>,
    next_id: u64,
}

impl<E: ParticleEngine> Default for EngineSlot<E> {
    fn default() -> Self {
        Self { live: None, next_id: 1 }
    }
}

impl<E: ParticleEngine> EngineSlot<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_occupied(&self) -> bool {
        self.live.is_some()
    }

    pub fn binding_id(&self) -> Option<BindingId> {
        self.live.as_ref().map(|(id, _)| *id)
    }

    pub fn get(&self) -> Option<&E> {
        self.live.as_ref().map(|(_, e)| e)
    }

    pub fn get_mut(&mut self) -> Option<&mut E> {
        self.live.as_mut().map(|(_, e)| e)
    }

    /// Tear down the occupant, if any. Every step runs even if an earlier one fails.
    pub fn dispose(&mut self, scene: &mut Scene) -> Vec<DisposalStepFailed> {
        let Some((id, mut engine)) = self.live.take() else {
            return Vec::new();
        };

        let mut failures = Vec::new();
        for step in DisposeStep::ORDER {
            let result = match step {
                DisposeStep::DetachFromScene => scene.detach(engine.node()).map_err(EngineError::from),
                DisposeStep::Geometry => engine.release_geometry(),
                DisposeStep::Material => engine.release_material(),
                DisposeStep::Compute => engine.release_compute(),
            };
            if let Err(source) = result {
                tracing::warn!(binding = id.0, "{step} failed: {source}");
                failures.push(DisposalStepFailed { step, source });
            }
        }
        tracing::debug!(binding = id.0, failed_steps = failures.len(), "engine disposed");
        failures
    }

    /// Dispose the current occupant, then build and attach a new one.
    pub fn replace<F>(&mut self, scene: &mut Scene, build: F) -> Replacement
    where
        F: FnOnce() -> Result<E, EngineError>,
    {
        let disposal_failures = self.dispose(scene);
        debug_assert!(self.live.is_none());

        let outcome = build().map(|engine| {
            let id = BindingId(self.next_id);
            self.next_id += 1;
            scene.attach(engine.node());
            self.live = Some((id, engine));
            id
        });

        Replacement { disposal_failures, outcome }
    }
}
