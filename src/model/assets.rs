//! Keyed store of loaded model assets.
//!
//! The lifecycle manager only ever asks the store a synchronous question:
//! is the asset for this id loaded, and does it have any geometry? Loading
//! itself happens elsewhere (blocking on native, `fetch` on wasm).

use glam::Vec3;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("glTF parse error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("glTF file contains no mesh positions")]
    NoGeometry,
}

/// Point geometry extracted from a model file; every vertex becomes a particle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelAsset {
    pub positions: Vec<Vec3>,
}

impl ModelAsset {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self { positions }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Parse a `.glb`/`.gltf` blob, taking the positions of the first mesh primitive that has any.
    pub fn from_gltf_slice(bytes: &[u8]) -> Result<Self, AssetError> {
        let (document, buffers, _images) = gltf::import_slice(bytes)?;

        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
                if let Some(positions) = reader.read_positions() {
                    let positions: Vec<Vec3> = positions.map(Vec3::from).collect();
                    if !positions.is_empty() {
                        return Ok(Self::new(positions));
                    }
                }
            }
        }
        Err(AssetError::NoGeometry)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_gltf_slice(&bytes)
    }
}

/// Answer to "can this model be activated right now?".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssetStatus<'a> {
    Missing,
    Empty,
    Ready(&'a ModelAsset),
}

/// Synchronous, non-blocking view of loaded assets.
pub trait AssetSource {
    fn model(&self, id: &str) -> Option<&ModelAsset>;

    fn status(&self, id: &str) -> AssetStatus<'_> {
        match self.model(id) {
            None => AssetStatus::Missing,
            Some(asset) if asset.is_empty() => AssetStatus::Empty,
            Some(asset) => AssetStatus::Ready(asset),
        }
    }
}

#[derive(Debug, Default)]
pub struct AssetStore {
    models: HashMap<String, ModelAsset>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, asset: ModelAsset) {
        self.models.insert(id.into(), asset);
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load `<dir>/<id>.glb` for every id. Files that fail to load are logged
    /// and skipped; activating them later reports the model as not ready.
    pub fn load_dir<'a>(dir: impl AsRef<Path>, ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut store = Self::new();
        for id in ids {
            let path = dir.as_ref().join(format!("{id}.glb"));
            match ModelAsset::load_file(&path) {
                Ok(asset) => {
                    tracing::info!(model = id, vertices = asset.vertex_count(), "loaded {}", path.display());
                    store.insert(id, asset);
                }
                Err(e) => tracing::warn!(model = id, "failed to load {}: {e}", path.display()),
            }
        }
        store
    }
}

impl AssetSource for AssetStore {
    fn model(&self, id: &str) -> Option<&ModelAsset> {
        self.models.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_distinguishes_missing_empty_and_ready() {
        let mut store = AssetStore::new();
        store.insert("empty", ModelAsset::default());
        store.insert("full", ModelAsset::new(vec![Vec3::ZERO, Vec3::ONE]));

        assert_eq!(store.status("nope"), AssetStatus::Missing);
        assert_eq!(store.status("empty"), AssetStatus::Empty);
        match store.status("full") {
            AssetStatus::Ready(asset) => assert_eq!(asset.vertex_count(), 2),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = ModelAsset::from_gltf_slice(b"definitely not gltf").unwrap_err();
        assert!(matches!(err, AssetError::Gltf(_)));
    }

    #[test]
    fn missing_directory_yields_empty_store() {
        let store = AssetStore::load_dir("/nonexistent/particle-gallery", ["apollo"]);
        assert!(store.is_empty());
    }
}
