//! Application configuration: camera tuning and the model catalog.
//!
//! The built-in defaults reproduce the shipped gallery; a JSON file with the
//! same shape can replace them (`PARTICLE_GALLERY_CONFIG` on native).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::model::{Color, ModelCatalog, ModelDescriptor, ModelParams};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CameraSettings {
    pub move_speed: f32,
    pub look_sensitivity: f32,
    pub initial_position: [f32; 3],
    pub fov_y_deg: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            move_speed: 2.0,
            look_sensitivity: 0.002,
            initial_position: [0.0, 0.0, 1.5],
            fov_y_deg: 50.0,
        }
    }
}

/// One catalog entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    pub id: String,
    pub color: Color,
    pub size: f32,
    pub min_alpha: f32,
    pub max_alpha: f32,
    pub force: f32,
}

impl ModelEntry {
    fn builtin(id: &str, hex: &str) -> Self {
        Self {
            id: id.to_string(),
            color: Color::from_hex(hex).unwrap_or(Color::rgb(1.0, 1.0, 1.0)),
            size: 1.7,
            min_alpha: 0.04,
            max_alpha: 0.8,
            force: 0.7,
        }
    }

    fn to_descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new(
            self.id.clone(),
            ModelParams {
                color: self.color,
                size: self.size,
                min_alpha: self.min_alpha,
                max_alpha: self.max_alpha,
                force: self.force,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub camera: CameraSettings,
    pub models: Vec<ModelEntry>,
}

fn default_model() -> String {
    "apollo".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            camera: CameraSettings::default(),
            models: vec![
                ModelEntry::builtin("apollo", "#F777A8"),
                ModelEntry::builtin("athena", "#A8F777"),
                ModelEntry::builtin("hermes", "#77A8F7"),
            ],
        }
    }
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("catalog has no models".into()));
        }
        let mut seen = HashSet::new();
        for m in &self.models {
            if !seen.insert(m.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate model id `{}`", m.id)));
            }
            let alpha_ok = (0.0..=1.0).contains(&m.min_alpha)
                && (0.0..=1.0).contains(&m.max_alpha)
                && m.min_alpha <= m.max_alpha;
            if !alpha_ok {
                return Err(ConfigError::Invalid(format!(
                    "model `{}`: alpha range {}..{} must lie within 0..1 and be ordered",
                    m.id, m.min_alpha, m.max_alpha
                )));
            }
            if !(m.size > 0.0) || !m.force.is_finite() {
                return Err(ConfigError::Invalid(format!("model `{}`: size must be positive and force finite", m.id)));
            }
        }
        if !seen.contains(self.default_model.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "default model `{}` is not in the catalog",
                self.default_model
            )));
        }
        if !(self.camera.move_speed >= 0.0) || !(self.camera.fov_y_deg > 0.0 && self.camera.fov_y_deg < 180.0) {
            return Err(ConfigError::Invalid("camera move_speed must be >= 0 and fov_y_deg in (0, 180)".into()));
        }
        Ok(())
    }

    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.models.iter().map(ModelEntry::to_descriptor).collect())
    }
}
