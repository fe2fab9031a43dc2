use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// sRGB-encoded color with components in `[0, 1]`, as written in `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::from_rgb8(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    /// Decode to linear RGB for shading into an sRGB render target.
    pub fn to_linear_array(self) -> [f32; 3] {
        let decode = |c: f32| {
            let c = c.clamp(0.0, 1.0);
            if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
        };
        [decode(self.r), decode(self.g), decode(self.b)]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.to_rgb8();
        write!(f, "#{r:02X}{g:02X}{b:02X}")
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{s}`, expected #RRGGBB")))
    }
}

/// Per-activation particle parameters. Each activation owns its own copy, so
/// tuning them at runtime never touches the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub color: Color,
    pub size: f32,
    pub min_alpha: f32,
    pub max_alpha: f32,
    pub force: f32,
}

/// Catalog entry: a model identifier and its template parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    params: ModelParams,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, params: ModelParams) -> Self {
        Self { id: id.into(), params }
    }

    /// Template parameters, read-only.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Fresh, independently owned copy of the template parameters.
    pub fn instantiate(&self) -> ModelParams {
        self.params
    }
}

/// Ordered, immutable set of model descriptors.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<ModelDescriptor>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|d| d.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        let c = Color::from_hex("#F777A8").unwrap();
        assert_eq!(c.to_rgb8(), [0xF7, 0x77, 0xA8]);
        assert_eq!(Color::from_hex("77a8f7").unwrap().to_rgb8(), [0x77, 0xA8, 0xF7]);
        assert_eq!(c.to_string(), "#F777A8");
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(Color::from_hex("#F777A").is_none());
        assert!(Color::from_hex("#GG77A8").is_none());
        assert!(Color::from_hex("#F777Aé").is_none());
    }

    #[test]
    fn linear_decode_follows_the_srgb_curve() {
        let [r, g, b] = Color::from_hex("#F777A8").unwrap().to_linear_array();
        assert!((g - 0.1845).abs() < 1e-3, "0x77 decoded to {g}");
        assert!((r - 0.9301).abs() < 1e-3, "0xF7 decoded to {r}");
        assert!((b - 0.3916).abs() < 1e-3, "0xA8 decoded to {b}");
        assert_eq!(Color::rgb(0.0, 1.0, 0.02).to_linear_array(), [0.0, 1.0, 0.02 / 12.92]);
    }

    #[test]
    fn instantiated_params_are_detached_from_the_template() {
        let params = ModelParams {
            color: Color::from_rgb8(10, 20, 30),
            size: 1.7,
            min_alpha: 0.04,
            max_alpha: 0.8,
            force: 0.7,
        };
        let catalog = ModelCatalog::new(vec![ModelDescriptor::new("a", params)]);
        let mut copy = catalog.get("a").unwrap().instantiate();
        copy.color = Color::rgb(1.0, 1.0, 1.0);
        copy.size = 9.0;
        assert_eq!(*catalog.get("a").unwrap().params(), params);
    }
}
