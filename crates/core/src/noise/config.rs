//! Noise layer configuration

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core_types::IVec2;

/// Maximum number of layers a [`NoiseLayerStack`] holds
pub const MAX_NOISE_LAYERS: usize = 6;

/// Noise basis evaluated by a layer.
///
/// The discriminant is the value packed for the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum NoiseType {
    /// 2D simplex gradient noise
    #[default]
    Simplex = 0,
    /// Classic gradient noise with quintic fade
    Perlin = 1,
    /// Distance to the nearest feature point
    Voronoi = 2,
    /// Smooth minimum of feature point distances
    VoronoiSmoothed = 3,
}

impl NoiseType {
    /// All noise types in wire order
    pub const ALL: [Self; 4] = [
        Self::Simplex,
        Self::Perlin,
        Self::Voronoi,
        Self::VoronoiSmoothed,
    ];

    /// Value packed for the GPU
    pub fn wire_value(self) -> u32 {
        self as u32
    }

    /// Inverse of [`NoiseType::wire_value`]
    pub fn from_wire(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.wire_value() == value)
    }
}

/// One weighted noise contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseLayerConfig {
    /// Per-layer hash seed
    pub seed: u32,
    /// Noise basis
    pub noise_type: NoiseType,
    /// Domain translation in pixels
    pub offset: IVec2,
    /// Zoom factor applied to the sampling domain
    pub scale_multiplier: f32,
    /// Contribution in layered synthesis, clamped to `[0, 2]` when packed
    pub weight: f32,
    /// Displace the domain before sampling (roughly three times the cost)
    pub warp: bool,
}

impl Default for NoiseLayerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            noise_type: NoiseType::Simplex,
            offset: IVec2::zeros(),
            scale_multiplier: 1.0,
            weight: 1.0,
            warp: false,
        }
    }
}

impl NoiseLayerConfig {
    /// Layer of the given type and seed with default scale and weight
    pub fn new(noise_type: NoiseType, seed: u32) -> Self {
        Self {
            seed,
            noise_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.offset = IVec2::new(x, y);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale_multiplier: f32) -> Self {
        self.scale_multiplier = scale_multiplier;
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_warp(mut self, warp: bool) -> Self {
        self.warp = warp;
        self
    }
}

/// Ordered list of at most [`MAX_NOISE_LAYERS`] layers.
///
/// Longer inputs keep their first six layers in order. This also applies
/// when a stack is deserialized, so settings files cannot exceed the limit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<NoiseLayerConfig>", into = "Vec<NoiseLayerConfig>")]
pub struct NoiseLayerStack {
    layers: Vec<NoiseLayerConfig>,
}

impl NoiseLayerStack {
    /// Build a stack, truncating to [`MAX_NOISE_LAYERS`].
    pub fn new(mut layers: Vec<NoiseLayerConfig>) -> Self {
        if layers.len() > MAX_NOISE_LAYERS {
            warn!(
                "Noise stack has {} layers, keeping the first {}",
                layers.len(),
                MAX_NOISE_LAYERS
            );
            layers.truncate(MAX_NOISE_LAYERS);
        }
        Self { layers }
    }

    /// Stack holding a single layer
    pub fn single(layer: NoiseLayerConfig) -> Self {
        Self {
            layers: vec![layer],
        }
    }

    /// Append a layer. Returns `false` and drops the layer when the stack is full.
    pub fn push(&mut self, layer: NoiseLayerConfig) -> bool {
        if self.layers.len() >= MAX_NOISE_LAYERS {
            warn!("Noise stack is full, dropping layer with seed {}", layer.seed);
            return false;
        }
        self.layers.push(layer);
        true
    }

    pub fn layers(&self) -> &[NoiseLayerConfig] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [NoiseLayerConfig] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NoiseLayerConfig> {
        self.layers.iter()
    }
}

impl From<Vec<NoiseLayerConfig>> for NoiseLayerStack {
    fn from(layers: Vec<NoiseLayerConfig>) -> Self {
        Self::new(layers)
    }
}

impl From<NoiseLayerStack> for Vec<NoiseLayerConfig> {
    fn from(stack: NoiseLayerStack) -> Self {
        stack.layers
    }
}

impl<'a> IntoIterator for &'a NoiseLayerStack {
    type Item = &'a NoiseLayerConfig;
    type IntoIter = std::slice::Iter<'a, NoiseLayerConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}
