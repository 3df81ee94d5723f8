//! Layered noise synthesis
//!
//! A field is built from up to [`MAX_NOISE_LAYERS`] independently seeded
//! layers. Each layer samples its noise basis at
//! `(pixel + offset) * scale_multiplier / 64`, optionally after domain
//! warping, and maps the result to `[0, 1]`. Layered synthesis sums
//! `value * weight` per pixel; the sum saturates at 1 when stored.

pub mod config;
pub mod packed;
pub mod synthesizer;

pub use config::{NoiseLayerConfig, NoiseLayerStack, NoiseType, MAX_NOISE_LAYERS};
pub use packed::{
    decode_layers, encode_layers, FieldKind, FieldSpec, LayerField, NOISE_LAYER_SCHEMA,
    NOISE_LAYER_SCHEMA_VERSION, NOISE_LAYER_STRIDE,
};
pub use synthesizer::NoiseFieldSynthesizer;
