//! GPU layout of a noise layer
//!
//! Layers are uploaded as a structured buffer of fixed-stride little-endian
//! records. The layout is the field table [`NOISE_LAYER_SCHEMA`]; records are
//! written one field at a time so host struct layout never leaks into the
//! wire format. The WGSL `NoiseConfig` struct mirrors this table.
//!
//! | offset | field              | type  |
//! |--------|--------------------|-------|
//! | 0      | `seed`             | `u32` |
//! | 4      | `noise_type`       | `u32` |
//! | 8      | `offset_x`         | `i32` |
//! | 12     | `offset_y`         | `i32` |
//! | 16     | `scale_multiplier` | `f32` |
//! | 20     | `weight`           | `f32` |
//! | 24     | `warp`             | `i32` |

use super::config::{NoiseLayerConfig, NoiseType};
use crate::core_types::IVec2;
use crate::error::{Result, TerrainError};

/// Bumped whenever [`NOISE_LAYER_SCHEMA`] changes
pub const NOISE_LAYER_SCHEMA_VERSION: u32 = 1;

/// Bytes per packed layer
pub const NOISE_LAYER_STRIDE: usize = 28;

/// Weight range accepted by the layered kernel
pub const WEIGHT_RANGE: (f32, f32) = (0.0, 2.0);

/// Scalar type of a packed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U32,
    I32,
    F32,
}

impl FieldKind {
    /// Width in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }
}

/// Which layer property a packed field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerField {
    Seed,
    NoiseType,
    OffsetX,
    OffsetY,
    ScaleMultiplier,
    Weight,
    Warp,
}

/// One entry of the packed layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: LayerField,
    pub kind: FieldKind,
    pub offset: usize,
}

impl FieldSpec {
    const fn new(field: LayerField, kind: FieldKind, offset: usize) -> Self {
        Self {
            field,
            kind,
            offset,
        }
    }

    /// Byte range inside a record
    pub const fn end(&self) -> usize {
        self.offset + self.kind.width()
    }
}

/// Packed layer layout, version [`NOISE_LAYER_SCHEMA_VERSION`]
pub const NOISE_LAYER_SCHEMA: [FieldSpec; 7] = [
    FieldSpec::new(LayerField::Seed, FieldKind::U32, 0),
    FieldSpec::new(LayerField::NoiseType, FieldKind::U32, 4),
    FieldSpec::new(LayerField::OffsetX, FieldKind::I32, 8),
    FieldSpec::new(LayerField::OffsetY, FieldKind::I32, 12),
    FieldSpec::new(LayerField::ScaleMultiplier, FieldKind::F32, 16),
    FieldSpec::new(LayerField::Weight, FieldKind::F32, 20),
    FieldSpec::new(LayerField::Warp, FieldKind::I32, 24),
];

const fn schema_width(schema: &[FieldSpec]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < schema.len() {
        total += schema[i].kind.width();
        i += 1;
    }
    total
}

/// Fields are packed back to back with no gaps or overlaps
const fn schema_is_contiguous(schema: &[FieldSpec]) -> bool {
    let mut expected = 0;
    let mut i = 0;
    while i < schema.len() {
        if schema[i].offset != expected {
            return false;
        }
        expected = schema[i].end();
        i += 1;
    }
    true
}

const _: () = assert!(schema_width(&NOISE_LAYER_SCHEMA) == NOISE_LAYER_STRIDE);
const _: () = assert!(NOISE_LAYER_SCHEMA[NOISE_LAYER_SCHEMA.len() - 1].end() == NOISE_LAYER_STRIDE);
const _: () = assert!(schema_is_contiguous(&NOISE_LAYER_SCHEMA));

fn packed_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        return WEIGHT_RANGE.0;
    }
    weight.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1)
}

fn encode_layer(layer: &NoiseLayerConfig, record: &mut [u8]) {
    for spec in &NOISE_LAYER_SCHEMA {
        let bytes = match spec.field {
            LayerField::Seed => layer.seed.to_le_bytes(),
            LayerField::NoiseType => layer.noise_type.wire_value().to_le_bytes(),
            LayerField::OffsetX => layer.offset.x.to_le_bytes(),
            LayerField::OffsetY => layer.offset.y.to_le_bytes(),
            LayerField::ScaleMultiplier => layer.scale_multiplier.to_le_bytes(),
            LayerField::Weight => packed_weight(layer.weight).to_le_bytes(),
            LayerField::Warp => i32::from(layer.warp).to_le_bytes(),
        };
        record[spec.offset..spec.end()].copy_from_slice(&bytes);
    }
}

/// Pack layers into `layers.len() * NOISE_LAYER_STRIDE` bytes.
pub fn encode_layers(layers: &[NoiseLayerConfig]) -> Vec<u8> {
    let mut bytes = vec![0_u8; layers.len() * NOISE_LAYER_STRIDE];
    for (layer, record) in layers.iter().zip(bytes.chunks_exact_mut(NOISE_LAYER_STRIDE)) {
        encode_layer(layer, record);
    }
    bytes
}

fn word(record: &[u8], spec: &FieldSpec) -> [u8; 4] {
    let mut bytes = [0_u8; 4];
    bytes.copy_from_slice(&record[spec.offset..spec.end()]);
    bytes
}

/// Unpack records written by [`encode_layers`].
///
/// # Errors
/// Returns [`TerrainError::InvalidParameter`] if the length is not a whole
/// number of records or a noise type is unknown
pub fn decode_layers(bytes: &[u8]) -> Result<Vec<NoiseLayerConfig>> {
    if bytes.len() % NOISE_LAYER_STRIDE != 0 {
        return Err(TerrainError::invalid_parameter(
            "bytes",
            format!(
                "{} bytes is not a multiple of the {NOISE_LAYER_STRIDE}-byte stride",
                bytes.len()
            ),
        ));
    }

    bytes
        .chunks_exact(NOISE_LAYER_STRIDE)
        .map(|record| -> Result<NoiseLayerConfig> {
            let mut layer = NoiseLayerConfig::default();
            let mut offset = IVec2::zeros();
            for spec in &NOISE_LAYER_SCHEMA {
                let raw = word(record, spec);
                match spec.field {
                    LayerField::Seed => layer.seed = u32::from_le_bytes(raw),
                    LayerField::NoiseType => {
                        let value = u32::from_le_bytes(raw);
                        layer.noise_type = NoiseType::from_wire(value).ok_or_else(|| {
                            TerrainError::invalid_parameter(
                                "noise_type",
                                format!("unknown wire value {value}"),
                            )
                        })?;
                    }
                    LayerField::OffsetX => offset.x = i32::from_le_bytes(raw),
                    LayerField::OffsetY => offset.y = i32::from_le_bytes(raw),
                    LayerField::ScaleMultiplier => {
                        layer.scale_multiplier = f32::from_le_bytes(raw);
                    }
                    LayerField::Weight => layer.weight = f32::from_le_bytes(raw),
                    LayerField::Warp => layer.warp = i32::from_le_bytes(raw) != 0,
                }
            }
            layer.offset = offset;
            Ok(layer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_offsets() {
        let offsets: Vec<usize> = NOISE_LAYER_SCHEMA.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20, 24]);
        assert_eq!(schema_width(&NOISE_LAYER_SCHEMA), 28);
        assert_eq!(NOISE_LAYER_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_encode_places_fields_little_endian() {
        let layer = NoiseLayerConfig::new(NoiseType::Voronoi, 0x0102_0304)
            .with_offset(-1, 7)
            .with_scale(2.5)
            .with_weight(0.75)
            .with_warp(true);
        let bytes = encode_layers(&[layer]);

        assert_eq!(bytes.len(), NOISE_LAYER_STRIDE);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..8], &2_u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-1_i32).to_le_bytes());
        assert_eq!(&bytes[12..16], &7_i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &2.5_f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &0.75_f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &1_i32.to_le_bytes());
    }

    #[test]
    fn test_records_are_strided() {
        let layers = [
            NoiseLayerConfig::new(NoiseType::Simplex, 11),
            NoiseLayerConfig::new(NoiseType::Perlin, 22),
            NoiseLayerConfig::new(NoiseType::VoronoiSmoothed, 33),
        ];
        let bytes = encode_layers(&layers);
        assert_eq!(bytes.len(), 3 * NOISE_LAYER_STRIDE);
        assert_eq!(&bytes[56..60], &33_u32.to_le_bytes());
        assert_eq!(&bytes[60..64], &3_u32.to_le_bytes());
        assert_eq!(decode_layers(&bytes).unwrap(), layers.to_vec());
    }

    #[test]
    fn test_weight_is_clamped_when_packed() {
        let heavy = NoiseLayerConfig::default().with_weight(5.0);
        let negative = NoiseLayerConfig::default().with_weight(-1.0);
        let nan = NoiseLayerConfig::default().with_weight(f32::NAN);
        let bytes = encode_layers(&[heavy, negative, nan]);
        let decoded = decode_layers(&bytes).unwrap();
        assert_eq!(decoded[0].weight, 2.0);
        assert_eq!(decoded[1].weight, 0.0);
        assert_eq!(decoded[2].weight, 0.0);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_layers(&[0_u8; 27]).is_err());
        let mut bytes = encode_layers(&[NoiseLayerConfig::default()]);
        bytes[4] = 9;
        assert!(decode_layers(&bytes).is_err());
    }
}
