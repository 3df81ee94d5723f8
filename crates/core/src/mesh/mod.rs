//! Height field to mesh conversion
//!
//! [`MeshSynthesizer`] converts a whole field in one dispatch.
//! [`ChunkedMeshSynthesizer`] splits it into fixed-resolution tiles that
//! share their boundary vertices.

pub mod chunked;
pub mod synthesizer;

pub use chunked::ChunkedMeshSynthesizer;
pub use synthesizer::{MeshSynthesizer, MESH_SIZE_THRESHOLD};

use crate::error::{Result, TerrainError};

/// Decode the first `expected` native-endian values of a readback.
fn decode_words<T: bytemuck::Pod>(bytes: &[u8], expected: usize, what: &str) -> Result<Vec<T>> {
    let width = std::mem::size_of::<T>();
    let needed = expected * width;
    if bytes.len() < needed {
        return Err(TerrainError::Readback(format!(
            "{what} readback returned {} bytes, expected {needed}",
            bytes.len()
        )));
    }
    Ok(bytes[..needed]
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

pub(crate) fn decode_positions(bytes: &[u8], vertex_count: usize) -> Result<Vec<f32>> {
    decode_words(bytes, vertex_count * 3, "vertex")
}

pub(crate) fn decode_indices(bytes: &[u8], index_count: usize) -> Result<Vec<u32>> {
    decode_words(bytes, index_count, "triangle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_positions() {
        let bytes: Vec<u8> = [1.0_f32, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let positions = decode_positions(&bytes[..12], 1).unwrap();
        assert_eq!(positions, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_short_readback_is_an_error() {
        let err = decode_indices(&[0_u8; 10], 3).unwrap_err();
        assert!(matches!(err, TerrainError::Readback(_)));
    }
}
