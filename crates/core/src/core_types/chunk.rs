//! Chunk tiling of height fields
//!
//! Large fields are split into square tiles of a fixed vertex resolution.
//! Adjacent tiles overlap by one row/column of vertices: tile `(i, j)` starts
//! at vertex-space offset `(i·(d−1), j·(d−1))`, so the last column of one
//! tile and the first column of the next sample the same heights.
//!
//! Normals are computed per tile. Vertices on a shared edge therefore get
//! normals that only see one side of the seam, which can show as a lighting
//! crease. [`ChunkGrid::blend_seam_normals`] averages them when that matters.

use serde::{Deserialize, Serialize};

use super::mesh::GeometryMesh;
use super::vec3::Vec2;
use crate::error::{Result, TerrainError};

/// Supported per-tile vertex grid dimensions (both axes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChunkResolution {
    #[serde(rename = "16x16")]
    R16,
    #[serde(rename = "32x32")]
    R32,
    #[default]
    #[serde(rename = "64x64")]
    R64,
    #[serde(rename = "128x128")]
    R128,
    #[serde(rename = "256x256")]
    R256,
}

impl ChunkResolution {
    /// All supported resolutions, smallest first
    pub const ALL: [Self; 5] = [Self::R16, Self::R32, Self::R64, Self::R128, Self::R256];

    /// Vertices along one edge of a tile
    pub fn dimension(self) -> u32 {
        match self {
            Self::R16 => 16,
            Self::R32 => 32,
            Self::R64 => 64,
            Self::R128 => 128,
            Self::R256 => 256,
        }
    }

    /// Vertices in one tile
    pub fn vertex_count(self) -> usize {
        let d = self.dimension() as usize;
        d * d
    }
}

impl TryFrom<u32> for ChunkResolution {
    type Error = TerrainError;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.dimension() == value)
            .ok_or_else(|| {
                TerrainError::invalid_parameter(
                    "chunk_resolution",
                    format!("must be one of 16, 32, 64, 128, 256, got {value}"),
                )
            })
    }
}

impl std::fmt::Display for ChunkResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.dimension();
        write!(f, "{d}x{d}")
    }
}

/// Tile grid shape and per-tile offsets for one chunked generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkLayout {
    /// Tiles along the field's X axis (never zero)
    pub cols: u32,
    /// Tiles along the field's Y axis (never zero)
    pub rows: u32,
    /// Vertices along one tile edge
    pub chunk_dimension: u32,
    /// Per-axis compensation when the field is smaller than one tile, in (0, 1]
    pub scale: Vec2,
    /// Caller-supplied footprint scaling
    pub scaling: f32,
}

impl ChunkLayout {
    /// Compute the tile grid for a field.
    ///
    /// # Arguments
    /// * `texture_width` - Field width in pixels
    /// * `texture_height` - Field height in pixels
    /// * `resolution` - Tile resolution
    /// * `scaling` - Footprint scaling; larger values give fewer, larger chunks
    ///
    /// An axis holds at most one tile per field pixel along it. Past that,
    /// consecutive tiles would start less than a pixel apart.
    ///
    /// # Errors
    /// Returns [`TerrainError::InvalidParameter`] if `scaling` is not finite and positive,
    /// or is small enough to exceed the tile ceiling
    pub fn compute(
        texture_width: u32,
        texture_height: u32,
        resolution: ChunkResolution,
        scaling: f32,
    ) -> Result<Self> {
        if !scaling.is_finite() || scaling <= 0.0 {
            return Err(TerrainError::invalid_parameter(
                "scaling",
                format!("must be finite and positive, got {scaling}"),
            ));
        }

        let chunk_dimension = resolution.dimension();
        let tiles = |extent: u32| -> Result<u32> {
            let whole = (extent / chunk_dimension).max(1);
            let count = whole as f32 / scaling;
            let ceiling = extent.max(1);
            if count > ceiling as f32 {
                return Err(TerrainError::invalid_parameter(
                    "scaling",
                    format!("{count} tiles on a {extent}-pixel axis, ceiling is {ceiling}"),
                ));
            }
            Ok((count as u32).max(1))
        };
        let axis_scale =
            |extent: u32| (extent as f32 / chunk_dimension as f32).clamp(0.0, 1.0).min(1.0);

        Ok(Self {
            cols: tiles(texture_width)?,
            rows: tiles(texture_height)?,
            chunk_dimension,
            scale: Vec2::new(axis_scale(texture_width), axis_scale(texture_height)),
            scaling,
        })
    }

    /// Number of tiles
    pub fn tile_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Flat index of tile `(i, j)`
    pub fn index(&self, i: u32, j: u32) -> usize {
        i as usize + j as usize * self.cols as usize
    }

    /// Tile coordinates in row-major order
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> {
        let (cols, rows) = (self.cols, self.rows);
        (0..rows).flat_map(move |j| (0..cols).map(move |i| (i, j)))
    }

    /// Vertex-space origin of tile `(i, j)`; neighbours share one row/column
    pub fn vertex_offset(&self, i: u32, j: u32) -> Vec2 {
        let step = (self.chunk_dimension - 1) as f32;
        Vec2::new(i as f32 * step, j as f32 * step)
    }

    /// Placement of tile `(i, j)` relative to the grid origin
    pub fn placement(&self, i: u32, j: u32) -> Vec2 {
        self.vertex_offset(i, j) * self.scaling
    }

    /// Scale factor bound for the vertex kernel (`scale * scaling`)
    pub fn kernel_scale(&self) -> Vec2 {
        self.scale * self.scaling
    }
}

/// Matrix of chunk meshes with one placement offset per chunk.
#[derive(Debug, Clone)]
pub struct ChunkGrid {
    cols: u32,
    rows: u32,
    chunk_dimension: u32,
    meshes: Vec<GeometryMesh>,
    offsets: Vec<Vec2>,
}

impl ChunkGrid {
    /// Assemble a grid from meshes and offsets stored at `i + j * cols`.
    ///
    /// # Errors
    /// Returns [`TerrainError::InvalidParameter`] if either sequence length differs from `cols * rows`
    pub fn new(
        cols: u32,
        rows: u32,
        chunk_dimension: u32,
        meshes: Vec<GeometryMesh>,
        offsets: Vec<Vec2>,
    ) -> Result<Self> {
        let expected = cols as usize * rows as usize;
        if meshes.len() != expected || offsets.len() != expected {
            return Err(TerrainError::invalid_parameter(
                "chunk_grid",
                format!(
                    "{cols}x{rows} grid needs {expected} meshes and offsets, got {} and {}",
                    meshes.len(),
                    offsets.len()
                ),
            ));
        }
        Ok(Self {
            cols,
            rows,
            chunk_dimension,
            meshes,
            offsets,
        })
    }

    /// Chunks along X
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Chunks along Y
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Vertices along one chunk edge
    pub fn chunk_dimension(&self) -> u32 {
        self.chunk_dimension
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Always false for grids built by the synthesizer
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Mesh at `(i, j)`
    pub fn mesh(&self, i: u32, j: u32) -> Option<&GeometryMesh> {
        self.flat_index(i, j).map(|index| &self.meshes[index])
    }

    /// Placement offset of `(i, j)`
    pub fn offset(&self, i: u32, j: u32) -> Option<Vec2> {
        self.flat_index(i, j).map(|index| self.offsets[index])
    }

    /// All placement offsets, indexed `i + j * cols`
    pub fn offsets(&self) -> &[Vec2] {
        &self.offsets
    }

    /// All meshes, indexed `i + j * cols`
    pub fn meshes(&self) -> &[GeometryMesh] {
        &self.meshes
    }

    /// Iterate `(i, j, mesh, offset)` in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &GeometryMesh, Vec2)> + '_ {
        let cols = self.cols;
        self.meshes
            .iter()
            .zip(&self.offsets)
            .enumerate()
            .map(move |(index, (mesh, offset))| {
                let index = index as u32;
                (index % cols, index / cols, mesh, *offset)
            })
    }

    /// Split into meshes and offsets.
    pub fn into_parts(self) -> (Vec<GeometryMesh>, Vec<Vec2>) {
        (self.meshes, self.offsets)
    }

    /// Average normals along shared chunk edges.
    ///
    /// Runs a horizontal pass then a vertical pass, so corners shared by four
    /// chunks end up with the mean of all four. Positions, triangles and
    /// bounds are left untouched.
    pub fn blend_seam_normals(&mut self) {
        let d = self.chunk_dimension as usize;
        if d < 2 {
            return;
        }

        for j in 0..self.rows {
            for i in 0..self.cols.saturating_sub(1) {
                let left = self.meshes_index(i, j);
                let right = self.meshes_index(i + 1, j);
                let pairs = (0..d).map(|y| (y * d + (d - 1), y * d));
                self.average_pairs(left, right, pairs);
            }
        }

        for j in 0..self.rows.saturating_sub(1) {
            for i in 0..self.cols {
                let top = self.meshes_index(i, j);
                let bottom = self.meshes_index(i, j + 1);
                let pairs = (0..d).map(|x| ((d - 1) * d + x, x));
                self.average_pairs(top, bottom, pairs);
            }
        }
    }

    fn average_pairs(
        &mut self,
        first: usize,
        second: usize,
        pairs: impl Iterator<Item = (usize, usize)>,
    ) {
        let (head, tail) = self.meshes.split_at_mut(second);
        let a = head[first].normals_mut();
        let b = tail[0].normals_mut();
        for (ia, ib) in pairs {
            if ia >= a.len() || ib >= b.len() {
                continue;
            }
            let blended = (a[ia] + b[ib]).try_normalize(f32::EPSILON).unwrap_or(a[ia]);
            a[ia] = blended;
            b[ib] = blended;
        }
    }

    fn meshes_index(&self, i: u32, j: u32) -> usize {
        i as usize + j as usize * self.cols as usize
    }

    fn flat_index(&self, i: u32, j: u32) -> Option<usize> {
        (i < self.cols && j < self.rows).then(|| self.meshes_index(i, j))
    }
}
