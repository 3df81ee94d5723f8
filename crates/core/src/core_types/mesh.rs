//! Geometry meshes produced from height fields
//!
//! A [`GeometryMesh`] keeps its derived data (normals and bounds) consistent
//! with its vertex positions: every constructor and every position update
//! recomputes both.

use super::vec3::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Bounds {
    /// Smallest box enclosing all points, or a zero box at the origin when empty.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: Vec3::zeros(),
                max: Vec3::zeros(),
            };
        };
        points.iter().skip(1).fold(
            Self {
                min: *first,
                max: *first,
            },
            |bounds, point| Self {
                min: bounds.min.inf(point),
                max: bounds.max.sup(point),
            },
        )
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths of the box
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Triangle mesh with derived per-vertex normals and bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryMesh {
    vertices: Vec<Vec3>,
    triangles: Vec<u32>,
    normals: Vec<Vec3>,
    bounds: Bounds,
}

impl GeometryMesh {
    /// Build a mesh and compute its normals and bounds.
    ///
    /// # Arguments
    /// * `vertices` - Vertex positions
    /// * `triangles` - Index triples into `vertices`; a trailing partial triple is ignored
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<u32>) -> Self {
        let mut mesh = Self {
            vertices,
            triangles,
            normals: Vec::new(),
            bounds: Bounds::from_points(&[]),
        };
        mesh.recalculate_normals();
        mesh.recalculate_bounds();
        mesh
    }

    /// Assemble a mesh from a packed `[x, y, z, x, y, z, ...]` vertex buffer.
    pub fn from_packed(positions: &[f32], triangles: Vec<u32>) -> Self {
        let vertices = positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect();
        Self::new(vertices, triangles)
    }

    /// Vertex positions
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Triangle indices (three per triangle)
    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }

    /// Per-vertex unit normals
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Axis-aligned bounds of the vertices
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of complete triangles, degenerate ones included
    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    /// Replace the vertex positions, recomputing normals and bounds.
    pub fn set_vertices(&mut self, vertices: Vec<Vec3>) {
        self.vertices = vertices;
        self.recalculate_normals();
        self.recalculate_bounds();
    }

    /// Overwrite individual normals, used by cross-chunk seam blending.
    pub(crate) fn normals_mut(&mut self) -> &mut [Vec3] {
        &mut self.normals
    }

    /// Area-weighted vertex normals.
    ///
    /// Degenerate triangles and out-of-range indices contribute nothing;
    /// vertices touched by no triangle get +Y.
    fn recalculate_normals(&mut self) {
        let mut accumulated = vec![Vec3::zeros(); self.vertices.len()];
        let count = self.vertices.len();

        for tri in self.triangles.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= count || b >= count || c >= count {
                continue;
            }
            // Cross product length is twice the triangle area
            let face = (self.vertices[b] - self.vertices[a])
                .cross(&(self.vertices[c] - self.vertices[a]));
            accumulated[a] += face;
            accumulated[b] += face;
            accumulated[c] += face;
        }

        self.normals = accumulated
            .into_iter()
            .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y))
            .collect();
    }

    fn recalculate_bounds(&mut self) {
        self.bounds = Bounds::from_points(&self.vertices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_quad() -> GeometryMesh {
        // 2x2 grid laid out the way the mesh kernels emit it
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
        ];
        GeometryMesh::new(vertices, vec![0, 2, 1, 1, 2, 3])
    }

    #[test]
    fn test_flat_quad_normals_point_up() {
        let mesh = flat_quad();
        assert_eq!(mesh.normals().len(), 4);
        for normal in mesh.normals() {
            assert_relative_eq!(*normal, Vec3::y(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_degenerate_triangles_ignored() {
        let mut mesh = flat_quad();
        let mut triangles = mesh.triangles().to_vec();
        triangles.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        mesh = GeometryMesh::new(mesh.vertices().to_vec(), triangles);

        assert_eq!(mesh.triangle_count(), 4);
        assert_relative_eq!(mesh.normals()[0], Vec3::y(), epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_follow_vertex_updates() {
        let mut mesh = flat_quad();
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 0.0, 1.0));

        let mut vertices = mesh.vertices().to_vec();
        vertices[3].y = 4.0;
        mesh.set_vertices(vertices);

        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 4.0, 1.0));
        assert_relative_eq!(mesh.bounds().center(), Vec3::new(0.5, 2.0, 0.5));
        // The raised corner tilts the second triangle
        assert!(mesh.normals()[3].y < 1.0);
    }

    #[test]
    fn test_from_packed_positions() {
        let mesh = GeometryMesh::from_packed(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], Vec::new());
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.vertices()[1], Vec3::new(3.0, 4.0, 5.0));
        // No triangles: isolated vertices default to +Y
        assert_eq!(mesh.normals()[0], Vec3::y());
    }

    #[test]
    fn test_empty_bounds() {
        let bounds = Bounds::from_points(&[]);
        assert_eq!(bounds.size(), Vec3::zeros());
    }
}
