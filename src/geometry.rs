//! CPU-side geometry: file loading, tangent generation and primitives.
//!
//! [`RawGeometry`] is the intermediate between a file (or a generator) and a GPU
//! [`Mesh`](crate::Mesh). Files are parsed into it, adjusted (recentered,
//! resized), and then uploaded.
//!
//! # Supported formats
//!
//! - `.obj` via `tobj`. Faces are triangulated and each unique
//!   position/uv/normal combination becomes one vertex. OBJ files are
//!   right-handed; loading converts them to the renderer's left-handed space by
//!   negating Z on positions and normals, flipping V, and reversing the winding
//!   of every triangle. Missing normals are rebuilt from the faces.
//! - `.stl` via `stl_io` (binary and ASCII). No UVs; each face keeps its facet
//!   normal.
//!
//! Tangents are generated after loading from the UV gradients of each triangle.
//!
//! # Winding
//!
//! Front faces are clockwise when seen from outside. For every triangle in this
//! module `(p1 - p0).cross(p2 - p0)` points away from the surface.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use glam::{Vec2, Vec3};

use crate::error::RenderError;
use crate::mesh::Vertex;

/// Raw geometry data before GPU upload.
#[derive(Clone, Debug, Default)]
pub struct RawGeometry {
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Loads geometry from a file, detecting the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let geometry = match ext.as_str() {
            "obj" => Self::load_obj(path)?,
            "stl" => {
                let file = File::open(path).map_err(|e| RenderError::Geometry {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                Self::parse_stl(&mut BufReader::new(file)).map_err(|reason| {
                    RenderError::Geometry {
                        path: path.to_path_buf(),
                        reason,
                    }
                })?
            }
            _ => return Err(RenderError::UnknownGeometryFormat(ext)),
        };

        if geometry.indices.is_empty() {
            return Err(RenderError::EmptyGeometry(path.to_path_buf()));
        }
        Ok(geometry)
    }

    fn load_obj(path: &Path) -> Result<Self, RenderError> {
        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ignore_points: true,
            ignore_lines: true,
        };
        let (models, _) =
            tobj::load_obj(path, &load_options).map_err(|e| RenderError::Geometry {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut geometry = RawGeometry::default();
        let mut missing_normals = false;

        for model in &models {
            let mesh = &model.mesh;
            let base = geometry.vertices.len() as u32;
            let count = mesh.positions.len() / 3;
            missing_normals |= mesh.normals.len() < count * 3;

            for i in 0..count {
                let p = &mesh.positions[i * 3..i * 3 + 3];
                let normal = mesh
                    .normals
                    .get(i * 3..i * 3 + 3)
                    .map_or([0.0; 3], |n| [n[0], n[1], -n[2]]);
                let uv = mesh
                    .texcoords
                    .get(i * 2..i * 2 + 2)
                    .map_or([0.0; 2], |t| [t[0], 1.0 - t[1]]);
                geometry
                    .vertices
                    .push(Vertex::new([p[0], p[1], -p[2]], uv, normal));
            }

            // Mirroring Z flips handedness, so reverse each triangle to keep it front facing.
            for tri in mesh.indices.chunks_exact(3) {
                geometry
                    .indices
                    .extend_from_slice(&[base + tri[0], base + tri[2], base + tri[1]]);
            }
        }

        if missing_normals {
            log::debug!("{} has no normals, rebuilding them", path.display());
            geometry.recalculate_normals();
        }
        geometry.compute_tangents();
        Ok(geometry)
    }

    /// Parses an STL stream. Tangents are generated.
    pub fn parse_stl<R: Read + Seek>(reader: &mut R) -> Result<Self, String> {
        let stl = stl_io::read_stl(reader).map_err(|e| format!("STL parse error: {}", e))?;

        let mut vertices = Vec::with_capacity(stl.faces.len() * 3);
        let mut indices = Vec::with_capacity(stl.faces.len() * 3);

        for (i, face) in stl.faces.iter().enumerate() {
            let n: [f32; 3] = face.normal.into();
            let normal = [n[0], n[1], -n[2]];
            for &vertex_idx in &face.vertices {
                let p: [f32; 3] = stl.vertices[vertex_idx].into();
                vertices.push(Vertex::new([p[0], p[1], -p[2]], [0.0, 0.0], normal));
            }
            let base = (i * 3) as u32;
            indices.extend_from_slice(&[base, base + 2, base + 1]);
        }

        let mut geometry = RawGeometry::new(vertices, indices);
        geometry.compute_tangents();
        Ok(geometry)
    }

    /// Returns `(min, max)` corners of the axis-aligned bounding box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        let (min, max) = self.bounds();
        max - min
    }

    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) + offset).into();
        }
    }

    /// Scales all vertices uniformly around the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) * factor).into();
        }
    }

    /// Centers the bounding box on the origin.
    pub fn recenter(&mut self) {
        let center = self.center();
        self.translate(-center);
    }

    /// Scales so the largest bounding box dimension is 1.
    pub fn normalize_size(&mut self) {
        let size = self.size();
        let max_dim = size.max_element();
        if max_dim > 0.0 {
            self.scale(1.0 / max_dim);
        }
    }

    /// Rebuilds smooth vertex normals by summing area-weighted face normals.
    pub fn recalculate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = [0.0; 3];
        }

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let p0 = Vec3::from(self.vertices[i0].position);
            let p1 = Vec3::from(self.vertices[i1].position);
            let p2 = Vec3::from(self.vertices[i2].position);
            let face_normal = (p1 - p0).cross(p2 - p0);

            for i in [i0, i1, i2] {
                self.vertices[i].normal = (Vec3::from(self.vertices[i].normal) + face_normal).into();
            }
        }

        for v in &mut self.vertices {
            v.normal = Vec3::from(v.normal).normalize_or_zero().into();
        }
    }

    /// Computes per-vertex tangents from UV gradients.
    ///
    /// Each triangle contributes the direction in which U increases across its
    /// surface to all three corners. The sum is then made orthogonal to the
    /// vertex normal (Gram-Schmidt) and normalized. Triangles with degenerate
    /// UVs contribute nothing; a vertex that received no contribution keeps a
    /// zero tangent.
    pub fn compute_tangents(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let e1 = Vec3::from(v1.position) - Vec3::from(v0.position);
            let e2 = Vec3::from(v2.position) - Vec3::from(v0.position);
            let d1 = Vec2::from(v1.uv) - Vec2::from(v0.uv);
            let d2 = Vec2::from(v2.uv) - Vec2::from(v0.uv);

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let tangent = (e1 * d2.y - e2 * d1.y) / det;

            for i in [i0, i1, i2] {
                accumulated[i] += tangent;
            }
        }

        for (v, t) in self.vertices.iter_mut().zip(accumulated) {
            let n = Vec3::from(v.normal);
            v.tangent = (t - n * n.dot(t)).normalize_or_zero().into();
        }
    }

    /// Unit cube centered at the origin, one quad per face.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex::new([-0.5, -0.5,  0.5], [0.0, 1.0], [ 0.0,  0.0,  1.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [1.0, 1.0], [ 0.0,  0.0,  1.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [1.0, 0.0], [ 0.0,  0.0,  1.0]),
            Vertex::new([-0.5,  0.5,  0.5], [0.0, 0.0], [ 0.0,  0.0,  1.0]),
            // Back face (Z-)
            Vertex::new([ 0.5, -0.5, -0.5], [0.0, 1.0], [ 0.0,  0.0, -1.0]),
            Vertex::new([-0.5, -0.5, -0.5], [1.0, 1.0], [ 0.0,  0.0, -1.0]),
            Vertex::new([-0.5,  0.5, -0.5], [1.0, 0.0], [ 0.0,  0.0, -1.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [0.0, 0.0], [ 0.0,  0.0, -1.0]),
            // Top face (Y+)
            Vertex::new([-0.5,  0.5,  0.5], [0.0, 1.0], [ 0.0,  1.0,  0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [1.0, 1.0], [ 0.0,  1.0,  0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [1.0, 0.0], [ 0.0,  1.0,  0.0]),
            Vertex::new([-0.5,  0.5, -0.5], [0.0, 0.0], [ 0.0,  1.0,  0.0]),
            // Bottom face (Y-)
            Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [ 0.0, -1.0,  0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [1.0, 1.0], [ 0.0, -1.0,  0.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [1.0, 0.0], [ 0.0, -1.0,  0.0]),
            Vertex::new([-0.5, -0.5,  0.5], [0.0, 0.0], [ 0.0, -1.0,  0.0]),
            // Right face (X+)
            Vertex::new([ 0.5, -0.5,  0.5], [0.0, 1.0], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [1.0, 1.0], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [1.0, 0.0], [ 1.0,  0.0,  0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [0.0, 0.0], [ 1.0,  0.0,  0.0]),
            // Left face (X-)
            Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5, -0.5,  0.5], [1.0, 1.0], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5,  0.5,  0.5], [1.0, 0.0], [-1.0,  0.0,  0.0]),
            Vertex::new([-0.5,  0.5, -0.5], [0.0, 0.0], [-1.0,  0.0,  0.0]),
        ];

        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }

    /// Latitude/longitude sphere of radius 0.5.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let uv = [seg as f32 / segments as f32, ring as f32 / rings as f32];
                vertices.push(Vertex::new([x * 0.5, y * 0.5, z * 0.5], uv, [x, y, z]));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, current + 1, next]);
                indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }

    /// `size` x `size` square on the XZ plane, facing +Y.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let normal = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-half, 0.0, -half], [0.0, 1.0], normal),
            Vertex::new([half, 0.0, -half], [1.0, 1.0], normal),
            Vertex::new([half, 0.0, half], [1.0, 0.0], normal),
            Vertex::new([-half, 0.0, half], [0.0, 0.0], normal),
        ];
        let indices = vec![0, 2, 1, 0, 3, 2];

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn face_normal(g: &RawGeometry, tri: &[u32]) -> Vec3 {
        let p = |i: u32| Vec3::from(g.vertices[i as usize].position);
        (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]))
    }

    fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn raw_geometry_bounds() {
        let vertices = vec![
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([1.0, 2.0, 3.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([-1.0, -1.0, -1.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let geom = RawGeometry::new(vertices, vec![0, 1, 2]);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn raw_geometry_recenter_and_normalize() {
        let vertices = vec![
            Vertex::new([2.0, 2.0, 2.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([6.0, 4.0, 4.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut geom = RawGeometry::new(vertices, vec![0, 1, 0]);

        geom.recenter();
        let center = geom.center();
        assert!(center.length() < 0.001);

        geom.normalize_size();
        assert!((geom.size().x - 1.0).abs() < 0.001);
        assert!((geom.size().y - 0.5).abs() < 0.001);
    }

    #[test]
    fn primitives_face_outward() {
        for geometry in [RawGeometry::cube(), RawGeometry::sphere(12, 8), RawGeometry::plane(2.0)] {
            for tri in geometry.indices.chunks_exact(3) {
                let n = face_normal(&geometry, tri);
                if n.length_squared() < 1e-10 {
                    continue; // collapsed triangles at the sphere poles
                }
                let stored = Vec3::from(geometry.vertices[tri[0] as usize].normal);
                assert!(n.dot(stored) > 0.0, "triangle {:?} faces inward", tri);
            }
        }
    }

    #[test]
    fn tangents_follow_u_and_stay_orthogonal() {
        let plane = RawGeometry::plane(2.0);
        for v in &plane.vertices {
            let t = Vec3::from(v.tangent);
            assert!(t.abs_diff_eq(Vec3::X, 1e-5), "tangent {:?}", t);
            assert!(t.dot(Vec3::from(v.normal)).abs() < 1e-5);
        }
    }

    #[test]
    fn degenerate_uvs_leave_zero_tangent() {
        let vertices = vec![
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0], [0.0, 0.0, -1.0]),
            Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0], [0.0, 0.0, -1.0]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0], [0.0, 0.0, -1.0]),
        ];
        let mut geom = RawGeometry::new(vertices, vec![0, 1, 2]);
        geom.compute_tangents();
        assert!(geom.vertices.iter().all(|v| v.tangent == [0.0; 3]));
    }

    #[test]
    fn obj_quad_is_converted_to_left_handed() {
        let obj = b"v 0 0 1\nv 1 0 1\nv 1 1 1\nv 0 1 1\n\
vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
vn 0 0 1\n\
f 1/1/1 2/2/1 3/3/1 4/4/1\n";
        let file = write_temp(".obj", obj);
        let geom = RawGeometry::load(file.path()).unwrap();

        assert_eq!(geom.indices.len(), 6);
        assert_eq!(geom.vertices.len(), 4);
        for v in &geom.vertices {
            assert_eq!(v.position[2], -1.0);
            assert_eq!(v.normal, [0.0, 0.0, -1.0]);
        }
        // Every OBJ uv had u == x and v == y, so the flipped V is 1 - y.
        for v in &geom.vertices {
            assert_eq!(v.uv[0], v.position[0]);
            assert_eq!(v.uv[1], 1.0 - v.position[1]);
        }
        // Winding reversed: geometric normal agrees with the mirrored normal.
        for tri in geom.indices.chunks_exact(3) {
            assert!(face_normal(&geom, tri).z < 0.0);
        }
    }

    #[test]
    fn obj_without_normals_gets_rebuilt_normals() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let file = write_temp(".obj", obj);
        let geom = RawGeometry::load(file.path()).unwrap();
        for v in &geom.vertices {
            assert!(Vec3::from(v.normal).abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = RawGeometry::load("definitely/not/here.obj");
        assert!(matches!(result, Err(RenderError::Geometry { .. })));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let file = write_temp(".fbx", b"");
        assert!(matches!(
            RawGeometry::load(file.path()),
            Err(RenderError::UnknownGeometryFormat(ext)) if ext == "fbx"
        ));
    }

    #[test]
    fn ascii_stl_loads() {
        let stl = b"solid t
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
vertex 0 1 0
endloop
endfacet
endsolid t
";
        let file = write_temp(".stl", stl);
        let geom = RawGeometry::load(file.path()).unwrap();
        assert_eq!(geom.indices.len(), 3);
        assert_eq!(geom.vertices[0].normal, [0.0, 0.0, -1.0]);
        assert!(face_normal(&geom, &geom.indices).z < 0.0);
    }
}
