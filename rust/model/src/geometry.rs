// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh and placement types for tessellated products

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

/// Triangle mesh in product-local coordinates.
///
/// `face_styles` carries one index per triangle into the owning product's
/// style table, preserving per-face appearance through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriMesh {
    /// Vertex positions (x, y, z)
    pub vertices: Vec<[f64; 3]>,
    /// Triangle vertex indices (i0, i1, i2)
    pub faces: Vec<[u32; 3]>,
    /// Per-triangle style index into the product's style table
    pub face_styles: Vec<u32>,
}

impl TriMesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Number of triangles
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Validate internal consistency: index ranges and style table bounds.
    ///
    /// # Arguments
    /// * `style_count` - Size of the owning product's style table
    pub fn validate(&self, style_count: usize) -> Result<(), String> {
        if self.face_styles.len() != self.faces.len() {
            return Err(format!(
                "face_styles length {} does not match face count {}",
                self.face_styles.len(),
                self.faces.len()
            ));
        }
        let vertex_count = self.vertices.len() as u32;
        for face in &self.faces {
            if face.iter().any(|&i| i >= vertex_count) {
                return Err(format!("face index out of range (vertices: {vertex_count})"));
            }
        }
        for &s in &self.face_styles {
            if s as usize >= style_count {
                return Err(format!("style index {s} out of range (styles: {style_count})"));
            }
        }
        for v in &self.vertices {
            if v.iter().any(|c| !c.is_finite()) {
                return Err("non-finite vertex coordinate".to_string());
            }
        }
        Ok(())
    }
}

/// Rigid placement as a row-major 4x4 homogeneous matrix
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Placement(pub [[f64; 4]; 4]);

impl Placement {
    /// Identity placement
    pub fn identity() -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(rows)
    }

    /// Pure translation
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut p = Self::identity();
        p.0[0][3] = x;
        p.0[1][3] = y;
        p.0[2][3] = z;
        p
    }

    /// Convert to an nalgebra matrix
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let r = &self.0;
        Matrix4::new(
            r[0][0], r[0][1], r[0][2], r[0][3], //
            r[1][0], r[1][1], r[1][2], r[1][3], //
            r[2][0], r[2][1], r[2][2], r[2][3], //
            r[3][0], r[3][1], r[3][2], r[3][3],
        )
    }

    /// Apply the placement to a local-space point
    pub fn transform_point(&self, p: [f64; 3]) -> Point3<f64> {
        self.to_matrix()
            .transform_point(&Point3::new(p[0], p[1], p[2]))
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}
