// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial index over element faces
//!
//! Elements are exploded into individual triangles, each retaining its
//! resolved style, and packed into a median-split AABB tree. The builder and
//! the built tree are distinct types: queries are only possible after
//! [`ElementTreeBuilder::build`], and the tree is immutable afterwards.

use crate::adapter::ResolvedElement;
use ifcplot_model::{Point3, Style, Vector3};

/// One ray/face intersection, nearest first in query results
#[derive(Debug, Clone, PartialEq)]
pub struct RayHit {
    /// Index of the element in insertion order
    pub element: usize,
    /// Index into [`ElementTree::styles`]
    pub style: usize,
    /// Distance from the ray origin in metres
    pub distance: f64,
    /// Dot product of the unit ray direction and the unit face normal
    pub dot_product: f64,
}

/// Identity of an indexed element, for classification of query results
#[derive(Debug, Clone)]
pub struct ElementRef {
    pub guid: String,
    pub ifc_type: String,
}

#[derive(Debug, Clone)]
struct Face {
    element: usize,
    style: usize,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
}

impl Face {
    fn centroid(&self) -> Point3<f64> {
        Point3::new(
            (self.v0.x + self.v1.x + self.v2.x) / 3.0,
            (self.v0.y + self.v1.y + self.v2.y) / 3.0,
            (self.v0.z + self.v1.z + self.v2.z) / 3.0,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn extend_point(&mut self, p: &Point3<f64>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    fn extend_face(&mut self, face: &Face) {
        self.extend_point(&face.v0);
        self.extend_point(&face.v1);
        self.extend_point(&face.v2);
    }

    fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        let mut axis = 0;
        if extent.y > extent.x {
            axis = 1;
        }
        if extent.z > extent[axis] {
            axis = 2;
        }
        axis
    }

    /// Slab test; `true` when the ray touches the box at any t >= 0
    fn hit_by(&self, origin: &Point3<f64>, inv_dir: &Vector3<f64>) -> bool {
        let mut t_near = 0.0_f64;
        let mut t_far = f64::INFINITY;
        for i in 0..3 {
            let t1 = (self.min[i] - origin[i]) * inv_dir[i];
            let t2 = (self.max[i] - origin[i]) * inv_dir[i];
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            if lo.is_nan() || hi.is_nan() {
                // Ray parallel to the slab; inside iff origin between planes
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return false;
                }
                continue;
            }
            t_near = t_near.max(lo);
            t_far = t_far.min(hi);
            if t_near > t_far {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Internal { left: usize, right: usize },
}

#[derive(Debug)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

const LEAF_SIZE: usize = 4;

/// Batch builder; call [`build`](Self::build) once all elements are added
#[derive(Default)]
pub struct ElementTreeBuilder {
    faces: Vec<Face>,
    elements: Vec<ElementRef>,
    styles: Vec<Style>,
}

impl ElementTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explode an element into per-face entries retaining face styles
    pub fn add_element(&mut self, element: &ResolvedElement) {
        let element_index = self.elements.len();
        self.elements.push(ElementRef {
            guid: element.guid.clone(),
            ifc_type: element.ifc_type.clone(),
        });
        let style_offset = self.styles.len();
        self.styles.extend(element.styles.iter().cloned());

        for (face, &local_style) in element.faces.iter().zip(&element.face_styles) {
            self.faces.push(Face {
                element: element_index,
                style: style_offset + local_style as usize,
                v0: element.point(face[0]),
                v1: element.point(face[1]),
                v2: element.point(face[2]),
            });
        }
    }

    /// Number of elements added so far
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Finalize into an immutable, queryable tree
    pub fn build(self) -> ElementTree {
        let mut tree = ElementTree {
            faces: self.faces,
            elements: self.elements,
            styles: self.styles,
            nodes: Vec::new(),
        };
        if !tree.faces.is_empty() {
            let count = tree.faces.len();
            tree.split(0, count);
        }
        tree
    }
}

/// Immutable spatial index answering ordered ray queries
pub struct ElementTree {
    faces: Vec<Face>,
    elements: Vec<ElementRef>,
    styles: Vec<Style>,
    nodes: Vec<Node>,
}

impl ElementTree {
    /// Partition `faces[start..start + count]`, returning the node index
    fn split(&mut self, start: usize, count: usize) -> usize {
        let mut bounds = Aabb::empty();
        for face in &self.faces[start..start + count] {
            bounds.extend_face(face);
        }

        let node_index = self.nodes.len();
        self.nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf { start, count },
        });

        if count > LEAF_SIZE {
            let axis = bounds.longest_axis();
            self.faces[start..start + count]
                .sort_by(|a, b| a.centroid()[axis].total_cmp(&b.centroid()[axis]));
            let half = count / 2;
            let left = self.split(start, half);
            let right = self.split(start + half, count - half);
            self.nodes[node_index].kind = NodeKind::Internal { left, right };
        }
        node_index
    }

    /// Identity of an indexed element
    pub fn element(&self, index: usize) -> &ElementRef {
        &self.elements[index]
    }

    /// Flattened style table addressed by [`RayHit::style`]
    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// All faces intersected by the ray, ordered nearest first.
    ///
    /// The direction need not be normalized; distances are metric. Hits at
    /// or behind the origin are not reported.
    pub fn select_ray(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Vec<RayHit> {
        let norm = direction.norm();
        if self.nodes.is_empty() || norm < 1e-12 {
            return Vec::new();
        }
        let dir = direction / norm;
        let inv_dir = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);

        let mut hits = Vec::new();
        let mut stack = vec![0_usize];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            if !node.bounds.hit_by(origin, &inv_dir) {
                continue;
            }
            match node.kind {
                NodeKind::Internal { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
                NodeKind::Leaf { start, count } => {
                    for face in &self.faces[start..start + count] {
                        if let Some((distance, dot)) = intersect_triangle(origin, &dir, face) {
                            hits.push(RayHit {
                                element: face.element,
                                style: face.style,
                                distance,
                                dot_product: dot,
                            });
                        }
                    }
                }
            }
        }

        // Nearest first; ties broken on element and style for determinism
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.element.cmp(&b.element))
                .then(a.style.cmp(&b.style))
        });
        // A ray through an edge or vertex shared by adjacent faces of one
        // element intersects each face at the same point; report it once
        hits.dedup_by(|a, b| {
            a.element == b.element && (a.distance - b.distance).abs() < 1e-9
        });
        hits
    }
}

/// Moller-Trumbore, returning (distance, ray.normal dot product)
fn intersect_triangle(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    face: &Face,
) -> Option<(f64, f64)> {
    const EPS: f64 = 1e-12;
    let edge1 = face.v1 - face.v0;
    let edge2 = face.v2 - face.v0;
    let p = dir.cross(&edge2);
    let det = edge1.dot(&p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - face.v0;
    let u = s.dot(&p) * inv_det;
    if !(-EPS..=1.0 + EPS).contains(&u) {
        return None;
    }
    let q = s.cross(&edge1);
    let v = dir.dot(&q) * inv_det;
    if v < -EPS || u + v > 1.0 + EPS {
        return None;
    }
    let t = edge2.dot(&q) * inv_det;
    if t <= 1e-9 {
        return None;
    }
    let normal = edge1.cross(&edge2);
    let n_norm = normal.norm();
    if n_norm < EPS {
        return None;
    }
    Some((t, dir.dot(&normal) / n_norm))
}
