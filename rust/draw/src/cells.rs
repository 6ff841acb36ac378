// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cell reconstruction from line segments
//!
//! Rebuilds the closed regions ("cells") enclosed by the hidden-line
//! output's segment soup. Endpoints are snapped to a tolerance grid,
//! segments are split at crossings and T-junctions, and the resulting planar
//! arrangement is traced with angular-sorted half-edges. Counter-clockwise
//! faces are bounded cells; the clockwise outline of a connected component
//! that lies inside a cell of another component becomes a hole of that cell.
//!
//! Every cell carries one interior sample point chosen by a widest-interval
//! scanline sweep. A centroid is not good enough here: for C-shaped or
//! holed cells it can land outside or inside a hole.

use crate::dom::{Document, Element};
use ifcplot_model::Point2;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Snapping tolerance in drawing units, absorbing the floating point noise
/// of the hidden-line output
pub const CELL_TOLERANCE: f64 = 1.0e-3;

/// A closed region with optional holes and a guaranteed-interior point
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Outer boundary, counter-clockwise, no repeated closing point
    pub boundary: Vec<Point2<f64>>,
    /// Inner boundaries (islands of other components)
    pub holes: Vec<Vec<Point2<f64>>>,
    /// Strictly inside the boundary, strictly outside every hole
    pub point_inside: Point2<f64>,
}

/// Extract the 2D segments of every group with the given class, in document
/// order, one set per group
pub fn svg_to_line_segments(doc: &Document, class: &str) -> Vec<Vec<[Point2<f64>; 2]>> {
    doc.root
        .groups_with_class(class)
        .into_iter()
        .map(|group| {
            let mut segments = Vec::new();
            for path in group.descendants() {
                if path.tag == "path" {
                    if let Some(d) = path.attr("d") {
                        path_to_segments(d, &mut segments);
                    }
                }
            }
            segments
        })
        .collect()
}

/// Parse the `M`/`L`/`Z` subset of SVG path data into segments
fn path_to_segments(d: &str, segments: &mut Vec<[Point2<f64>; 2]>) {
    let mut numbers: Vec<f64> = Vec::new();
    let mut commands: Vec<(char, usize)> = Vec::new();
    let mut number = String::new();
    for c in d.chars() {
        if c.is_ascii_digit() || c == '.' || c == '-' || c == 'e' || c == 'E' || c == '+' {
            number.push(c);
        } else {
            if !number.is_empty() {
                if let Ok(v) = number.parse() {
                    numbers.push(v);
                }
                number.clear();
            }
            if c.is_ascii_alphabetic() {
                commands.push((c, numbers.len()));
            }
        }
    }
    if !number.is_empty() {
        if let Ok(v) = number.parse() {
            numbers.push(v);
        }
    }

    let mut cursor: Option<Point2<f64>> = None;
    let mut subpath_start: Option<Point2<f64>> = None;
    for (i, &(cmd, at)) in commands.iter().enumerate() {
        let end = commands.get(i + 1).map(|&(_, e)| e).unwrap_or(numbers.len());
        match cmd {
            'M' | 'L' => {
                let mut k = at;
                while k + 1 < end {
                    let p = Point2::new(numbers[k], numbers[k + 1]);
                    if cmd == 'M' && k == at {
                        subpath_start = Some(p);
                        cursor = Some(p);
                    } else if let Some(prev) = cursor {
                        segments.push([prev, p]);
                        cursor = Some(p);
                    }
                    k += 2;
                }
            }
            'Z' | 'z' => {
                if let (Some(prev), Some(start)) = (cursor, subpath_start) {
                    segments.push([prev, start]);
                    cursor = Some(start);
                }
            }
            _ => {} // curves are not produced by the serializer
        }
    }
}

/// Reconstruct cells from a segment set.
///
/// Deterministic and idempotent: the same segment set, in any order, yields
/// the same cells with the same sample points.
pub fn line_segments_to_cells(segments: &[[Point2<f64>; 2]], tol: f64) -> Vec<Cell> {
    let arrangement = Arrangement::build(segments, tol);
    let mut cells = arrangement.trace_cells();
    for cell in &mut cells {
        canonicalize_ring(&mut cell.boundary);
        for hole in &mut cell.holes {
            canonicalize_ring(hole);
        }
        cell.holes.sort_by(|a, b| cmp_points(&a[0], &b[0]));
    }
    cells.sort_by(|a, b| cmp_points(&a.boundary[0], &b.boundary[0]));
    cells
}

/// Re-serialize reconstructed cells, one group per input set and one path
/// per cell, each carrying its `ifc:pointInside`
pub fn cells_to_svg(cell_groups: &[Vec<Cell>]) -> Document {
    let mut root = Element::new("svg")
        .with_attr("xmlns", "http://www.w3.org/2000/svg")
        .with_attr("xmlns:ifc", "http://www.ifcopenshell.org/ns");
    for cells in cell_groups {
        let mut group = Element::new("g");
        for cell in cells {
            let mut d = ring_to_path(&cell.boundary);
            for hole in &cell.holes {
                d.push(' ');
                d.push_str(&ring_to_path(hole));
            }
            group.push(
                Element::new("path")
                    .with_attr("d", d)
                    .with_attr(
                        "ifc:pointInside",
                        format!("{},{}", cell.point_inside.x, cell.point_inside.y),
                    ),
            );
        }
        root.push(group);
    }
    Document::new(root)
}

fn ring_to_path(ring: &[Point2<f64>]) -> String {
    let mut d = String::new();
    for (i, p) in ring.iter().enumerate() {
        d.push_str(if i == 0 { "M" } else { " L" });
        d.push_str(&format!("{},{}", p.x, p.y));
    }
    d.push_str(" Z");
    d
}

fn cmp_points(a: &Point2<f64>, b: &Point2<f64>) -> std::cmp::Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

/// Rotate a ring so it starts at its lexicographically smallest vertex
fn canonicalize_ring(ring: &mut Vec<Point2<f64>>) {
    if ring.is_empty() {
        return;
    }
    let start = ring
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| cmp_points(a, b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    ring.rotate_left(start);
}

type VertexId = usize;

struct Arrangement {
    points: Vec<Point2<f64>>,
    /// Unique undirected edges as (low, high) vertex pairs
    edges: Vec<(VertexId, VertexId)>,
    tol: f64,
}

impl Arrangement {
    fn build(segments: &[[Point2<f64>; 2]], tol: f64) -> Self {
        // Snap endpoints to the tolerance grid
        let snap = |p: &Point2<f64>| {
            (
                (p.x / tol).round() as i64,
                (p.y / tol).round() as i64,
            )
        };
        let unsnap = |k: (i64, i64)| Point2::new(k.0 as f64 * tol, k.1 as f64 * tol);

        let mut raw: Vec<(Point2<f64>, Point2<f64>)> = segments
            .iter()
            .filter_map(|s| {
                let (a, b) = (unsnap(snap(&s[0])), unsnap(snap(&s[1])));
                ((a - b).norm() > tol / 2.0).then_some((a, b))
            })
            .collect();

        // Split at pairwise crossings and T-junctions. Quadratic, but the
        // segment sets per drawing are small.
        let mut cuts: Vec<Vec<f64>> = vec![Vec::new(); raw.len()];
        for i in 0..raw.len() {
            for j in (i + 1)..raw.len() {
                let (a, b) = raw[i];
                let (c, d) = raw[j];
                if let Some((t, u)) = segment_intersection(&a, &b, &c, &d, tol) {
                    if t > 0.0 && t < 1.0 {
                        cuts[i].push(t);
                    }
                    if u > 0.0 && u < 1.0 {
                        cuts[j].push(u);
                    }
                }
            }
        }

        let mut points: Vec<Point2<f64>> = Vec::new();
        let mut by_key: FxHashMap<(i64, i64), VertexId> = FxHashMap::default();
        let vertex = |p: Point2<f64>,
                          points: &mut Vec<Point2<f64>>,
                          by_key: &mut FxHashMap<(i64, i64), VertexId>| {
            let k = snap(&p);
            *by_key.entry(k).or_insert_with(|| {
                points.push(unsnap(k));
                points.len() - 1
            })
        };

        let mut edge_set: FxHashMap<(VertexId, VertexId), ()> = FxHashMap::default();
        let mut edges = Vec::new();
        for (i, (a, b)) in raw.drain(..).enumerate() {
            let mut params = std::mem::take(&mut cuts[i]);
            params.push(0.0);
            params.push(1.0);
            params.sort_by(|x, y| x.total_cmp(y));
            params.dedup_by(|x, y| (*x - *y).abs() < 1e-12);
            for w in params.windows(2) {
                let p = Point2::new(a.x + (b.x - a.x) * w[0], a.y + (b.y - a.y) * w[0]);
                let q = Point2::new(a.x + (b.x - a.x) * w[1], a.y + (b.y - a.y) * w[1]);
                let (u, v) = (
                    vertex(p, &mut points, &mut by_key),
                    vertex(q, &mut points, &mut by_key),
                );
                if u == v {
                    continue;
                }
                let key = (u.min(v), u.max(v));
                if edge_set.insert(key, ()).is_none() {
                    edges.push(key);
                }
            }
        }
        edges.sort_unstable();

        Self { points, edges, tol }
    }

    /// Angular-sorted neighbor lists per vertex
    fn adjacency(&self) -> Vec<SmallVec<[VertexId; 4]>> {
        let mut adjacency: Vec<SmallVec<[VertexId; 4]>> = vec![SmallVec::new(); self.points.len()];
        for &(u, v) in &self.edges {
            adjacency[u].push(v);
            adjacency[v].push(u);
        }
        for (v, neighbors) in adjacency.iter_mut().enumerate() {
            let origin = self.points[v];
            neighbors.sort_by(|&a, &b| {
                let pa = self.points[a] - origin;
                let pb = self.points[b] - origin;
                pa.y.atan2(pa.x).total_cmp(&pb.y.atan2(pb.x))
            });
        }
        adjacency
    }

    /// Trace all faces and assemble bounded ones into cells
    fn trace_cells(&self) -> Vec<Cell> {
        let adjacency = self.adjacency();
        let component = self.components(&adjacency);

        // Directed half-edges; "next after arriving at v from u" is the
        // neighbor one step clockwise of u around v, which keeps the face
        // interior on the left
        let mut visited: FxHashMap<(VertexId, VertexId), ()> = FxHashMap::default();
        let mut outers: Vec<(Vec<Point2<f64>>, usize, f64)> = Vec::new(); // CCW faces
        let mut inners: Vec<(Vec<Point2<f64>>, usize)> = Vec::new(); // CW outlines

        for &(e0, e1) in &self.edges {
            for (mut u, mut v) in [(e0, e1), (e1, e0)] {
                if visited.contains_key(&(u, v)) {
                    continue;
                }
                let mut ring = Vec::new();
                let start = (u, v);
                loop {
                    visited.insert((u, v), ());
                    ring.push(self.points[v]);
                    let neighbors = &adjacency[v];
                    let back = neighbors
                        .iter()
                        .position(|&w| w == u)
                        .expect("reverse edge in adjacency");
                    let w = neighbors[(back + neighbors.len() - 1) % neighbors.len()];
                    u = v;
                    v = w;
                    if (u, v) == start {
                        break;
                    }
                }
                if ring.len() < 3 {
                    continue; // stub edge walked back and forth
                }
                let area = signed_area(&ring);
                if area > self.tol * self.tol {
                    outers.push((ring, component[u], area));
                } else if area < -self.tol * self.tol {
                    inners.push((ring, component[u]));
                }
            }
        }

        // An island's clockwise outline punches a hole into the smallest
        // containing cell of a different component
        let mut holes: Vec<Vec<Vec<Point2<f64>>>> = vec![Vec::new(); outers.len()];
        for (ring, comp) in inners {
            let probe = ring[0];
            let mut best: Option<(usize, f64)> = None;
            for (i, (outer, outer_comp, area)) in outers.iter().enumerate() {
                if *outer_comp == comp {
                    continue;
                }
                if point_in_ring(&probe, outer) {
                    match best {
                        Some((_, best_area)) if best_area <= *area => {}
                        _ => best = Some((i, *area)),
                    }
                }
            }
            if let Some((i, _)) = best {
                holes[i].push(ring);
            }
        }

        let mut cells = Vec::new();
        for ((boundary, _, _), cell_holes) in outers.into_iter().zip(holes) {
            if let Some(point_inside) = interior_point(&boundary, &cell_holes, self.tol) {
                cells.push(Cell {
                    boundary,
                    holes: cell_holes,
                    point_inside,
                });
            } else {
                tracing::warn!("dropping cell without a robust interior point");
            }
        }
        cells
    }

    /// Connected component id per vertex
    fn components(&self, adjacency: &[SmallVec<[VertexId; 4]>]) -> Vec<usize> {
        let mut component = vec![usize::MAX; self.points.len()];
        let mut next = 0;
        for start in 0..self.points.len() {
            if component[start] != usize::MAX {
                continue;
            }
            let mut stack = vec![start];
            component[start] = next;
            while let Some(v) = stack.pop() {
                for &w in &adjacency[v] {
                    if component[w] == usize::MAX {
                        component[w] = next;
                        stack.push(w);
                    }
                }
            }
            next += 1;
        }
        component
    }
}

/// Intersection parameters of two segments, if they touch within tolerance
fn segment_intersection(
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
    d: &Point2<f64>,
    tol: f64,
) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denominator = r.x * s.y - r.y * s.x;
    let ca = c - a;
    if denominator.abs() > 1e-12 {
        let t = (ca.x * s.y - ca.y * s.x) / denominator;
        let u = (ca.x * r.y - ca.y * r.x) / denominator;
        let margin_t = tol / r.norm().max(tol);
        let margin_u = tol / s.norm().max(tol);
        if t >= -margin_t && t <= 1.0 + margin_t && u >= -margin_u && u <= 1.0 + margin_u {
            return Some((t.clamp(0.0, 1.0), u.clamp(0.0, 1.0)));
        }
        return None;
    }
    // Collinear overlaps are resolved by endpoint projection: snap either
    // endpoint of one segment onto the other
    let len2 = r.norm_squared();
    if len2 < 1e-24 {
        return None;
    }
    let cross = ca.x * r.y - ca.y * r.x;
    if cross.abs() > tol * r.norm() {
        return None; // parallel but offset
    }
    let t_c = (c - a).dot(&r) / len2;
    let t_d = (d - a).dot(&r) / len2;
    let pick = [t_c, t_d]
        .into_iter()
        .find(|t| *t > 0.0 && *t < 1.0)?;
    let back = (a + r * pick - c).dot(&s) / s.norm_squared().max(1e-24);
    Some((pick, back.clamp(0.0, 1.0)))
}

fn signed_area(ring: &[Point2<f64>]) -> f64 {
    let mut doubled = 0.0;
    for i in 0..ring.len() {
        let p = ring[i];
        let q = ring[(i + 1) % ring.len()];
        doubled += p.x * q.y - q.x * p.y;
    }
    doubled / 2.0
}

/// Even-odd point-in-polygon test
pub fn point_in_ring(p: &Point2<f64>, ring: &[Point2<f64>]) -> bool {
    let mut inside = false;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x > p.x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Pick a point strictly inside `outer` and outside all `holes`.
///
/// Sweeps horizontal scanlines placed between distinct vertex heights and
/// takes the midpoint of the widest inside interval, rejecting candidates
/// within `tol` of any boundary.
fn interior_point(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
    tol: f64,
) -> Option<Point2<f64>> {
    let mut ys: Vec<f64> = outer.iter().map(|p| p.y).collect();
    for hole in holes {
        ys.extend(hole.iter().map(|p| p.y));
    }
    ys.sort_by(|a, b| a.total_cmp(b));
    ys.dedup_by(|a, b| (*a - *b).abs() < tol);

    let rings: Vec<&[Point2<f64>]> = std::iter::once(outer)
        .map(|r| r as &[_])
        .chain(holes.iter().map(|h| h.as_slice()))
        .collect();

    let mut best: Option<(f64, Point2<f64>)> = None;
    for w in ys.windows(2) {
        let y = (w[0] + w[1]) / 2.0;
        let mut xs: Vec<f64> = Vec::new();
        for ring in &rings {
            for i in 0..ring.len() {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                if (a.y > y) != (b.y > y) {
                    xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        xs.sort_by(|a, b| a.total_cmp(b));
        for pair in xs.chunks_exact(2) {
            let width = pair[1] - pair[0];
            if width <= 4.0 * tol {
                continue;
            }
            let candidate = Point2::new((pair[0] + pair[1]) / 2.0, y);
            // Inside the outer ring, outside every hole, clear of edges
            if !point_in_ring(&candidate, outer) {
                continue;
            }
            if holes.iter().any(|h| point_in_ring(&candidate, h)) {
                continue;
            }
            if rings
                .iter()
                .any(|ring| distance_to_ring(&candidate, ring) <= tol)
            {
                continue;
            }
            if best.map_or(true, |(best_width, _)| width > best_width) {
                best = Some((width, candidate));
            }
        }
    }
    best.map(|(_, p)| p)
}

fn distance_to_ring(p: &Point2<f64>, ring: &[Point2<f64>]) -> f64 {
    let mut min = f64::INFINITY;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        let ab = b - a;
        let len2 = ab.norm_squared();
        let t = if len2 > 1e-24 {
            ((p - a).dot(&ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = a + ab * t;
        min = min.min((p - closest).norm());
    }
    min
}
