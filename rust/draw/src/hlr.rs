// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hidden-line serializer
//!
//! Consumes the resolved element stream and emits one vector document with a
//! group per drawing plane:
//!
//! - `section` paths: closed curves where cut elements intersect the plane
//! - a `projection` group: hidden-line-removed outlines of the geometry
//!   beyond the plane
//! - optional annotations (space names/areas, door arcs, storey heights)
//!
//! Candidate edges are mesh boundary, sharp-dihedral and silhouette edges.
//! Visibility is resolved exactly per edge: both the projected footprint and
//! the view depth are linear along an edge, so the occlusion caused by one
//! triangle is a linear-inequality interval in the edge parameter. The
//! visible sub-segments are what remains of `[0, 1]` after subtracting all
//! occluded intervals.
//!
//! Each drawing group carries `ifc:name`, `ifc:plane` and `ifc:matrix3`
//! attributes from which the merger reconstructs the projection exactly.

use crate::adapter::ResolvedElement;
use crate::dom::{Document, Element};
use crate::error::Result;
use crate::plane::{
    elevations_from_bounds, floorplans_from_storeys, sections_from_bounds, Bounds, DrawingKind,
    DrawingPlane,
};
use crate::settings::{DrawSettings, StoreyHeights};
use ifcplot_model::{Point2, Point3, Vector3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Depth bias: a triangle must be strictly nearer than an edge by this much
/// (metres) to occlude it, so faces never occlude their own edges
const DEPTH_EPS: f64 = 1e-6;

/// Dihedral threshold for profile edges: cos(30 degrees)
const SHARP_DOT: f64 = 0.866;

const STYLESHEET: &str = "\
    path { fill: none; stroke: #000000; stroke-width: 0.35; } \
    .section path { stroke-width: 0.5; } \
    .annotation path { stroke-width: 0.18; } \
    text { font-size: 3.5px; font-family: sans-serif; fill: #222222; }";

/// A plane requested before the content bounds are known; fitted at finalize
#[derive(Debug, Clone)]
pub struct PlaneSpec {
    pub name: String,
    pub kind: DrawingKind,
    pub origin: Point3<f64>,
    pub view_dir: Vector3<f64>,
    pub x_axis: Vector3<f64>,
}

/// Streaming hidden-line serializer; call [`write`](Self::write) per element
/// and [`finalize`](Self::finalize) once
pub struct SvgSerializer {
    settings: DrawSettings,
    manual: Vec<PlaneSpec>,
    storeys: Vec<(String, f64)>,
    elements: Vec<ResolvedElement>,
    skipped: usize,
}

impl SvgSerializer {
    /// Create a serializer; the settings are validated eagerly
    pub fn new(settings: DrawSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            manual: Vec::new(),
            storeys: Vec::new(),
            elements: Vec::new(),
            skipped: 0,
        })
    }

    /// Storey names and elevations (metres), used for `auto_floorplan`
    /// plane derivation and storey height annotations
    pub fn set_storeys(&mut self, storeys: Vec<(String, f64)>) {
        self.storeys = storeys;
    }

    /// Add an explicit drawing plane; its paper fit happens at finalize
    pub fn add_drawing(&mut self, spec: PlaneSpec) {
        self.manual.push(spec);
    }

    /// Record one element for serialization
    pub fn write(&mut self, element: &ResolvedElement) {
        self.elements.push(element.clone());
    }

    /// Elements dropped during projection because of degenerate geometry
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// The drawing planes this serializer will render, given the content
    /// accumulated so far
    pub fn planes(&self) -> Vec<DrawingPlane> {
        let bounds = self.content_bounds();
        let mut planes: Vec<DrawingPlane> = self
            .manual
            .iter()
            .map(|s| {
                DrawingPlane::new(
                    s.name.clone(),
                    s.kind,
                    s.origin,
                    s.view_dir,
                    s.x_axis,
                    &self.settings,
                    &bounds,
                )
            })
            .collect();
        if self.settings.auto_floorplan {
            planes.extend(floorplans_from_storeys(&self.storeys, &self.settings, &bounds));
        }
        if self.settings.auto_elevation {
            planes.extend(elevations_from_bounds(&self.settings, &bounds));
        }
        if self.settings.auto_section {
            planes.extend(sections_from_bounds(&self.settings, &bounds));
        }
        planes
    }

    /// Render all drawings and produce the serializer document
    pub fn finalize(&mut self) -> Result<Document> {
        let planes = self.planes();

        let mut root = Element::new("svg")
            .with_attr("xmlns", "http://www.w3.org/2000/svg")
            .with_attr("xmlns:ifc", "http://www.ifcopenshell.org/ns")
            .with_attr("width", format!("{}mm", self.settings.width))
            .with_attr("height", format!("{}mm", self.settings.height))
            .with_attr(
                "viewBox",
                format!("0 0 {} {}", self.settings.width, self.settings.height),
            );
        if self.settings.css {
            let mut style = Element::new("style").with_attr("type", "text/css");
            style.push_text(STYLESHEET);
            root.push(style);
        }

        for plane in &planes {
            tracing::debug!(drawing = %plane.name, "rendering drawing plane");
            let group = self.render_plane(plane);
            root.push(group);
        }
        Ok(Document::new(root))
    }

    fn content_bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        for element in &self.elements {
            for v in &element.vertices {
                bounds.extend(&Point3::new(v[0], v[1], v[2]));
            }
        }
        bounds
    }

    fn render_plane(&mut self, plane: &DrawingPlane) -> Element {
        let mut drawing = Element::new("g")
            .with_attr("class", "drawing")
            .with_attr("ifc:name", plane.name.clone())
            .with_attr("ifc:plane", plane.plane_attr())
            .with_attr("ifc:matrix3", plane.matrix3_attr());

        let occluders = self.collect_occluders(plane);

        let mut projection = Element::new("g").with_attr("class", "projection");
        for index in 0..self.elements.len() {
            let element = &self.elements[index];
            match project_element(element, plane, &occluders, &self.settings) {
                Some(Some(path)) => projection.push(path),
                Some(None) => {} // nothing visible on this drawing
                None => {
                    self.skipped += 1;
                    tracing::warn!(
                        guid = %element.guid,
                        drawing = %plane.name,
                        "element failed to project, skipping"
                    );
                }
            }
        }
        drawing.push(projection);

        if plane.kind.cuts() {
            let mut section = Element::new("g").with_attr("class", "section");
            for element in &self.elements {
                if let Some(path) = section_paths(element, plane) {
                    section.push(path);
                }
            }
            drawing.push(section);
        }

        if let Some(annotations) = self.render_annotations(plane) {
            drawing.push(annotations);
        }
        drawing
    }

    /// Clipped view-space triangles that can hide edges on this plane.
    /// Spaces never occlude; they are drawn but not treated as solids.
    fn collect_occluders(&self, plane: &DrawingPlane) -> Vec<ViewTri> {
        let mut occluders = Vec::new();
        for element in &self.elements {
            if element.is_space() {
                continue;
            }
            for face in 0..element.faces.len() {
                let tri = element.triangle(face).map(|p| plane.world_to_view(&p));
                if plane.kind.cuts() {
                    for clipped in clip_triangle_behind(&tri) {
                        push_occluder(&mut occluders, clipped);
                    }
                } else {
                    push_occluder(&mut occluders, tri);
                }
            }
        }
        occluders
    }

    fn render_annotations(&self, plane: &DrawingPlane) -> Option<Element> {
        let mut annotation = Element::new("g").with_attr("class", "annotation");
        let settings = &self.settings;

        if plane.kind == DrawingKind::Floorplan {
            if settings.space_names || settings.space_areas {
                for element in self.elements.iter().filter(|e| e.is_space()) {
                    annotate_space(&mut annotation, element, plane, settings);
                }
            }
            if settings.door_arcs {
                for element in self
                    .elements
                    .iter()
                    .filter(|e| e.ifc_type.eq_ignore_ascii_case("IfcDoor"))
                {
                    annotate_door_arc(&mut annotation, element, plane);
                }
            }
        }

        if plane.kind != DrawingKind::Floorplan {
            // Validated in new(); default to none on the unreachable branch
            let mode = settings.storey_heights().unwrap_or(StoreyHeights::None);
            if mode != StoreyHeights::None {
                for (name, elevation) in &self.storeys {
                    annotate_storey_height(&mut annotation, name, *elevation, plane, settings, mode);
                }
            }
        }

        if annotation.children.is_empty() {
            None
        } else {
            Some(annotation)
        }
    }
}

/// A view-space occluder triangle with its cached 2D orientation
struct ViewTri {
    p: [Point3<f64>; 3],
    /// Twice the signed area of the 2D footprint
    area2: f64,
}

fn push_occluder(occluders: &mut Vec<ViewTri>, p: [Point3<f64>; 3]) {
    let area2 = cross2(
        Point2::new(p[1].x - p[0].x, p[1].y - p[0].y),
        Point2::new(p[2].x - p[0].x, p[2].y - p[0].y),
    );
    // Edge-on triangles have no footprint and cannot hide anything
    if area2.abs() > 1e-12 {
        occluders.push(ViewTri { p, area2 });
    }
}

fn cross2(a: Point2<f64>, b: Point2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Project one element onto a plane with hidden-line removal.
///
/// `None` means the element failed to project (non-finite geometry);
/// `Some(None)` means it projected cleanly but left nothing visible.
fn project_element(
    element: &ResolvedElement,
    plane: &DrawingPlane,
    occluders: &[ViewTri],
    settings: &DrawSettings,
) -> Option<Option<Element>> {
    let view: Vec<Point3<f64>> = element
        .vertices
        .iter()
        .map(|v| plane.world_to_view(&Point3::new(v[0], v[1], v[2])))
        .collect();
    if view
        .iter()
        .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
    {
        return None;
    }

    let mut d = String::new();
    let threshold = settings.profile_threshold;
    for (a, b) in candidate_edges(element, plane) {
        let (mut a, mut b) = (view[a as usize], view[b as usize]);
        if plane.kind.cuts() {
            match clip_segment_behind(a, b) {
                Some((ca, cb)) => (a, b) = (ca, cb),
                None => continue,
            }
        }
        for (t0, t1) in visible_intervals(&a, &b, occluders) {
            let p0 = lerp3(&a, &b, t0);
            let p1 = lerp3(&a, &b, t1);
            let s0 = plane.paper(&p0);
            let s1 = plane.paper(&p1);
            let length = (s1 - s0).norm();
            if length < 1e-9 || (threshold >= 0.0 && length < threshold) {
                continue;
            }
            d.push_str(&format!(
                "M{},{} L{},{} ",
                fmt(s0.x),
                fmt(s0.y),
                fmt(s1.x),
                fmt(s1.y)
            ));
        }
    }

    if d.is_empty() {
        return Some(None);
    }
    Some(Some(
        Element::new("path")
            .with_attr("class", element.ifc_type.clone())
            .with_attr("ifc:guid", element.guid.clone())
            .with_attr("d", d.trim_end().to_string()),
    ))
}

/// Boundary, sharp-dihedral and silhouette edges, deduplicated
fn candidate_edges(element: &ResolvedElement, plane: &DrawingPlane) -> Vec<(u32, u32)> {
    let view_dir = plane.view_dir();
    let normals: Vec<Vector3<f64>> = (0..element.faces.len())
        .map(|f| {
            let [p0, p1, p2] = element.triangle(f);
            (p1 - p0).cross(&(p2 - p0))
        })
        .collect();

    let mut edge_faces: FxHashMap<(u32, u32), SmallVec<[usize; 2]>> = FxHashMap::default();
    for (f, face) in element.faces.iter().enumerate() {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            let key = if a < b { (a, b) } else { (b, a) };
            edge_faces.entry(key).or_default().push(f);
        }
    }

    let mut edges: Vec<(u32, u32)> = edge_faces
        .into_iter()
        .filter(|(_, faces)| match faces.as_slice() {
            [_] => true, // boundary
            [f0, f1] => {
                let (n0, n1) = (normals[*f0], normals[*f1]);
                let (l0, l1) = (n0.norm(), n1.norm());
                if l0 < 1e-12 || l1 < 1e-12 {
                    return false;
                }
                let dot = n0.dot(&n1) / (l0 * l1);
                if dot < SHARP_DOT {
                    return true; // profile edge
                }
                // Silhouette: faces on opposite sides of the view
                (n0.dot(&view_dir) < 0.0) != (n1.dot(&view_dir) < 0.0)
            }
            _ => true, // non-manifold fin, draw it
        })
        .map(|(key, _)| key)
        .collect();
    edges.sort_unstable();
    edges
}

/// Subtract the occluded parameter intervals of a view-space segment,
/// returning the visible `(t0, t1)` intervals of `[0, 1]`
fn visible_intervals(a: &Point3<f64>, b: &Point3<f64>, occluders: &[ViewTri]) -> Vec<(f64, f64)> {
    let mut occluded: Vec<(f64, f64)> = Vec::new();
    for tri in occluders {
        if let Some(interval) = occluded_interval(a, b, tri) {
            occluded.push(interval);
        }
    }
    subtract_intervals(occluded)
}

/// The parameter interval of segment `a..b` hidden by one triangle, if any
fn occluded_interval(a: &Point3<f64>, b: &Point3<f64>, tri: &ViewTri) -> Option<(f64, f64)> {
    // Footprint: clip the parametric 2D line against the triangle's edges
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for k in 0..3 {
        let p = tri.p[k];
        let q = tri.p[(k + 1) % 3];
        // Inside test oriented by the triangle's signed area
        let edge = Point2::new(q.x - p.x, q.y - p.y);
        let f_a = cross2(edge, Point2::new(a.x - p.x, a.y - p.y)) * tri.area2.signum();
        let f_b = cross2(edge, Point2::new(b.x - p.x, b.y - p.y)) * tri.area2.signum();
        // f(t) = f_a + (f_b - f_a) t >= 0 required to stay inside
        let df = f_b - f_a;
        if df.abs() < 1e-15 {
            if f_a < 0.0 {
                return None;
            }
            continue;
        }
        let root = -f_a / df;
        if df > 0.0 {
            t0 = t0.max(root);
        } else {
            t1 = t1.min(root);
        }
        if t0 >= t1 {
            return None;
        }
    }

    // Depth: the triangle hides the segment where it is strictly nearer.
    // Both depths are linear in t, so this is one more linear clip.
    let n = (tri.p[1] - tri.p[0]).cross(&(tri.p[2] - tri.p[0]));
    if n.z.abs() < 1e-12 {
        return None; // perpendicular to the view, no reliable depth
    }
    let depth_at = |p2: Point2<f64>| {
        tri.p[0].z - (n.x * (p2.x - tri.p[0].x) + n.y * (p2.y - tri.p[0].y)) / n.z
    };
    let g0 = depth_at(Point2::new(a.x, a.y)) - a.z - DEPTH_EPS;
    let g1 = depth_at(Point2::new(b.x, b.y)) - b.z - DEPTH_EPS;
    // g(t) > 0 where the triangle is nearer than the segment
    let dg = g1 - g0;
    if dg.abs() < 1e-15 {
        if g0 <= 0.0 {
            return None;
        }
    } else {
        let root = -g0 / dg;
        if dg > 0.0 {
            t0 = t0.max(root);
        } else {
            t1 = t1.min(root);
        }
    }
    if t0 >= t1 {
        return None;
    }
    Some((t0, t1))
}

/// Complement of a set of sub-intervals of `[0, 1]`
fn subtract_intervals(mut occluded: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    occluded.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut visible = Vec::new();
    let mut cursor = 0.0_f64;
    for (start, end) in occluded {
        if start > cursor {
            visible.push((cursor, start));
        }
        cursor = cursor.max(end);
        if cursor >= 1.0 {
            return visible;
        }
    }
    if cursor < 1.0 {
        visible.push((cursor, 1.0));
    }
    visible
}

/// Keep the part of a view-space segment at or behind the plane (z <= 0)
fn clip_segment_behind(
    a: Point3<f64>,
    b: Point3<f64>,
) -> Option<(Point3<f64>, Point3<f64>)> {
    match (a.z <= 0.0, b.z <= 0.0) {
        (true, true) => Some((a, b)),
        (false, false) => None,
        (true, false) => {
            let t = a.z / (a.z - b.z);
            Some((a, lerp3(&a, &b, t)))
        }
        (false, true) => {
            let t = a.z / (a.z - b.z);
            Some((lerp3(&a, &b, t), b))
        }
    }
}

/// Sutherland-Hodgman clip of a triangle against z <= 0, re-fanned
fn clip_triangle_behind(tri: &[Point3<f64>; 3]) -> Vec<[Point3<f64>; 3]> {
    let mut polygon: Vec<Point3<f64>> = Vec::with_capacity(4);
    for k in 0..3 {
        let cur = tri[k];
        let next = tri[(k + 1) % 3];
        if cur.z <= 0.0 {
            polygon.push(cur);
        }
        if (cur.z <= 0.0) != (next.z <= 0.0) {
            let t = cur.z / (cur.z - next.z);
            polygon.push(lerp3(&cur, &next, t));
        }
    }
    (2..polygon.len())
        .map(|i| [polygon[0], polygon[i - 1], polygon[i]])
        .collect()
}

fn lerp3(a: &Point3<f64>, b: &Point3<f64>, t: f64) -> Point3<f64> {
    Point3::new(
        a.x + (b.x - a.x) * t,
        a.y + (b.y - a.y) * t,
        a.z + (b.z - a.z) * t,
    )
}

/// Closed section curves of one element on a cutting plane
fn section_paths(element: &ResolvedElement, plane: &DrawingPlane) -> Option<Element> {
    let loops = section_loops(element, plane)?;
    let mut d = String::new();
    for (points, closed) in &loops {
        d.push('M');
        for (i, p) in points.iter().enumerate() {
            let s = plane.paper(&Point3::new(p.x, p.y, 0.0));
            if i > 0 {
                d.push_str(" L");
            }
            d.push_str(&format!("{},{}", fmt(s.x), fmt(s.y)));
        }
        if *closed {
            d.push_str(" Z");
        }
        d.push(' ');
    }
    Some(
        Element::new("path")
            .with_attr("class", element.ifc_type.clone())
            .with_attr("ifc:guid", element.guid.clone())
            .with_attr("d", d.trim_end().to_string()),
    )
}

/// Intersect an element with the cut plane and chain the resulting segments
/// into polylines (view-space 2D). Returns `None` when nothing is cut.
fn section_loops(
    element: &ResolvedElement,
    plane: &DrawingPlane,
) -> Option<Vec<(Vec<Point2<f64>>, bool)>> {
    let mut segments: Vec<(Point2<f64>, Point2<f64>)> = Vec::new();
    for face in 0..element.faces.len() {
        let tri = element.triangle(face).map(|p| plane.world_to_view(&p));
        let mut crossings: SmallVec<[Point2<f64>; 3]> = SmallVec::new();
        for k in 0..3 {
            let (p, q) = (tri[k], tri[(k + 1) % 3]);
            if (p.z <= 0.0) != (q.z <= 0.0) {
                let t = p.z / (p.z - q.z);
                crossings.push(Point2::new(p.x + (q.x - p.x) * t, p.y + (q.y - p.y) * t));
            }
        }
        if crossings.len() == 2 && (crossings[0] - crossings[1]).norm() > 1e-9 {
            segments.push((crossings[0], crossings[1]));
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(chain_segments(&segments))
}

/// Greedy chaining of unordered segments into polylines by endpoint identity
fn chain_segments(segments: &[(Point2<f64>, Point2<f64>)]) -> Vec<(Vec<Point2<f64>>, bool)> {
    const SNAP: f64 = 1e-6;
    let key = |p: &Point2<f64>| ((p.x / SNAP).round() as i64, (p.y / SNAP).round() as i64);

    let mut by_endpoint: FxHashMap<(i64, i64), SmallVec<[usize; 2]>> = FxHashMap::default();
    for (i, (a, b)) in segments.iter().enumerate() {
        by_endpoint.entry(key(a)).or_default().push(i);
        by_endpoint.entry(key(b)).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut loops = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut points = vec![a, b];
        let start_key = key(&a);
        let mut closed = false;

        loop {
            let tail = *points.last().expect("chain is never empty");
            let tail_key = key(&tail);
            if tail_key == start_key {
                points.pop(); // drop duplicated closing point
                closed = true;
                break;
            }
            let next = by_endpoint
                .get(&tail_key)
                .and_then(|c| c.iter().find(|&&i| !used[i]).copied());
            match next {
                Some(i) => {
                    used[i] = true;
                    let (p, q) = segments[i];
                    points.push(if key(&p) == tail_key { q } else { p });
                }
                None => break,
            }
        }
        loops.push((points, closed));
    }
    loops
}

fn annotate_space(
    annotation: &mut Element,
    element: &ResolvedElement,
    plane: &DrawingPlane,
    settings: &DrawSettings,
) {
    let Some(loops) = section_loops(element, plane) else {
        return;
    };
    // Label at the centroid of the largest cut loop
    let largest = loops
        .iter()
        .max_by(|a, b| polygon_area(&a.0).total_cmp(&polygon_area(&b.0)));
    let Some((points, _)) = largest else { return };
    if points.is_empty() {
        return;
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in points {
        cx += p.x;
        cy += p.y;
    }
    let n = points.len() as f64;
    let anchor = plane.paper(&Point3::new(cx / n, cy / n, 0.0));

    if settings.space_names {
        let mut text = Element::new("text")
            .with_attr("class", "space-name")
            .with_attr("x", fmt(anchor.x))
            .with_attr("y", fmt(anchor.y));
        text.push_text(element.name.clone().unwrap_or_else(|| element.guid.clone()));
        annotation.push(text);
    }
    if settings.space_areas {
        let area = polygon_area(points);
        let mut text = Element::new("text")
            .with_attr("class", "space-area")
            .with_attr("x", fmt(anchor.x))
            .with_attr("y", fmt(anchor.y + 4.0));
        text.push_text(format!("{area:.2} m\u{b2}"));
        annotation.push(text);
    }
}

fn polygon_area(points: &[Point2<f64>]) -> f64 {
    let mut doubled = 0.0;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        doubled += p.x * q.y - q.x * p.y;
    }
    doubled.abs() / 2.0
}

/// Quarter-circle swing arc for a door cut by the plane
fn annotate_door_arc(annotation: &mut Element, element: &ResolvedElement, plane: &DrawingPlane) {
    let bounds = element.bounds();
    if bounds.is_empty() || plane.depth(&bounds.min) > 0.0 || plane.depth(&bounds.max) < 0.0 {
        return; // not cut by this plane
    }
    let min = plane.world_to_view(&bounds.min);
    let max = plane.world_to_view(&bounds.max);
    let (x0, x1) = (min.x.min(max.x), min.x.max(max.x));
    let (y0, y1) = (min.y.min(max.y), min.y.max(max.y));
    // The leaf width is the larger in-plane extent of the door box
    let width = (x1 - x0).max(y1 - y0);
    if width < 1e-6 {
        return;
    }
    let hinge = Point3::new(x0, y0, 0.0);
    let open = plane.paper(&Point3::new(x0 + width, y0, 0.0));
    let swung = plane.paper(&Point3::new(x0, y0 + width, 0.0));
    let radius = (open - plane.paper(&hinge)).norm();
    annotation.push(
        Element::new("path")
            .with_attr("class", "door-arc")
            .with_attr("ifc:guid", element.guid.clone())
            .with_attr(
                "d",
                format!(
                    "M{},{} A{},{} 0 0 1 {},{}",
                    fmt(open.x),
                    fmt(open.y),
                    fmt(radius),
                    fmt(radius),
                    fmt(swung.x),
                    fmt(swung.y)
                ),
            ),
    );
}

fn annotate_storey_height(
    annotation: &mut Element,
    name: &str,
    elevation: f64,
    plane: &DrawingPlane,
    settings: &DrawSettings,
    mode: StoreyHeights,
) {
    // A level line is horizontal in world space; project one point for y
    let anchor = plane.project(&Point3::new(plane.origin.x, plane.origin.y, elevation));
    if !anchor.y.is_finite() {
        return;
    }
    let (x0, x1) = match mode {
        StoreyHeights::Full => (0.0, settings.width),
        StoreyHeights::Left => (0.0, 15.0),
        StoreyHeights::None => return,
    };
    annotation.push(
        Element::new("path")
            .with_attr("class", "storey-height")
            .with_attr(
                "d",
                format!("M{},{} L{},{}", fmt(x0), fmt(anchor.y), fmt(x1), fmt(anchor.y)),
            ),
    );
    let mut text = Element::new("text")
        .with_attr("class", "storey-height")
        .with_attr("x", fmt(x0 + 1.0))
        .with_attr("y", fmt(anchor.y - 1.0));
    text.push_text(format!("{name} {elevation:+.2}"));
    annotation.push(text);
}

/// Compact coordinate formatting for path data
fn fmt(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "" | "-" | "-0" => "0".to_string(),
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ResolvedElement;
    use approx::assert_relative_eq;
    use ifcplot_model::Style;

    fn box_element(guid: &str, ifc_type: &str, min: [f64; 3], max: [f64; 3]) -> ResolvedElement {
        let (a, b) = (min, max);
        let vertices = vec![
            [a[0], a[1], a[2]],
            [b[0], a[1], a[2]],
            [b[0], b[1], a[2]],
            [a[0], b[1], a[2]],
            [a[0], a[1], b[2]],
            [b[0], a[1], b[2]],
            [b[0], b[1], b[2]],
            [a[0], b[1], b[2]],
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2], // bottom
            [4, 5, 6],
            [4, 6, 7], // top
            [0, 1, 5],
            [0, 5, 4], // south
            [2, 3, 7],
            [2, 7, 6], // north
            [0, 4, 7],
            [0, 7, 3], // west
            [1, 2, 6],
            [1, 6, 5], // east
        ];
        let face_styles = vec![0; faces.len()];
        ResolvedElement {
            guid: guid.to_string(),
            ifc_type: ifc_type.to_string(),
            name: Some(guid.to_string()),
            storey: None,
            vertices,
            faces,
            face_styles,
            styles: vec![Style::opaque("default", [0.8, 0.8, 0.8])],
        }
    }

    fn top_down_plane() -> PlaneSpec {
        PlaneSpec {
            name: "TOP".to_string(),
            kind: DrawingKind::Floorplan,
            origin: Point3::new(0.0, 0.0, 5.0),
            view_dir: Vector3::new(0.0, 0.0, -1.0),
            x_axis: Vector3::new(1.0, 0.0, 0.0),
        }
    }

    #[test]
    fn test_subtract_intervals_complement() {
        let visible = subtract_intervals(vec![(0.2, 0.4), (0.3, 0.6), (0.9, 2.0)]);
        assert_eq!(visible.len(), 2);
        assert_relative_eq!(visible[0].0, 0.0);
        assert_relative_eq!(visible[0].1, 0.2);
        assert_relative_eq!(visible[1].0, 0.6);
        assert_relative_eq!(visible[1].1, 0.9);
    }

    #[test]
    fn test_occlusion_hides_edge_behind_triangle() {
        // Occluder at depth -1 (nearer viewer), edge at depth -2 crossing it
        let tri = [
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(0.0, 2.0, -1.0),
        ];
        let mut occluders = Vec::new();
        push_occluder(&mut occluders, tri);
        let a = Point3::new(-5.0, 0.0, -2.0);
        let b = Point3::new(5.0, 0.0, -2.0);
        let visible = visible_intervals(&a, &b, &occluders);
        assert_eq!(visible.len(), 2);
        assert!(visible[0].1 < 0.5 && visible[1].0 > 0.5);
    }

    #[test]
    fn test_coplanar_face_does_not_occlude_own_edge() {
        let tri = [
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(1.0, 0.0, -1.0),
            Point3::new(0.0, 1.0, -1.0),
        ];
        let mut occluders = Vec::new();
        push_occluder(&mut occluders, tri);
        // The triangle's own hypotenuse edge, same depth
        let a = Point3::new(1.0, 0.0, -1.0);
        let b = Point3::new(0.0, 1.0, -1.0);
        let visible = visible_intervals(&a, &b, &occluders);
        assert_eq!(visible, vec![(0.0, 1.0)]);
    }

    #[test]
    fn test_single_slab_projects_to_square_outline() {
        let settings = DrawSettings {
            auto_floorplan: false,
            ..Default::default()
        };
        let slab = box_element("slab", "IfcSlab", [0.0, 0.0, 0.0], [10.0, 10.0, 0.3]);
        let mut sr = SvgSerializer::new(settings.clone()).unwrap();
        sr.add_drawing(top_down_plane());
        sr.write(&slab);
        let doc = sr.finalize().unwrap();

        let projections = doc.root.groups_with_class("projection");
        assert_eq!(projections.len(), 1);
        let paths: Vec<_> = projections[0].child_elements().collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].attr("class"), Some("IfcSlab"));
        assert!(paths[0].attr("d").unwrap().contains('M'));
        assert_eq!(sr.skipped(), 0);
    }

    #[test]
    fn test_wall_cut_produces_closed_section() {
        let settings = DrawSettings {
            auto_floorplan: false,
            ..Default::default()
        };
        let wall = box_element("wall", "IfcWall", [0.0, 0.0, 0.0], [5.0, 0.3, 3.0]);
        let mut sr = SvgSerializer::new(settings.clone()).unwrap();
        sr.add_drawing(PlaneSpec {
            name: "P1".to_string(),
            kind: DrawingKind::Floorplan,
            origin: Point3::new(0.0, 0.0, 1.2),
            view_dir: Vector3::new(0.0, 0.0, -1.0),
            x_axis: Vector3::new(1.0, 0.0, 0.0),
        });
        sr.write(&wall);
        let doc = sr.finalize().unwrap();

        let sections = doc.root.groups_with_class("section");
        assert_eq!(sections.len(), 1);
        let paths: Vec<_> = sections[0].child_elements().collect();
        assert_eq!(paths.len(), 1);
        let d = paths[0].attr("d").unwrap();
        assert!(d.contains('Z'), "section should close: {d}");
    }

    #[test]
    fn test_element_above_cut_not_projected() {
        let settings = DrawSettings {
            auto_floorplan: false,
            ..Default::default()
        };
        let high = box_element("roof", "IfcRoof", [0.0, 0.0, 8.0], [10.0, 10.0, 9.0]);
        let mut sr = SvgSerializer::new(settings.clone()).unwrap();
        sr.add_drawing(top_down_plane());
        sr.write(&high);
        let doc = sr.finalize().unwrap();
        let projections = doc.root.groups_with_class("projection");
        assert_eq!(projections[0].child_elements().count(), 0);
    }

    #[test]
    fn test_nearer_box_hides_lower_slab_edges() {
        // A big box right under the cut plane hides the small slab far below
        let settings = DrawSettings {
            auto_floorplan: false,
            ..Default::default()
        };
        let cover = box_element("cover", "IfcSlab", [-10.0, -10.0, 3.0], [10.0, 10.0, 4.0]);
        let slab = box_element("slab", "IfcSlab", [2.0, 2.0, 0.0], [4.0, 4.0, 0.5]);
        let mut sr = SvgSerializer::new(settings.clone()).unwrap();
        sr.add_drawing(top_down_plane());
        sr.write(&cover);
        sr.write(&slab);
        let doc = sr.finalize().unwrap();

        let projections = doc.root.groups_with_class("projection");
        let slab_paths: Vec<_> = projections[0]
            .child_elements()
            .filter(|p| p.attr("ifc:guid") == Some("slab"))
            .collect();
        assert!(slab_paths.is_empty(), "slab should be fully hidden");
    }

    #[test]
    fn test_profile_threshold_drops_short_features() {
        // At 1:100 the 0.05 m stud projects to 0.5 mm of paper, under the
        // 1 mm threshold; the 10 m slab stays at 100 mm
        let settings = DrawSettings {
            auto_floorplan: false,
            profile_threshold: 1.0,
            ..Default::default()
        };
        let slab = box_element("slab", "IfcSlab", [0.0, 0.0, 0.0], [10.0, 10.0, 0.3]);
        let stud = box_element("stud", "IfcMember", [2.0, 2.0, 0.3], [2.05, 2.05, 0.35]);
        let mut sr = SvgSerializer::new(settings).unwrap();
        sr.add_drawing(top_down_plane());
        sr.write(&slab);
        sr.write(&stud);
        let doc = sr.finalize().unwrap();

        let projections = doc.root.groups_with_class("projection");
        let guids: Vec<_> = projections[0]
            .child_elements()
            .filter_map(|p| p.attr("ifc:guid"))
            .collect();
        assert!(guids.contains(&"slab"));
        assert!(!guids.contains(&"stud"), "sub-threshold features must vanish");
        assert_eq!(sr.skipped(), 0, "threshold drops are not projection failures");
    }

    #[test]
    fn test_storey_height_lines_annotated_on_elevations() {
        let settings = DrawSettings {
            auto_floorplan: false,
            storey_heights: "left".to_string(),
            ..Default::default()
        };
        let wall = box_element("wall", "IfcWall", [0.0, 0.0, 0.0], [10.0, 0.3, 6.0]);
        let mut sr = SvgSerializer::new(settings).unwrap();
        sr.set_storeys(vec![("Ground".to_string(), 0.0), ("Level 1".to_string(), 3.0)]);
        sr.add_drawing(PlaneSpec {
            name: "SOUTH".to_string(),
            kind: DrawingKind::Elevation,
            origin: Point3::new(5.0, -1.0, 3.0),
            view_dir: Vector3::new(0.0, 1.0, 0.0),
            x_axis: Vector3::new(1.0, 0.0, 0.0),
        });
        sr.write(&wall);
        let doc = sr.finalize().unwrap();

        let annotations = doc.root.groups_with_class("annotation");
        assert_eq!(annotations.len(), 1);
        // One level line and one elevation label per storey
        let levels: Vec<_> = annotations[0]
            .child_elements()
            .filter(|e| e.attr("class") == Some("storey-height"))
            .collect();
        assert_eq!(levels.len(), 4);
        let tick = levels.iter().find(|e| e.tag == "path").unwrap();
        assert!(tick.attr("d").unwrap().contains("L15,"), "left mode draws short ticks");
    }

    #[test]
    fn test_space_annotations_emitted() {
        let settings = DrawSettings {
            auto_floorplan: false,
            space_names: true,
            space_areas: true,
            ..Default::default()
        };
        let space = box_element("Living room", "IfcSpace", [0.0, 0.0, 0.0], [4.0, 5.0, 3.0]);
        let mut sr = SvgSerializer::new(settings.clone()).unwrap();
        sr.add_drawing(PlaneSpec {
            name: "Ground".to_string(),
            kind: DrawingKind::Floorplan,
            origin: Point3::new(0.0, 0.0, 1.2),
            view_dir: Vector3::new(0.0, 0.0, -1.0),
            x_axis: Vector3::new(1.0, 0.0, 0.0),
        });
        sr.write(&space);
        let doc = sr.finalize().unwrap();

        let annotations = doc.root.groups_with_class("annotation");
        assert_eq!(annotations.len(), 1);
        let texts: Vec<_> = annotations[0].child_elements().collect();
        assert_eq!(texts.len(), 2);
        let area_text = texts
            .iter()
            .find(|t| t.attr("class") == Some("space-area"))
            .unwrap();
        match &area_text.children[0] {
            crate::dom::Node::Text(t) => assert!(t.contains("20.00 m"), "{t}"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_fmt_trims_trailing_zeros() {
        assert_eq!(fmt(148.5), "148.5");
        assert_eq!(fmt(10.0), "10");
        assert_eq!(fmt(0.0), "0");
        assert_eq!(fmt(-0.00004), "0");
    }
}
