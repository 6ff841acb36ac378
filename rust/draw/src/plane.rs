// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drawing planes: named 2D projection targets
//!
//! A drawing plane maps world space (metres) to SVG paper space (mm) in two
//! steps: a rigid view transform into plane coordinates, then a 2D affine
//! paper transform with the SVG y-flip. Both steps are emitted as group
//! attributes (`ifc:plane`, `ifc:matrix3`) so the merger can invert screen
//! points back into world-space rays without access to the plane itself.

use crate::settings::DrawSettings;
use nalgebra::{Matrix4, Point2, Point3, Vector3};

/// Height above a storey elevation at which floorplans are cut, in metres
pub const SECTION_CUT_HEIGHT: f64 = 1.2;

/// What kind of drawing a plane produces; controls cutting and annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingKind {
    /// Horizontal cut looking down
    Floorplan,
    /// Vertical cut through the model
    Section,
    /// View of a facade, no cutting
    Elevation,
}

impl DrawingKind {
    /// Whether geometry in front of the plane is cut away
    pub fn cuts(&self) -> bool {
        matches!(self, DrawingKind::Floorplan | DrawingKind::Section)
    }
}

/// Axis-aligned world-space bounding box of the drawable content
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    /// Empty bounds, ready to be grown
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Grow to include a point
    pub fn extend(&mut self, p: &Point3<f64>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// The eight corner points
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }
}

/// A named 2D projection target with its paper mapping
#[derive(Debug, Clone)]
pub struct DrawingPlane {
    /// Stable drawing name, e.g. the storey name
    pub name: String,
    pub kind: DrawingKind,
    /// Plane origin in world space; cut level for cutting drawings
    pub origin: Point3<f64>,
    /// Plane normal, pointing toward the viewer
    pub normal: Vector3<f64>,
    /// In-plane x axis (paper right)
    pub x_axis: Vector3<f64>,
    /// Paper affine mapping flipped plane coordinates to SVG mm,
    /// rows `[[sx, 0, tx], [0, sy, ty], [0, 0, 1]]`
    pub matrix3: [[f64; 3]; 3],
}

impl DrawingPlane {
    /// Create a plane and fit its paper transform around `content`.
    ///
    /// `view_dir` is the viewing direction (into the scene); the plane
    /// normal is its opposite. `x_axis` is orthonormalized against the
    /// normal, falling back to an arbitrary perpendicular when degenerate.
    pub fn new(
        name: impl Into<String>,
        kind: DrawingKind,
        origin: Point3<f64>,
        view_dir: Vector3<f64>,
        x_axis: Vector3<f64>,
        settings: &DrawSettings,
        content: &Bounds,
    ) -> Self {
        let normal = (-view_dir).normalize();
        let x_axis = orthonormal_x(x_axis, normal);
        let mut plane = Self {
            name: name.into(),
            kind,
            origin,
            normal,
            x_axis,
            matrix3: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        };
        plane.fit_paper(settings, content);
        plane
    }

    /// In-plane y axis completing the right-handed frame (x, y, normal)
    pub fn y_axis(&self) -> Vector3<f64> {
        self.normal.cross(&self.x_axis)
    }

    /// Viewing direction, into the scene
    pub fn view_dir(&self) -> Vector3<f64> {
        -self.normal
    }

    /// Plane-to-world matrix, emitted as the `ifc:plane` attribute
    pub fn plane_to_world(&self) -> Matrix4<f64> {
        let y = self.y_axis();
        let mut m = Matrix4::identity();
        for i in 0..3 {
            m[(i, 0)] = self.x_axis[i];
            m[(i, 1)] = y[i];
            m[(i, 2)] = self.normal[i];
            m[(i, 3)] = self.origin[i];
        }
        m
    }

    /// World point to plane coordinates (x, y in-plane; z toward viewer)
    pub fn world_to_view(&self, p: &Point3<f64>) -> Point3<f64> {
        let d = p - self.origin;
        Point3::new(d.dot(&self.x_axis), d.dot(&self.y_axis()), d.dot(&self.normal))
    }

    /// Signed view depth: positive is nearer the viewer than the plane
    pub fn depth(&self, p: &Point3<f64>) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    /// Apply the paper affine to flipped plane coordinates
    pub fn paper(&self, view: &Point3<f64>) -> Point2<f64> {
        let m = &self.matrix3;
        Point2::new(
            m[0][0] * view.x + m[0][2],
            m[1][1] * -view.y + m[1][2],
        )
    }

    /// Full forward projection: world point to SVG paper coordinates
    pub fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        self.paper(&self.world_to_view(p))
    }

    /// JSON-encoded row-major plane-to-world matrix
    pub fn plane_attr(&self) -> String {
        let m = self.plane_to_world();
        let rows: Vec<Vec<f64>> = (0..4).map(|r| (0..4).map(|c| m[(r, c)]).collect()).collect();
        serde_json::to_string(&rows).expect("matrix serializes")
    }

    /// JSON-encoded row-major paper affine matrix
    pub fn matrix3_attr(&self) -> String {
        serde_json::to_string(&self.matrix3).expect("matrix serializes")
    }

    /// Fit the paper transform so the projected content is centered on the
    /// sheet at the configured scale. Empty content centers the origin.
    fn fit_paper(&mut self, settings: &DrawSettings, content: &Bounds) {
        // mm of paper per metre of model
        let s = settings.scale * 1000.0;
        let (cx, cy) = if content.is_empty() {
            (0.0, 0.0)
        } else {
            let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
            let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
            for corner in content.corners() {
                let v = self.world_to_view(&corner);
                min.x = min.x.min(v.x);
                min.y = min.y.min(-v.y);
                max.x = max.x.max(v.x);
                max.y = max.y.max(-v.y);
            }
            ((min.x + max.x) / 2.0, (min.y + max.y) / 2.0)
        };
        self.matrix3 = [
            [s, 0.0, settings.width / 2.0 - s * cx],
            [0.0, s, settings.height / 2.0 - s * cy],
            [0.0, 0.0, 1.0],
        ];
    }
}

/// Derive one floorplan plane per storey, cut 1.2 m above the elevation
pub fn floorplans_from_storeys(
    storeys: &[(String, f64)],
    settings: &DrawSettings,
    content: &Bounds,
) -> Vec<DrawingPlane> {
    storeys
        .iter()
        .map(|(name, elevation)| {
            DrawingPlane::new(
                name.clone(),
                DrawingKind::Floorplan,
                Point3::new(0.0, 0.0, elevation + SECTION_CUT_HEIGHT),
                Vector3::new(0.0, 0.0, -1.0),
                Vector3::new(1.0, 0.0, 0.0),
                settings,
                content,
            )
        })
        .collect()
}

/// Derive the four cardinal elevation planes around the model bounds
pub fn elevations_from_bounds(settings: &DrawSettings, content: &Bounds) -> Vec<DrawingPlane> {
    if content.is_empty() {
        return Vec::new();
    }
    let c = content.center();
    let pad = 1.0;
    let views: [(&str, Point3<f64>, Vector3<f64>, Vector3<f64>); 4] = [
        (
            "SOUTH",
            Point3::new(c.x, content.min.y - pad, c.z),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ),
        (
            "NORTH",
            Point3::new(c.x, content.max.y + pad, c.z),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
        ),
        (
            "WEST",
            Point3::new(content.min.x - pad, c.y, c.z),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ),
        (
            "EAST",
            Point3::new(content.max.x + pad, c.y, c.z),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ),
    ];
    views
        .into_iter()
        .map(|(name, origin, view, x)| {
            DrawingPlane::new(name, DrawingKind::Elevation, origin, view, x, settings, content)
        })
        .collect()
}

/// Derive longitudinal and transverse sections through the bounds center
pub fn sections_from_bounds(settings: &DrawSettings, content: &Bounds) -> Vec<DrawingPlane> {
    if content.is_empty() {
        return Vec::new();
    }
    let c = content.center();
    vec![
        DrawingPlane::new(
            "SECTION A-A",
            DrawingKind::Section,
            c,
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            settings,
            content,
        ),
        DrawingPlane::new(
            "SECTION B-B",
            DrawingKind::Section,
            c,
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            settings,
            content,
        ),
    ]
}

/// Orthonormalize `x` against the plane normal, with a stable fallback when
/// they are (nearly) parallel
fn orthonormal_x(x: Vector3<f64>, normal: Vector3<f64>) -> Vector3<f64> {
    let x = x.normalize();
    let projected = x - normal * x.dot(&normal);
    if projected.norm() > 1e-6 {
        projected.normalize()
    } else if normal.z.abs() < 0.9 {
        Vector3::new(0.0, 0.0, 1.0).cross(&normal).normalize()
    } else {
        Vector3::new(1.0, 0.0, 0.0).cross(&normal).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_bounds() -> Bounds {
        let mut b = Bounds::empty();
        b.extend(&Point3::new(0.0, 0.0, 0.0));
        b.extend(&Point3::new(10.0, 10.0, 3.0));
        b
    }

    fn floorplan() -> DrawingPlane {
        let settings = DrawSettings::default();
        DrawingPlane::new(
            "Ground",
            DrawingKind::Floorplan,
            Point3::new(0.0, 0.0, SECTION_CUT_HEIGHT),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(1.0, 0.0, 0.0),
            &settings,
            &unit_bounds(),
        )
    }

    #[test]
    fn test_view_frame_is_right_handed() {
        let plane = floorplan();
        let y = plane.y_axis();
        assert_relative_eq!(plane.x_axis.cross(&y).dot(&plane.normal), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_content_center_maps_to_paper_center() {
        let plane = floorplan();
        let paper = plane.project(&Point3::new(5.0, 5.0, 0.0));
        assert_relative_eq!(paper.x, 297.0 / 2.0, epsilon = 1e-9);
        assert_relative_eq!(paper.y, 420.0 / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_paper_y_grows_downward() {
        let plane = floorplan();
        let north = plane.project(&Point3::new(5.0, 9.0, 0.0));
        let south = plane.project(&Point3::new(5.0, 1.0, 0.0));
        assert!(north.y < south.y);
    }

    #[test]
    fn test_depth_sign_convention() {
        let plane = floorplan();
        // Below the cut level is behind the plane
        assert!(plane.depth(&Point3::new(0.0, 0.0, 0.0)) < 0.0);
        assert!(plane.depth(&Point3::new(0.0, 0.0, 2.0)) > 0.0);
    }

    #[test]
    fn test_plane_attr_roundtrips_as_json() {
        let plane = floorplan();
        let rows: Vec<Vec<f64>> = serde_json::from_str(&plane.plane_attr()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].len(), 4);
        let m3: [[f64; 3]; 3] = serde_json::from_str(&plane.matrix3_attr()).unwrap();
        assert_relative_eq!(m3[0][0], 10.0); // 1:100 in mm per metre
    }

    #[test]
    fn test_degenerate_x_axis_falls_back() {
        let settings = DrawSettings::default();
        let plane = DrawingPlane::new(
            "bad-x",
            DrawingKind::Floorplan,
            Point3::origin(),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.0, 0.0, 1.0),
            &settings,
            &unit_bounds(),
        );
        assert_relative_eq!(plane.x_axis.dot(&plane.normal), 0.0, epsilon = 1e-12);
        assert_relative_eq!(plane.x_axis.norm(), 1.0, epsilon = 1e-12);
    }
}
