// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Document merge
//!
//! Combines the hidden-line serializer output with the reconstructed cell
//! document. Every cell is classified by casting a ray from its interior
//! sample point back into the model through the spatial index, which yields
//! the element type for CSS targeting and a depth-shaded fill color. The
//! restyled cell group then replaces the hidden-line projection group, kept
//! in front of the section group so sections draw on top.
//!
//! The merge never mutates either input tree; it produces a fresh document.

use ifcplot_model::{Matrix4, Point2, Point3, Style};
use nalgebra::Vector4;

use crate::dom::{Document, Element, Node};
use crate::error::{Error, Result};
use crate::tree::ElementTree;

const WHITE: [f64; 3] = [1.0, 1.0, 1.0];

/// How far behind the drawing plane classification rays reach, in metres
const RAY_DEPTH: f64 = 100.0;

/// Merge the cell document `cells` into the serializer output `drawing`.
///
/// The number of projection groups in `drawing` must equal the number of
/// groups in `cells`; a mismatch means the two documents were produced from
/// different drawing sets and nothing is emitted.
pub fn merge_documents(
    drawing: &Document,
    cells: &Document,
    tree: &ElementTree,
) -> Result<Document> {
    merge_documents_with_progress(drawing, cells, tree, &mut |_, _| {})
}

/// As [`merge_documents`], reporting the `(group, path)` indices of every
/// cell as it is classified
pub fn merge_documents_with_progress(
    drawing: &Document,
    cells: &Document,
    tree: &ElementTree,
    notify: &mut dyn FnMut(usize, usize),
) -> Result<Document> {
    let projections = drawing.root.groups_with_class("projection").len();
    let cell_groups: Vec<&Element> = cells
        .root
        .descendants()
        .into_iter()
        .filter(|e| e.tag == "g")
        .collect();
    if projections != cell_groups.len() {
        return Err(Error::GroupCountMismatch {
            projections,
            cells: cell_groups.len(),
        });
    }

    tracing::debug!(groups = projections, "merging cell document");
    let mut state = MergeState {
        cells: cell_groups.into_iter(),
        group: 0,
        notify,
    };
    let root = substitute(&drawing.root, tree, &mut state)?;
    Ok(Document::new(root))
}

/// Pairing cursor over the cell groups, in document order
struct MergeState<'a, 'n> {
    cells: std::vec::IntoIter<&'a Element>,
    group: usize,
    notify: &'n mut dyn FnMut(usize, usize),
}

/// Rebuild an element, swapping each projection group for the matching
/// restyled cell group. Pairing follows document order on both sides.
fn substitute(
    element: &Element,
    tree: &ElementTree,
    state: &mut MergeState<'_, '_>,
) -> Result<Element> {
    let has_projection = element
        .child_elements()
        .any(|c| c.tag == "g" && c.attr("class") == Some("projection"));

    let mut rebuilt = Element::new(element.tag.clone());
    for (name, value) in element.attrs() {
        rebuilt.set_attr(name, value);
    }

    if !has_projection {
        for child in &element.children {
            match child {
                Node::Element(e) => rebuilt.push(substitute(e, tree, state)?),
                Node::Text(t) => rebuilt.push_text(t.clone()),
            }
        }
        return Ok(rebuilt);
    }

    // This is a drawing group; its attributes reconstruct the projection
    let projector = CellProjector::from_group(element)?;
    let mut replacement: Option<Element> = None;
    for child in &element.children {
        match child {
            Node::Element(e) if e.tag == "g" && e.attr("class") == Some("projection") => {
                let cell_group = state
                    .cells
                    .next()
                    .ok_or_else(|| Error::Document("ran out of cell groups".into()))?;
                let group_index = state.group;
                state.group += 1;
                replacement = Some(restyle_cells(
                    cell_group,
                    &projector,
                    tree,
                    group_index,
                    state.notify,
                )?);
            }
            Node::Element(e) => rebuilt.push(substitute(e, tree, state)?),
            Node::Text(t) => rebuilt.push_text(t.clone()),
        }
    }
    if let Some(group) = replacement {
        // In front of the sections so they draw over the cells
        let at = rebuilt
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(_)))
            .unwrap_or(rebuilt.children.len());
        rebuilt.children.insert(at, Node::Element(group));
    }
    Ok(rebuilt)
}

/// Classify and color every cell path, producing the replacement group
fn restyle_cells(
    cell_group: &Element,
    projector: &CellProjector,
    tree: &ElementTree,
    group_index: usize,
    notify: &mut dyn FnMut(usize, usize),
) -> Result<Element> {
    let mut group = Element::new("g");
    for (name, value) in cell_group.attrs() {
        group.set_attr(name, value);
    }
    group.set_attr("class", "projection");

    for (path_index, path) in cell_group
        .descendants()
        .into_iter()
        .filter(|e| e.tag == "path")
        .enumerate()
    {
        notify(group_index, path_index);
        let point = path
            .attr("ifc:pointInside")
            .ok_or_else(|| Error::Document("cell path without ifc:pointInside".into()))
            .and_then(parse_point)?;

        let origin = projector.project(&point, 0.0);
        let target = projector.project(&point, -RAY_DEPTH);
        let hits = tree.select_ray(&origin, &(target - origin));

        let mut restyled = Element::new("path");
        for (name, value) in path.attrs() {
            restyled.set_attr(name, value);
        }
        let fill = match hits.first() {
            Some(hit) => {
                restyled.set_attr("class", tree.element(hit.element).ifc_type.clone());
                blend_fill(&tree.styles()[hit.style], hit.distance, hit.dot_product)
            }
            None => "none".to_string(),
        };
        restyled.set_attr("style", format!("fill: {}", fill));
        group.push(restyled);
    }
    Ok(group)
}

/// Depth-shaded fill: interpolates the style's diffuse color towards white
/// by a factor built from hit distance, incidence angle and transparency
fn blend_fill(style: &Style, distance: f64, dot_product: f64) -> String {
    let mut factor = ((distance + 2.0).ln() / 7.0) * (1.0 - 0.5 * dot_product.abs());
    if style.has_transparency() {
        factor *= 1.0 - style.transparency_or_zero();
    }
    let channel = |i: usize| (WHITE[i] * (1.0 - factor) + style.diffuse[i] * factor) * 255.0;
    format!("rgb({}, {}, {})", channel(0), channel(1), channel(2))
}

fn parse_point(value: &str) -> Result<Point2<f64>> {
    let mut parts = value.split(',');
    let parse = |s: Option<&str>| {
        s.and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| Error::Document(format!("malformed ifc:pointInside '{value}'")))
    };
    let x = parse(parts.next())?;
    let y = parse(parts.next())?;
    Ok(Point2::new(x, y))
}

/// Reconstructs the world-space projection from the `ifc:plane` and
/// `ifc:matrix3` attributes of a drawing group
struct CellProjector {
    plane: Matrix4<f64>,
    paper_inverse: Matrix4<f64>,
}

impl CellProjector {
    fn from_group(group: &Element) -> Result<Self> {
        let name = group.attr("ifc:name").unwrap_or("");
        let plane_rows: Vec<Vec<f64>> = parse_attr(group, "ifc:plane")?;
        if plane_rows.len() != 4 || plane_rows.iter().any(|r| r.len() != 4) {
            return Err(Error::Document(format!(
                "drawing '{name}' has a malformed ifc:plane"
            )));
        }
        let plane = Matrix4::from_fn(|r, c| plane_rows[r][c]);

        let m3: [[f64; 3]; 3] = parse_attr(group, "ifc:matrix3")?;
        let mut paper = Matrix4::identity();
        paper[(0, 0)] = m3[0][0];
        paper[(0, 1)] = m3[0][1];
        paper[(1, 0)] = m3[1][0];
        paper[(1, 1)] = m3[1][1];
        paper[(0, 3)] = m3[0][2];
        paper[(1, 3)] = m3[1][2];
        let paper_inverse = paper.try_inverse().ok_or_else(|| {
            Error::Document(format!("drawing '{name}' has a singular paper matrix"))
        })?;

        Ok(Self {
            plane,
            paper_inverse,
        })
    }

    /// Map a paper coordinate at the given plane depth back to world space
    fn project(&self, xy: &Point2<f64>, z: f64) -> Point3<f64> {
        let view = self.paper_inverse * Vector4::new(xy.x, xy.y, z, 1.0);
        // Paper y runs downwards
        let world = self.plane * Vector4::new(view.x, -view.y, view.z, 1.0);
        Point3::new(world.x, world.y, world.z)
    }
}

fn parse_attr<T: serde::de::DeserializeOwned>(group: &Element, name: &str) -> Result<T> {
    let raw = group
        .attr(name)
        .ok_or_else(|| Error::Document(format!("drawing group without {name}")))?;
    serde_json::from_str(raw)
        .map_err(|e| Error::Document(format!("malformed {name} attribute: {e}")))
}
