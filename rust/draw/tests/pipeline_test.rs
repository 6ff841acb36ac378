// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ifcplot_draw::{
    draw, line_segments_to_cells, merge_documents, svg_to_line_segments, Document, DrawSettings,
    ElementTreeBuilder, Error, CELL_TOLERANCE,
};
use ifcplot_model::{Model, Placement, Product, Storey, Style, TriMesh};
use nalgebra::{Matrix4, Vector3, Vector4};

/// Axis-aligned box with outward-facing triangles
fn box_mesh(min: [f64; 3], max: [f64; 3]) -> TriMesh {
    let [x0, y0, z0] = min;
    let [x1, y1, z1] = max;
    let vertices = vec![
        [x0, y0, z0],
        [x1, y0, z0],
        [x1, y1, z0],
        [x0, y1, z0],
        [x0, y0, z1],
        [x1, y0, z1],
        [x1, y1, z1],
        [x0, y1, z1],
    ];
    let faces = vec![
        [0, 2, 1],
        [0, 3, 2], // bottom
        [4, 5, 6],
        [4, 6, 7], // top
        [0, 1, 5],
        [0, 5, 4], // front
        [2, 3, 7],
        [2, 7, 6], // back
        [1, 2, 6],
        [1, 6, 5], // right
        [3, 0, 4],
        [3, 4, 7], // left
    ];
    let face_styles = vec![0; faces.len()];
    TriMesh {
        vertices,
        faces,
        face_styles,
    }
}

fn product(guid: &str, ifc_type: &str, mesh: TriMesh, diffuse: [f64; 3]) -> Product {
    Product {
        guid: guid.to_string(),
        ifc_type: ifc_type.to_string(),
        name: Some(ifc_type.to_string()),
        storey: Some(0),
        placement: Placement::identity(),
        mesh,
        styles: vec![Style {
            name: format!("{ifc_type}-style"),
            diffuse,
            transparency: None,
        }],
    }
}

/// A one-room building: slab, two walls and a space on a single storey
fn building() -> Model {
    Model {
        name: "building".to_string(),
        unit_scale: 1.0,
        storeys: vec![Storey {
            name: "Ground".to_string(),
            elevation: 0.0,
        }],
        products: vec![
            product(
                "0h$kzJatj1uu4Kx0mpnkYO",
                "IfcSlab",
                box_mesh([0.0, 0.0, -0.3], [10.0, 10.0, 0.0]),
                [0.6, 0.6, 0.6],
            ),
            product(
                "1MBhqpnlbBwR9rc3_hfmnZ",
                "IfcWall",
                box_mesh([0.0, 0.0, 0.0], [10.0, 0.2, 3.0]),
                [0.8, 0.7, 0.6],
            ),
            product(
                "2wA7Ta2aT3DudLYhbCIUlX",
                "IfcWall",
                box_mesh([0.0, 9.8, 0.0], [10.0, 10.0, 3.0]),
                [0.8, 0.7, 0.6],
            ),
            product(
                "3vMVT0zPz45xqE7_Ykqcca",
                "IfcSpace",
                box_mesh([0.2, 0.2, 0.0], [9.8, 9.8, 3.0]),
                [1.0, 1.0, 1.0],
            ),
        ],
        source: None,
    }
}

#[test]
fn test_floorplan_produces_classified_merged_drawing() {
    let bytes = draw(&DrawSettings::default(), &[building()], |_| {}).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.is_ascii());

    let doc = Document::parse(&text).unwrap();
    let drawings = doc.root.groups_with_class("drawing");
    assert_eq!(drawings.len(), 1, "one floorplan for the single storey");
    assert!(drawings[0].attr("ifc:plane").is_some());
    assert!(drawings[0].attr("ifc:matrix3").is_some());

    // The cut runs through the walls, so sections must be present
    let sections = doc.root.groups_with_class("section");
    assert_eq!(sections.len(), 1);
    assert!(sections[0].child_elements().any(|e| e.tag == "path"));

    // Merged cells carry element classes and blended fills
    assert!(text.contains("class=\"IfcSlab\"") || text.contains("class=\"IfcWall\""));
    assert!(text.contains("fill: rgb("));
}

#[test]
fn test_empty_input_still_yields_a_document() {
    let bytes = draw(&DrawSettings::default(), &[], |_| {}).unwrap();
    let doc = Document::parse(&String::from_utf8(bytes).unwrap()).unwrap();
    assert_eq!(doc.root.tag, "svg");
    assert!(doc.root.groups_with_class("drawing").is_empty());
}

#[test]
fn test_configuration_errors_are_reported_before_processing() {
    let settings = DrawSettings {
        storey_heights: "diagonal".to_string(),
        ..DrawSettings::default()
    };
    let err = draw(&settings, &[building()], |_| {}).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("'none', 'full', 'left'"));
}

#[test]
fn test_mismatched_documents_are_rejected_whole() {
    let drawing = Document::parse(concat!(
        "<svg>",
        "<g class=\"drawing\" ifc:plane=\"[[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]\" ",
        "ifc:matrix3=\"[[1,0,0],[0,1,0],[0,0,1]]\"><g class=\"projection\"/></g>",
        "<g class=\"drawing\" ifc:plane=\"[[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]\" ",
        "ifc:matrix3=\"[[1,0,0],[0,1,0],[0,0,1]]\"><g class=\"projection\"/></g>",
        "<g class=\"drawing\" ifc:plane=\"[[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]\" ",
        "ifc:matrix3=\"[[1,0,0],[0,1,0],[0,0,1]]\"><g class=\"projection\"/></g>",
        "</svg>"
    ))
    .unwrap();
    let cells = Document::parse("<svg><g/><g/></svg>").unwrap();
    let tree = ElementTreeBuilder::new().build();

    match merge_documents(&drawing, &cells, &tree) {
        Err(Error::GroupCountMismatch { projections, cells }) => {
            assert_eq!((projections, cells), (3, 2));
        }
        other => panic!("expected a group count mismatch, got {other:?}"),
    }
}

#[test]
fn test_projection_attributes_reconstruct_the_view_axis() {
    // The embedded plane and paper matrices must round-trip: a ray built
    // from any paper point runs along the drawing's view axis.
    let settings = DrawSettings {
        auto_elevation: true,
        auto_floorplan: false,
        cells: false,
        ..DrawSettings::default()
    };
    let bytes = draw(&settings, &[building()], |_| {}).unwrap();
    let doc = Document::parse(&String::from_utf8(bytes).unwrap()).unwrap();

    let drawings = doc.root.groups_with_class("drawing");
    assert_eq!(drawings.len(), 4, "four cardinal elevations");
    for group in drawings {
        let rows: Vec<Vec<f64>> =
            serde_json::from_str(group.attr("ifc:plane").unwrap()).unwrap();
        let plane = Matrix4::from_fn(|r, c| rows[r][c]);
        let m3: [[f64; 3]; 3] =
            serde_json::from_str(group.attr("ifc:matrix3").unwrap()).unwrap();
        let mut paper = Matrix4::identity();
        paper[(0, 0)] = m3[0][0];
        paper[(0, 1)] = m3[0][1];
        paper[(1, 0)] = m3[1][0];
        paper[(1, 1)] = m3[1][1];
        paper[(0, 3)] = m3[0][2];
        paper[(1, 3)] = m3[1][2];
        let inverse = paper.try_inverse().unwrap();

        let project = |x: f64, y: f64, z: f64| {
            let v = inverse * Vector4::new(x, y, z, 1.0);
            let w = plane * Vector4::new(v.x, -v.y, v.z, 1.0);
            Vector3::new(w.x, w.y, w.z)
        };
        let direction = (project(40.0, 55.0, -100.0) - project(40.0, 55.0, 0.0)).normalize();

        // The plane's third column is its normal; the view axis is opposite
        let normal = Vector3::new(plane[(0, 2)], plane[(1, 2)], plane[(2, 2)]);
        assert!(
            (direction + normal).norm() < 1e-6,
            "ray direction {direction:?} is not opposite normal {normal:?}"
        );
    }
}

#[test]
fn test_cell_reconstruction_is_stable_across_reruns() {
    let settings = DrawSettings {
        cells: false,
        ..DrawSettings::default()
    };
    let bytes = draw(&settings, &[building()], |_| {}).unwrap();
    let doc = Document::parse(&String::from_utf8(bytes).unwrap()).unwrap();

    let groups = svg_to_line_segments(&doc, "projection");
    assert_eq!(groups.len(), 1);
    let first = line_segments_to_cells(&groups[0], CELL_TOLERANCE);
    let second = line_segments_to_cells(&groups[0], CELL_TOLERANCE);
    assert!(!first.is_empty(), "the slab outline should close into cells");
    assert_eq!(first, second);
}

#[test]
fn test_geometry_cache_replays_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let settings = DrawSettings {
        cache: true,
        cache_dir: dir.path().to_string_lossy().into_owned(),
        ..DrawSettings::default()
    };
    let first = draw(&settings, &[building()], |_| {}).unwrap();
    let second = draw(&settings, &[building()], |_| {}).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_excluded_entities_are_absent_from_the_index() {
    // Openings are excluded by default; including only walls must keep the
    // slab out of both the drawing and the classification
    let settings = DrawSettings {
        include_entities: "IfcWall".to_string(),
        ..DrawSettings::default()
    };
    let bytes = draw(&settings, &[building()], |_| {}).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(!text.contains("IfcSlab"));
    assert!(!text.contains("IfcSpace"));
}

#[test]
fn test_spaces_are_drawn_but_never_classify_cells() {
    // Spaces stay out of the spatial index, so no merged cell can be
    // classified as the room volume it sits in. The space's own section
    // outline is still drawn and keeps its entity class.
    let bytes = draw(&DrawSettings::default(), &[building()], |_| {}).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("IfcSpace"), "the space itself must be drawn");
    assert!(text.contains("fill: rgb("));

    let doc = Document::parse(&text).unwrap();
    for group in doc.root.groups_with_class("projection") {
        for path in group.descendants() {
            assert_ne!(
                path.attr("class"),
                Some("IfcSpace"),
                "a cell classified as the room it sits in"
            );
        }
    }
}
