// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end drawing pipeline
//!
//! Streams every model through the hidden-line serializer while building the
//! spatial index, then optionally reconstructs cells from the hidden-line
//! output and merges the classified cells back into the document. The result
//! is the finished ASCII SVG byte stream.

use std::fs;
use std::path::Path;

use ifcplot_model::Model;

use crate::adapter::{ElementIterator, GeometryCache};
use crate::cells::{cells_to_svg, line_segments_to_cells, svg_to_line_segments, CELL_TOLERANCE};
use crate::error::Result;
use crate::hlr::SvgSerializer;
use crate::merge::merge_documents_with_progress;
use crate::settings::DrawSettings;
use crate::tree::ElementTreeBuilder;

/// Progress notifications emitted while the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Geometry of model `index` is `percent` resolved
    File { index: usize, percent: f64 },
    /// Hidden-line rendering of all drawing planes started
    HiddenLine,
    /// Cell reconstruction started for projection group `index`
    Cells { index: usize },
    /// Cell `path` of projection group `group` is being classified
    Classify { group: usize, path: usize },
}

/// Run the full pipeline over the given models.
///
/// Settings are validated before any model is touched, so a configuration
/// error never produces partial output. Storey elevations for automatic
/// floorplans are taken from the first model.
pub fn draw(
    settings: &DrawSettings,
    models: &[Model],
    mut progress: impl FnMut(Progress),
) -> Result<Vec<u8>> {
    settings.validate()?;

    let cache = if settings.cache {
        Some(GeometryCache::open(&settings.cache_dir)?)
    } else {
        None
    };

    let mut serializer = SvgSerializer::new(settings.clone())?;
    if let Some(first) = models.first() {
        serializer.set_storeys(first.storey_elevations());
    }

    let mut builder = ElementTreeBuilder::new();
    for (index, model) in models.iter().enumerate() {
        let mut elements = ElementIterator::new(model, settings, cache.as_ref())?;
        while let Some(element) = elements.next() {
            serializer.write(&element);
            if !element.is_space() {
                builder.add_element(&element);
            }
            progress(Progress::File {
                index,
                percent: elements.progress(),
            });
        }
        if elements.skipped() > 0 {
            tracing::warn!(
                model = %model.name,
                skipped = elements.skipped(),
                "some products had no resolvable geometry"
            );
        }
    }

    progress(Progress::HiddenLine);
    let drawing = serializer.finalize()?;
    if !settings.cells {
        return Ok(drawing.to_ascii_bytes());
    }

    let tree = builder.build();
    let cell_groups: Vec<_> = svg_to_line_segments(&drawing, "projection")
        .iter()
        .enumerate()
        .map(|(index, segments)| {
            progress(Progress::Cells { index });
            line_segments_to_cells(segments, CELL_TOLERANCE)
        })
        .collect();
    tracing::debug!(
        groups = cell_groups.len(),
        cells = cell_groups.iter().map(Vec::len).sum::<usize>(),
        "reconstructed cells"
    );

    let cells = cells_to_svg(&cell_groups);
    let merged = merge_documents_with_progress(&drawing, &cells, &tree, &mut |group, path| {
        progress(Progress::Classify { group, path })
    })?;
    Ok(merged.to_ascii_bytes())
}

/// Write the finished drawing atomically: a crash mid-write never leaves a
/// truncated file at the destination.
pub fn write_output(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifcplot_model::{Model, Placement, Product, Storey, Style, TriMesh};

    fn slab_product() -> Product {
        Product {
            guid: "0h$kzJatj1uu4Kx0mpnkYO".to_string(),
            ifc_type: "IfcSlab".to_string(),
            name: Some("Slab".to_string()),
            storey: Some(0),
            placement: Placement::identity(),
            mesh: TriMesh {
                vertices: vec![
                    [0.0, 0.0, 0.0],
                    [10.0, 0.0, 0.0],
                    [10.0, 10.0, 0.0],
                    [0.0, 10.0, 0.0],
                ],
                faces: vec![[0, 1, 2], [0, 2, 3]],
                face_styles: vec![0, 0],
            },
            styles: vec![Style {
                name: "concrete".to_string(),
                diffuse: [0.4, 0.4, 0.4],
                transparency: None,
            }],
        }
    }

    fn slab_model() -> Model {
        Model {
            name: "slab".to_string(),
            unit_scale: 1.0,
            storeys: vec![Storey {
                name: "Ground".to_string(),
                elevation: 0.0,
            }],
            products: vec![slab_product()],
            source: None,
        }
    }

    #[test]
    fn test_empty_model_set_produces_valid_document() {
        let bytes = draw(&DrawSettings::default(), &[], |_| {}).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("</svg>") || text.contains("/>"));
    }

    #[test]
    fn test_slab_floorplan_yields_classified_cell() {
        let mut progressed = false;
        let bytes = draw(&DrawSettings::default(), &[slab_model()], |p| {
            if let Progress::File { percent, .. } = p {
                assert!((0.0..=100.0).contains(&percent));
                progressed = true;
            }
        })
        .unwrap();
        assert!(progressed);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.is_ascii());
        assert!(text.contains("class=\"IfcSlab\""));
        assert!(text.contains("fill: rgb("));
    }

    #[test]
    fn test_progress_reports_every_phase() {
        let mut hidden_line = 0;
        let mut cells = 0;
        let mut classified = Vec::new();
        draw(&DrawSettings::default(), &[slab_model()], |p| match p {
            Progress::File { .. } => {}
            Progress::HiddenLine => hidden_line += 1,
            Progress::Cells { .. } => cells += 1,
            Progress::Classify { group, path } => classified.push((group, path)),
        })
        .unwrap();
        assert_eq!(hidden_line, 1);
        assert_eq!(cells, 1, "one floorplan, one cell reconstruction pass");
        assert!(!classified.is_empty());
        assert_eq!(classified[0], (0, 0));
    }

    #[test]
    fn test_cells_disabled_keeps_hidden_line_output() {
        let settings = DrawSettings {
            cells: false,
            ..DrawSettings::default()
        };
        let bytes = draw(&settings, &[slab_model()], |_| {}).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("class=\"projection\""));
        assert!(!text.contains("ifc:pointInside"));
    }

    #[test]
    fn test_invalid_settings_fail_before_any_work() {
        let settings = DrawSettings {
            storey_heights: "sideways".to_string(),
            ..DrawSettings::default()
        };
        let mut called = false;
        let err = draw(&settings, &[slab_model()], |_| called = true).unwrap_err();
        assert!(err.to_string().contains("storey_heights"));
        assert!(!called);
    }

    #[test]
    fn test_write_output_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.svg");
        fs::write(&path, b"old").unwrap();
        write_output(&path, b"<svg/>").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"<svg/>");
        assert!(!dir.path().join("drawing.svg.partial").exists());
    }
}
