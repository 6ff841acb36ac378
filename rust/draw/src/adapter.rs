// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry iteration adapter
//!
//! Lazily resolves model products into world-space, unit-scaled
//! [`ResolvedElement`]s: entity type filters are applied, placements and unit
//! scale baked in, and degenerate products skipped and counted. One iterator
//! per model per pass; `progress()` reports percent processed for external
//! progress reporting.
//!
//! An optional [`GeometryCache`] (one per export run) short-circuits
//! resolution: cache keys cover the model document and every setting that
//! influences resolution, so a hit replays the previous run's elements.

use crate::error::{Error, Result};
use crate::plane::Bounds;
use crate::settings::DrawSettings;
use ifcplot_model::{Model, Point3, Product, Style};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// One model element: an IFC product with resolved, placed geometry.
/// Immutable once produced; coordinates are world-space metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    pub guid: String,
    pub ifc_type: String,
    pub name: Option<String>,
    pub storey: Option<usize>,
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub face_styles: Vec<u32>,
    pub styles: Vec<Style>,
}

impl ResolvedElement {
    /// Spaces are drawn but never spatially indexed: indexing them would
    /// make every cell inside a room classify as the room volume itself.
    pub fn is_space(&self) -> bool {
        self.ifc_type.eq_ignore_ascii_case("IfcSpace")
    }

    pub fn point(&self, index: u32) -> Point3<f64> {
        let v = self.vertices[index as usize];
        Point3::new(v[0], v[1], v[2])
    }

    /// Corner points of one triangle
    pub fn triangle(&self, face: usize) -> [Point3<f64>; 3] {
        let f = self.faces[face];
        [self.point(f[0]), self.point(f[1]), self.point(f[2])]
    }

    /// World-space bounds of the element
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        for v in &self.vertices {
            bounds.extend(&Point3::new(v[0], v[1], v[2]));
        }
        bounds
    }
}

/// Explicit context object for the on-disk geometry cache
#[derive(Debug, Clone)]
pub struct GeometryCache {
    dir: PathBuf,
}

impl GeometryCache {
    /// Open (creating if needed) a cache directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Cache key covering the model document and resolution settings
    pub fn key(model: &Model, settings: &DrawSettings) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(model).map_err(|e| Error::Cache(e.to_string()))?);
        hasher.update(serde_json::to_vec(settings).map_err(|e| Error::Cache(e.to_string()))?);
        if let Some(source) = &model.source {
            hasher.update(source.to_string_lossy().as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Fetch cached elements, `None` on miss
    pub fn get(&self, key: &str) -> Result<Option<Vec<ResolvedElement>>> {
        match cacache::read_sync(&self.dir, key) {
            Ok(data) => {
                let elements = serde_json::from_slice(&data)?;
                Ok(Some(elements))
            }
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store resolved elements for a key
    pub fn put(&self, key: &str, elements: &[ResolvedElement]) -> Result<()> {
        let data = serde_json::to_vec(elements)?;
        cacache::write_sync(&self.dir, key, &data)?;
        tracing::debug!(key = %key, size = data.len(), "cached resolved geometry");
        Ok(())
    }
}

enum Source<'a> {
    /// Lazy resolution straight from the model
    Model(std::slice::Iter<'a, Product>),
    /// Replay of a cache hit
    Cached(std::vec::IntoIter<ResolvedElement>),
}

/// Lazy, restartable-per-model element iterator
pub struct ElementIterator<'a> {
    model: &'a Model,
    include: Vec<String>,
    exclude: Vec<String>,
    weld: bool,
    total: usize,
    processed: usize,
    skipped: usize,
    source: Source<'a>,
    /// Elements produced on a cache miss, written back on exhaustion
    pending_cache: Option<(&'a GeometryCache, String, Vec<ResolvedElement>)>,
}

impl<'a> ElementIterator<'a> {
    /// Create an iterator over one model.
    ///
    /// When `cache` is given, a hit replays the cached elements; a miss
    /// resolves lazily and writes the full element list once exhausted.
    pub fn new(
        model: &'a Model,
        settings: &DrawSettings,
        cache: Option<&'a GeometryCache>,
    ) -> Result<Self> {
        let include = settings.include_list();
        let exclude = settings.exclude_list();
        // A replay iterates the cached elements, not the raw products, so
        // its progress denominator is the cached count
        let mut total = model.products.len();

        let (source, pending_cache) = match cache {
            Some(cache) => {
                let key = GeometryCache::key(model, settings)?;
                match cache.get(&key)? {
                    Some(elements) => {
                        tracing::debug!(model = %model.name, "geometry cache hit");
                        total = elements.len();
                        (Source::Cached(elements.into_iter()), None)
                    }
                    None => (
                        Source::Model(model.products.iter()),
                        Some((cache, key, Vec::new())),
                    ),
                }
            }
            None => (Source::Model(model.products.iter()), None),
        };

        Ok(Self {
            model,
            include,
            exclude,
            weld: settings.subtract_before_hlr,
            total,
            processed: 0,
            skipped: 0,
            source,
            pending_cache,
        })
    }

    /// Percent of products processed so far
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }

    /// Products skipped because their geometry failed to resolve
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn type_selected(&self, ifc_type: &str) -> bool {
        if !self.include.is_empty() {
            self.include.iter().any(|t| t.eq_ignore_ascii_case(ifc_type))
        } else {
            !self.exclude.iter().any(|t| t.eq_ignore_ascii_case(ifc_type))
        }
    }

    fn resolve(&self, product: &Product) -> std::result::Result<ResolvedElement, String> {
        if product.mesh.is_empty() {
            return Err("empty mesh".to_string());
        }
        product.mesh.validate(product.styles.len())?;

        let scale = self.model.unit_scale;
        let vertices: Vec<[f64; 3]> = product
            .mesh
            .vertices
            .iter()
            .map(|&v| {
                let p = product.placement.transform_point(v);
                [p.x * scale, p.y * scale, p.z * scale]
            })
            .collect();

        let mut element = ResolvedElement {
            guid: product.guid.clone(),
            ifc_type: product.ifc_type.clone(),
            name: product.name.clone(),
            storey: product.storey,
            vertices,
            faces: product.mesh.faces.clone(),
            face_styles: product.mesh.face_styles.clone(),
            styles: product.styles.clone(),
        };
        if self.weld {
            weld_vertices(&mut element);
        }
        Ok(element)
    }
}

impl<'a> Iterator for ElementIterator<'a> {
    type Item = ResolvedElement;

    fn next(&mut self) -> Option<ResolvedElement> {
        loop {
            match &mut self.source {
                Source::Cached(iter) => {
                    match iter.next() {
                        Some(element) => {
                            self.processed += 1;
                            return Some(element);
                        }
                        None => return None,
                    }
                }
                Source::Model(products) => {
                    let Some(product) = products.next() else {
                        // Exhausted: persist the run for the next export
                        if let Some((cache, key, elements)) = self.pending_cache.take() {
                            if let Err(e) = cache.put(&key, &elements) {
                                tracing::warn!(error = %e, "failed to write geometry cache");
                            }
                        }
                        return None;
                    };
                    self.processed += 1;
                    if !self.type_selected(&product.ifc_type) {
                        continue;
                    }
                    match self.resolve(product) {
                        Ok(element) => {
                            if let Some((_, _, elements)) = &mut self.pending_cache {
                                elements.push(element.clone());
                            }
                            return Some(element);
                        }
                        Err(reason) => {
                            self.skipped += 1;
                            tracing::warn!(
                                guid = %product.guid,
                                ifc_type = %product.ifc_type,
                                reason = %reason,
                                "skipping element with unresolvable geometry"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Merge coincident vertices so shells become topologically closed.
/// Required before hidden-line removal on non-manifold input, where
/// duplicated vertices would otherwise produce spurious boundary edges.
fn weld_vertices(element: &mut ResolvedElement) {
    let mut remap = Vec::with_capacity(element.vertices.len());
    let mut seen: FxHashMap<[u64; 3], u32> = FxHashMap::default();
    let mut welded = Vec::with_capacity(element.vertices.len());

    for v in &element.vertices {
        let bits = [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()];
        let index = *seen.entry(bits).or_insert_with(|| {
            welded.push(*v);
            (welded.len() - 1) as u32
        });
        remap.push(index);
    }

    for face in &mut element.faces {
        for i in face.iter_mut() {
            *i = remap[*i as usize];
        }
    }
    element.vertices = welded;
}
