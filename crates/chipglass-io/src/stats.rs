use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use chipglass_core::{BBox, Document};

use crate::builder::BuildReport;

/// Load summary handed back to the host next to the document.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub file_name: String,
    pub file_size: usize,
    pub parse_time: Duration,
    pub cell_count: usize,
    pub polygon_count: usize,
    pub top_cells: Vec<String>,
    /// Polygon count per layer, keyed "layer/datatype".
    pub per_layer_polygons: BTreeMap<String, usize>,
    /// Overall AABB in DBU; `None` for a document with no geometry.
    pub bbox: Option<BBox>,
    pub width_um: f64,
    pub height_um: f64,
    pub degenerate_polygons: usize,
    pub unknown_records: usize,
}

impl Statistics {
    pub fn gather(
        doc: &Document,
        report: &BuildReport,
        file_size: usize,
        parse_time: Duration,
    ) -> Self {
        let mut per_layer: BTreeMap<String, usize> = BTreeMap::new();
        for cell in &doc.cells {
            for poly in &cell.polygons {
                *per_layer.entry(poly.layer.to_string()).or_insert(0) += 1;
            }
        }
        Self {
            file_name: doc.file_name.clone(),
            file_size,
            parse_time,
            cell_count: doc.cell_count(),
            polygon_count: doc.polygon_count(),
            top_cells: doc.top_cell_names().iter().map(|s| s.to_string()).collect(),
            per_layer_polygons: per_layer,
            bbox: (!doc.bbox.is_empty()).then_some(doc.bbox),
            width_um: doc.units.dbu_to_um(doc.bbox.width()),
            height_um: doc.units.dbu_to_um(doc.bbox.height()),
            degenerate_polygons: report.degenerate_polygons,
            unknown_records: report.unknown_records,
        }
    }
}
