//! DXF to layout-document converter.
//!
//! A thin pass over the `dxf` crate's entity list: closed polylines become
//! polygons, circles become 32-gons, arcs become 16-segment fans, solids
//! and 3D faces come straight from their corner lists. Every DXF layer
//! name maps to a distinct `(layer, 0)` with a color hashed from the name.
//! Everything lands in one synthesized top cell; DXF has no hierarchy the
//! viewer cares about.

use std::collections::HashMap;

use dxf::entities::EntityType;
use dxf::Drawing;

use chipglass_core::{layer, Cell, Document, LayerKey, Point, Polygon, Units};

use crate::builder::{finalize_document, BuildReport};
use crate::error::{LoadError, LoadWarning};

/// 1 DBU = 1 nm; one DXF drawing unit is taken as 1 mm.
const DXF_UNITS: Units = Units {
    dbu_in_user: 1e-6,
    dbu_in_m: 1e-9,
};

/// Drawing units (mm) to DBU (nm).
const MM_TO_DBU: f64 = 1e6;

const CIRCLE_SEGMENTS: usize = 32;
const ARC_SEGMENTS: usize = 16;

pub fn build_dxf(
    bytes: &[u8],
    file_name: &str,
) -> Result<(Document, BuildReport), LoadError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let drawing = Drawing::load(&mut cursor).map_err(|e| LoadError::Dxf {
        message: e.to_string(),
    })?;

    let mut doc = Document::new(file_name);
    doc.units = DXF_UNITS;
    let mut report = BuildReport::default();

    let top_name = top_cell_name(file_name);
    let mut cell = Cell::new(&top_name);
    let mut layer_keys: HashMap<String, LayerKey> = HashMap::new();

    for entity in drawing.entities() {
        let points = match entity.specific {
            EntityType::LwPolyline(ref lwp) => lwp
                .vertices
                .iter()
                .map(|v| to_dbu(v.x, v.y))
                .collect::<Vec<Point>>(),
            EntityType::Polyline(ref pl) => pl
                .vertices()
                .map(|v| to_dbu(v.location.x, v.location.y))
                .collect(),
            EntityType::Circle(ref c) => regular_polygon(
                c.center.x,
                c.center.y,
                c.radius,
                0.0,
                360.0,
                CIRCLE_SEGMENTS,
                false,
            ),
            EntityType::Arc(ref a) => regular_polygon(
                a.center.x,
                a.center.y,
                a.radius,
                a.start_angle,
                (a.end_angle - a.start_angle).rem_euclid(360.0),
                ARC_SEGMENTS,
                true,
            ),
            EntityType::Solid(ref s) => vec![
                to_dbu(s.first_corner.x, s.first_corner.y),
                to_dbu(s.second_corner.x, s.second_corner.y),
                to_dbu(s.fourth_corner.x, s.fourth_corner.y),
                to_dbu(s.third_corner.x, s.third_corner.y),
            ],
            EntityType::Face3D(ref f) => vec![
                to_dbu(f.first_corner.x, f.first_corner.y),
                to_dbu(f.second_corner.x, f.second_corner.y),
                to_dbu(f.fourth_corner.x, f.fourth_corner.y),
                to_dbu(f.third_corner.x, f.third_corner.y),
            ],
            // LINE has no area; skipped rather than widened.
            EntityType::Line(_) => continue,
            _ => continue,
        };

        let key = layer_key_for(&mut doc, &mut layer_keys, &entity.common.layer);
        push_polygon(&mut cell, &mut report, key, points);
    }

    log::info!(
        "DXF {:?}: {} polygons on {} layers",
        file_name,
        cell.polygons.len(),
        doc.layers.len()
    );
    doc.add_cell(cell);
    finalize_document(&mut doc)?;
    Ok((doc, report))
}

fn top_cell_name(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("DRAWING")
        .to_string()
}

fn to_dbu(x: f64, y: f64) -> Point {
    let clamp = |v: f64| (v * MM_TO_DBU).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    Point::new(clamp(x), clamp(y))
}

fn regular_polygon(
    cx: f64,
    cy: f64,
    radius: f64,
    start_deg: f64,
    sweep_deg: f64,
    segments: usize,
    open: bool,
) -> Vec<Point> {
    // A closed shape reuses vertex 0; an arc fan needs the endpoint too.
    let vertex_count = if open { segments + 1 } else { segments };
    let step = sweep_deg / segments as f64;
    (0..vertex_count)
        .map(|i| {
            let a = (start_deg + step * i as f64).to_radians();
            to_dbu(cx + radius * a.cos(), cy + radius * a.sin())
        })
        .collect()
}

fn layer_key_for(
    doc: &mut Document,
    seen: &mut HashMap<String, LayerKey>,
    name: &str,
) -> LayerKey {
    if let Some(&key) = seen.get(name) {
        return key;
    }
    let key = LayerKey::new(seen.len() as u16, 0);
    seen.insert(name.to_string(), key);
    let def = doc.layers.ensure(key);
    def.name = Some(name.to_string());
    def.color = layer::color_from_name(name);
    key
}

fn push_polygon(
    cell: &mut Cell,
    report: &mut BuildReport,
    key: LayerKey,
    mut points: Vec<Point>,
) {
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let distinct: std::collections::HashSet<Point> = points.iter().copied().collect();
    if distinct.len() < 3 {
        report.degenerate_polygons += 1;
        report.warnings.push(LoadWarning::DegeneratePolygon {
            cell: cell.name.clone(),
            distinct: distinct.len(),
        });
        return;
    }
    cell.polygons.push(Polygon::new(key, points));
}
