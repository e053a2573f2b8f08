//! DXF conversion tests. Fixtures are authored with the same `dxf` crate
//! the converter reads with, so the text format details stay out of the way.

use dxf::entities::{Circle, Entity, EntityType, LwPolyline};
use dxf::{Drawing, LwPolylineVertex};

use chipglass_io::{load, LoadOptions};

fn vertex(x: f64, y: f64) -> LwPolylineVertex {
    LwPolylineVertex {
        x,
        y,
        ..Default::default()
    }
}

fn drawing_to_bytes(drawing: &mut Drawing) -> Vec<u8> {
    // LWPOLYLINE requires R14+; Drawing::new() defaults to R12, which would
    // silently drop these entities on save.
    drawing.header.version = dxf::enums::AcadVersion::R14;
    let mut out = Vec::new();
    drawing.save(&mut out).expect("serialize DXF fixture");
    out
}

#[test]
fn lwpolyline_becomes_polygon() {
    let mut drawing = Drawing::new();
    let mut lwp = LwPolyline::default();
    lwp.vertices = vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(1.0, 1.0), vertex(0.0, 1.0)];
    let mut entity = Entity::new(EntityType::LwPolyline(lwp));
    entity.common.layer = "METAL1".to_string();
    drawing.add_entity(entity);

    let result = load(&drawing_to_bytes(&mut drawing), "square.dxf", &mut LoadOptions::default())
        .unwrap();
    let doc = result.document;
    assert_eq!(doc.cell_count(), 1);
    assert_eq!(doc.top_cell_names(), vec!["square"]);
    assert_eq!(doc.polygon_count(), 1);

    // 1 drawing unit = 1 mm = 1e6 DBU (nm).
    let poly = &doc.cells[0].polygons[0];
    assert_eq!(poly.bbox.max.x, 1e6);
    assert_eq!(poly.bbox.max.y, 1e6);

    // The layer is named after the DXF layer, with a name-hashed color.
    let def = doc.layers.iter().next().unwrap();
    assert_eq!(def.name.as_deref(), Some("METAL1"));
    assert_eq!(def.color, chipglass_core::layer::color_from_name("METAL1"));
}

#[test]
fn circle_becomes_32_gon() {
    let mut drawing = Drawing::new();
    let circle = Circle {
        center: dxf::Point::new(0.0, 0.0, 0.0),
        radius: 2.0,
        ..Default::default()
    };
    drawing.add_entity(Entity::new(EntityType::Circle(circle)));

    let doc = load(&drawing_to_bytes(&mut drawing), "circle.dxf", &mut LoadOptions::default())
        .unwrap()
        .document;
    assert_eq!(doc.polygon_count(), 1);
    let poly = &doc.cells[0].polygons[0];
    assert_eq!(poly.points.len(), 32);
    // Radius 2 mm: the box spans 4e6 DBU.
    assert!((poly.bbox.width() - 4e6).abs() < 2.0);
}

#[test]
fn lines_are_skipped_and_layers_are_distinct() {
    let mut drawing = Drawing::new();
    let line = dxf::entities::Line {
        p1: dxf::Point::new(0.0, 0.0, 0.0),
        p2: dxf::Point::new(5.0, 5.0, 0.0),
        ..Default::default()
    };
    drawing.add_entity(Entity::new(EntityType::Line(line)));
    for (name, y) in [("A", 0.0), ("B", 10.0)] {
        let mut lwp = LwPolyline::default();
        lwp.vertices = vec![vertex(0.0, y), vertex(1.0, y), vertex(1.0, y + 1.0)];
        let mut entity = Entity::new(EntityType::LwPolyline(lwp));
        entity.common.layer = name.to_string();
        drawing.add_entity(entity);
    }

    let doc = load(&drawing_to_bytes(&mut drawing), "mix.dxf", &mut LoadOptions::default())
        .unwrap()
        .document;
    // The line contributes nothing; the two polylines land on two layers.
    assert_eq!(doc.polygon_count(), 2);
    assert_eq!(doc.layers.len(), 2);
    let keys: Vec<_> = doc.layers.iter().map(|d| d.key).collect();
    assert_ne!(keys[0], keys[1]);
}
