//! Wire geometry shared by every record plus the planar operations the
//! overlay needs (validation, clipping, containment, buffer rings).
//!
//! Records carry GeoJSON-shaped values; computation happens on `geo` types.

use geo::{Area, BooleanOps, Buffer, Centroid, Coord, Intersects, Relate};
use geo::{Line, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{
    GEOMETRY_EMPTY, GEOMETRY_INVALID, GEOMETRY_WRONG_KIND, UrbisError, UrbisResult,
};

/// Tolerance used when deciding whether clipping removed any area.
const AREA_EPSILON: f64 = 1e-12;

pub type Position = [f64; 2];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Area,
}

impl GeometryKind {
    fn label(self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Area => "area",
        }
    }
}

/// Which topological kinds a storage slot accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KindRule {
    Any,
    Only(GeometryKind),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point([x, y])
    }

    /// Axis-aligned rectangle as a closed polygon.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Geometry::Polygon(vec![vec![
            [min_x, min_y],
            [max_x, min_y],
            [max_x, max_y],
            [min_x, max_y],
            [min_x, min_y],
        ]])
    }

    pub fn empty() -> Self {
        Geometry::MultiPolygon(Vec::new())
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryKind::Line,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeometryKind::Area,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(_) => false,
            Geometry::MultiPoint(points) => points.is_empty(),
            Geometry::LineString(line) => line.is_empty(),
            Geometry::MultiLineString(lines) => lines.iter().all(Vec::is_empty),
            Geometry::Polygon(rings) => rings.first().is_none_or(Vec::is_empty),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .all(|rings| rings.first().is_none_or(Vec::is_empty)),
        }
    }

    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match self {
            Geometry::Point(p) => geo::Geometry::Point(to_point(p)),
            Geometry::MultiPoint(points) => {
                geo::Geometry::MultiPoint(MultiPoint::new(points.iter().map(to_point).collect()))
            }
            Geometry::LineString(line) => geo::Geometry::LineString(to_line_string(line)),
            Geometry::MultiLineString(lines) => geo::Geometry::MultiLineString(
                MultiLineString::new(lines.iter().map(|l| to_line_string(l)).collect()),
            ),
            Geometry::Polygon(rings) => geo::Geometry::Polygon(to_polygon(rings)),
            Geometry::MultiPolygon(polygons) => geo::Geometry::MultiPolygon(MultiPolygon::new(
                polygons.iter().map(|rings| to_polygon(rings)).collect(),
            )),
        }
    }

    pub fn from_geo(value: &geo::Geometry<f64>) -> UrbisResult<Self> {
        Ok(match value {
            geo::Geometry::Point(p) => Geometry::Point([p.x(), p.y()]),
            geo::Geometry::Line(line) => Geometry::LineString(vec![
                [line.start.x, line.start.y],
                [line.end.x, line.end.y],
            ]),
            geo::Geometry::LineString(line) => Geometry::LineString(from_line_string(line)),
            geo::Geometry::Polygon(polygon) => Geometry::Polygon(from_polygon(polygon)),
            geo::Geometry::MultiPoint(points) => {
                Geometry::MultiPoint(points.iter().map(|p| [p.x(), p.y()]).collect())
            }
            geo::Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.iter().map(from_line_string).collect())
            }
            geo::Geometry::MultiPolygon(polygons) => Geometry::from_multi_polygon(polygons),
            geo::Geometry::Rect(rect) => Geometry::Polygon(from_polygon(&rect.to_polygon())),
            geo::Geometry::Triangle(triangle) => {
                Geometry::Polygon(from_polygon(&triangle.to_polygon()))
            }
            geo::Geometry::GeometryCollection(_) => {
                return Err(UrbisError::invalid_with_code(
                    GEOMETRY_WRONG_KIND,
                    "geometry collections are not supported",
                ));
            }
        })
    }

    /// Single polygons collapse back to `Polygon`; anything else stays multi.
    pub fn from_multi_polygon(value: &MultiPolygon<f64>) -> Self {
        match value.0.as_slice() {
            [single] => Geometry::Polygon(from_polygon(single)),
            many => Geometry::MultiPolygon(many.iter().map(from_polygon).collect()),
        }
    }

    pub fn centroid(&self) -> Option<Geometry> {
        self.to_geo().centroid().map(|p| Geometry::Point([p.x(), p.y()]))
    }

    pub fn area(&self) -> f64 {
        self.to_geo().unsigned_area()
    }

    pub fn to_json(&self) -> UrbisResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> UrbisResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Checks non-emptiness, topological kind, then structural validity.
    pub fn validate(&self, rule: KindRule) -> UrbisResult<()> {
        if self.is_empty() {
            return Err(UrbisError::invalid_with_code(
                GEOMETRY_EMPTY,
                "geometry is empty",
            ));
        }
        if let KindRule::Only(expected) = rule
            && self.kind() != expected
        {
            return Err(UrbisError::invalid_with_code(
                GEOMETRY_WRONG_KIND,
                format!(
                    "expected {} geometry, got {}",
                    expected.label(),
                    self.kind().label()
                ),
            ));
        }
        if let Some(reason) = self.invalid_reason() {
            return Err(UrbisError::invalid_with_code(GEOMETRY_INVALID, reason));
        }
        Ok(())
    }

    fn invalid_reason(&self) -> Option<String> {
        let finite = |p: &Position| p[0].is_finite() && p[1].is_finite();
        match self {
            Geometry::Point(p) => (!finite(p)).then(|| "point has non-finite coordinates".into()),
            Geometry::MultiPoint(points) => (!points.iter().all(finite))
                .then(|| "multipoint has non-finite coordinates".into()),
            Geometry::LineString(line) => line_reason(line),
            Geometry::MultiLineString(lines) => lines.iter().find_map(|l| line_reason(l)),
            Geometry::Polygon(rings) => polygon_reason(rings),
            Geometry::MultiPolygon(polygons) => polygons.iter().find_map(|p| polygon_reason(p)),
        }
    }
}

/// Geometry of a record, falling back to its centre point when absent.
pub fn effective_geometry<'a>(
    geometry: Option<&'a Geometry>,
    centre_point: &'a Geometry,
) -> &'a Geometry {
    geometry.unwrap_or(centre_point)
}

pub fn to_multi_polygon(geometry: &Geometry) -> MultiPolygon<f64> {
    match geometry.to_geo() {
        geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        geo::Geometry::MultiPolygon(polygons) => polygons,
        _ => MultiPolygon::new(Vec::new()),
    }
}

pub fn intersects(geometry: &Geometry, boundary: &MultiPolygon<f64>) -> bool {
    boundary.relate(&geometry.to_geo()).is_intersects()
}

/// True when `geometry` lies entirely inside `boundary` (touching the edge counts as inside).
pub fn within(geometry: &Geometry, boundary: &MultiPolygon<f64>) -> bool {
    match geometry.kind() {
        GeometryKind::Area => {
            let shape = to_multi_polygon(geometry);
            !shape.0.is_empty() && shape.difference(boundary).unsigned_area() <= AREA_EPSILON
        }
        GeometryKind::Point | GeometryKind::Line => {
            boundary.relate(&geometry.to_geo()).is_contains()
        }
    }
}

/// Outcome of clipping a geometry to a boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct Clipped {
    pub geometry: Geometry,
    pub is_cut: bool,
}

/// Intersects `geometry` with `boundary`.
///
/// Areas are intersected polygon-wise, lines are clipped, points are kept or
/// dropped. `is_cut` is set when anything was removed.
pub fn clip_to(geometry: &Geometry, boundary: &MultiPolygon<f64>) -> UrbisResult<Clipped> {
    match geometry.to_geo() {
        geo::Geometry::Polygon(polygon) => clip_area(MultiPolygon::new(vec![polygon]), boundary),
        geo::Geometry::MultiPolygon(polygons) => clip_area(polygons, boundary),
        geo::Geometry::LineString(line) => {
            clip_lines(MultiLineString::new(vec![line]), boundary)
        }
        geo::Geometry::MultiLineString(lines) => clip_lines(lines, boundary),
        geo::Geometry::Point(point) => {
            let inside = boundary.intersects(&point);
            Ok(Clipped {
                geometry: if inside {
                    geometry.clone()
                } else {
                    Geometry::empty()
                },
                is_cut: !inside,
            })
        }
        geo::Geometry::MultiPoint(points) => {
            let total = points.0.len();
            let kept: Vec<Position> = points
                .iter()
                .filter(|p| boundary.intersects(*p))
                .map(|p| [p.x(), p.y()])
                .collect();
            let is_cut = kept.len() != total;
            Ok(Clipped {
                geometry: if kept.is_empty() {
                    Geometry::empty()
                } else {
                    Geometry::MultiPoint(kept)
                },
                is_cut,
            })
        }
        other => Geometry::from_geo(&other).map(|geometry| Clipped {
            geometry,
            is_cut: false,
        }),
    }
}

fn clip_area(shape: MultiPolygon<f64>, boundary: &MultiPolygon<f64>) -> UrbisResult<Clipped> {
    let before = shape.unsigned_area();
    let clipped = shape.intersection(boundary);
    let after = clipped.unsigned_area();
    let geometry = if clipped.0.is_empty() || after <= AREA_EPSILON {
        Geometry::empty()
    } else {
        Geometry::from_multi_polygon(&clipped)
    };
    Ok(Clipped {
        geometry,
        is_cut: before - after > AREA_EPSILON.max(before * 1e-9),
    })
}

fn clip_lines(
    lines: MultiLineString<f64>,
    boundary: &MultiPolygon<f64>,
) -> UrbisResult<Clipped> {
    let before = total_length(&lines);
    let clipped = boundary.clip(&lines, false);
    let after = total_length(&clipped);
    let kept: Vec<Vec<Position>> = clipped
        .iter()
        .filter(|line| line.0.len() >= 2)
        .map(from_line_string)
        .collect();
    let geometry = match kept.len() {
        0 => Geometry::empty(),
        1 => Geometry::LineString(kept.into_iter().next().unwrap_or_default()),
        _ => Geometry::MultiLineString(kept),
    };
    Ok(Clipped {
        geometry,
        is_cut: before - after > 1e-9,
    })
}

fn total_length(lines: &MultiLineString<f64>) -> f64 {
    lines
        .iter()
        .flat_map(|line| line.lines())
        .map(|segment| segment.dx().hypot(segment.dy()))
        .sum()
}

/// Buffer of `radius` around `footprint` with the footprint itself removed.
pub fn buffer_ring(footprint: &Geometry, radius: f64) -> UrbisResult<Geometry> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(UrbisError::invalid(format!(
            "buffer radius must be positive, got {radius}"
        )));
    }
    let shape = footprint.to_geo();
    let disk = shape.buffer(radius);
    let ring = match footprint.kind() {
        GeometryKind::Area => disk.difference(&to_multi_polygon(footprint)),
        GeometryKind::Point | GeometryKind::Line => disk,
    };
    if ring.0.is_empty() {
        return Ok(Geometry::empty());
    }
    Ok(Geometry::from_multi_polygon(&ring))
}

fn to_point(p: &Position) -> Point<f64> {
    Point::new(p[0], p[1])
}

fn to_line_string(line: &[Position]) -> LineString<f64> {
    LineString::new(line.iter().map(|p| Coord { x: p[0], y: p[1] }).collect())
}

fn to_polygon(rings: &[Vec<Position>]) -> Polygon<f64> {
    let mut iter = rings.iter();
    let exterior = iter
        .next()
        .map(|ring| to_line_string(ring))
        .unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, iter.map(|ring| to_line_string(ring)).collect())
}

fn from_line_string(line: &LineString<f64>) -> Vec<Position> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

fn from_polygon(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    let mut rings = vec![from_line_string(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(from_line_string));
    rings
}

fn line_reason(line: &[Position]) -> Option<String> {
    if line.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Some("line has non-finite coordinates".into());
    }
    let distinct = line.windows(2).any(|w| w[0] != w[1]);
    (!distinct).then(|| "line needs at least two distinct positions".into())
}

fn polygon_reason(rings: &[Vec<Position>]) -> Option<String> {
    for (index, ring) in rings.iter().enumerate() {
        if ring.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Some(format!("ring {index} has non-finite coordinates"));
        }
        if ring.len() < 4 {
            return Some(format!("ring {index} needs at least four positions"));
        }
        if ring.first() != ring.last() {
            return Some(format!("ring {index} is not closed"));
        }
        let shape = Polygon::new(to_line_string(ring), Vec::new());
        if shape.unsigned_area() <= AREA_EPSILON {
            return Some(format!("ring {index} has no area"));
        }
        if !ring_is_simple(ring) {
            return Some(format!("ring {index} self-intersects"));
        }
    }
    None
}

fn ring_is_simple(ring: &[Position]) -> bool {
    let segments: Vec<Line<f64>> = ring
        .windows(2)
        .map(|w| Line::new(Coord { x: w[0][0], y: w[0][1] }, Coord { x: w[1][0], y: w[1][1] }))
        .collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 2)..n {
            // first and last segments share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> MultiPolygon<f64> {
        to_multi_polygon(&Geometry::rect(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn wire_shape_is_geojson() {
        let json = serde_json::to_string(&Geometry::point(0.5, 0.25)).expect("serialize");
        assert_eq!(json, r#"{"type":"Point","coordinates":[0.5,0.25]}"#);
        let parsed = Geometry::from_json(
            r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#,
        )
        .expect("parse");
        assert_eq!(parsed.kind(), GeometryKind::Area);
    }

    #[test]
    fn validation_reports_distinct_codes() {
        let err = Geometry::empty().validate(KindRule::Any).unwrap_err();
        assert_eq!(err.code(), Some(GEOMETRY_EMPTY));
        let err = Geometry::point(1.0, 1.0)
            .validate(KindRule::Only(GeometryKind::Area))
            .unwrap_err();
        assert_eq!(err.code(), Some(GEOMETRY_WRONG_KIND));
        let bowtie = Geometry::Polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 1.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 0.0],
        ]]);
        let err = bowtie.validate(KindRule::Any).unwrap_err();
        assert_eq!(err.code(), Some(GEOMETRY_INVALID));
        Geometry::rect(0.0, 0.0, 2.0, 2.0)
            .validate(KindRule::Only(GeometryKind::Area))
            .expect("valid square");
    }

    #[test]
    fn clipping_marks_cut_only_when_area_is_removed() {
        let inside = clip_to(&Geometry::rect(0.2, 0.2, 0.4, 0.4), &unit_square()).expect("clip");
        assert!(!inside.is_cut);
        let crossing = clip_to(&Geometry::rect(0.5, 0.5, 1.5, 1.5), &unit_square()).expect("clip");
        assert!(crossing.is_cut);
        assert!((crossing.geometry.area() - 0.25).abs() < 1e-9);
        assert!(within(&crossing.geometry, &unit_square()));
        let outside = clip_to(&Geometry::rect(2.0, 2.0, 3.0, 3.0), &unit_square()).expect("clip");
        assert!(outside.geometry.is_empty());
        assert!(outside.is_cut);
    }

    #[test]
    fn points_outside_are_dropped() {
        let clipped = clip_to(&Geometry::point(3.0, 3.0), &unit_square()).expect("clip");
        assert!(clipped.geometry.is_empty());
        let kept = clip_to(&Geometry::point(0.5, 0.5), &unit_square()).expect("clip");
        assert_eq!(kept.geometry, Geometry::point(0.5, 0.5));
    }

    #[test]
    fn buffer_ring_excludes_footprint() {
        let footprint = Geometry::rect(0.0, 0.0, 1.0, 1.0);
        let ring = buffer_ring(&footprint, 0.5).expect("ring");
        let ring_shape = to_multi_polygon(&ring);
        assert!(!ring_shape.intersects(&Point::new(0.5, 0.5)));
        assert!(ring_shape.intersects(&Point::new(1.25, 0.5)));
        assert!(buffer_ring(&footprint, 0.0).is_err());
    }

    #[test]
    fn null_geometry_falls_back_to_centre_point() {
        let centre = Geometry::point(1.0, 2.0);
        assert_eq!(effective_geometry(None, &centre), &centre);
    }
}
