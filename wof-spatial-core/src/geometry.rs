//! GeoJSON geometry model.
//!
//! Geometries travel through the engine as serialized GeoJSON strings. This
//! module parses them into [`GeoJsonGeometry`], converts to [`geo`] types for
//! spatial predicates, and derives the alternative representations used by
//! the indexer (multi-polygons, bounding boxes and centroids).

use std::fmt;

use geo::{BoundingRect, Centroid, Coord, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A GeoJSON position (`[x, y]`, optionally followed by extra ordinates).
pub type Position = Vec<f64>;

/// Errors raised while parsing or converting geometries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The text was not a supported GeoJSON geometry.
    #[error("invalid GeoJSON geometry: {0}")]
    Json(#[from] serde_json::Error),
    /// The declared geometry type is not known.
    #[error("unknown geometry type '{0}'")]
    UnknownType(String),
    /// A position had fewer than two ordinates or a non-finite value.
    #[error("invalid coordinate position {0:?}")]
    InvalidPosition(Position),
    /// The geometry has no extent to derive a box or centroid from.
    #[error("geometry is empty")]
    Empty,
}

/// Declared GeoJSON geometry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryShape {
    /// `Point`
    Point,
    /// `MultiPoint`
    MultiPoint,
    /// `LineString`
    LineString,
    /// `MultiLineString`
    MultiLineString,
    /// `Polygon`
    Polygon,
    /// `MultiPolygon`
    MultiPolygon,
    /// `GeometryCollection`
    GeometryCollection,
}

impl GeometryShape {
    /// Resolve a GeoJSON `type` member.
    pub fn from_type(name: &str) -> Result<Self, GeometryError> {
        match name {
            "Point" => Ok(Self::Point),
            "MultiPoint" => Ok(Self::MultiPoint),
            "LineString" => Ok(Self::LineString),
            "MultiLineString" => Ok(Self::MultiLineString),
            "Polygon" => Ok(Self::Polygon),
            "MultiPolygon" => Ok(Self::MultiPolygon),
            "GeometryCollection" => Ok(Self::GeometryCollection),
            other => Err(GeometryError::UnknownType(other.to_owned())),
        }
    }

    /// GeoJSON `type` member for this shape.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

impl fmt::Display for GeometryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed GeoJSON geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeoJsonGeometry {
    /// A single position.
    Point(Position),
    /// Several positions.
    MultiPoint(Vec<Position>),
    /// A path.
    LineString(Vec<Position>),
    /// Several paths.
    MultiLineString(Vec<Vec<Position>>),
    /// An exterior ring followed by interior rings.
    Polygon(Vec<Vec<Position>>),
    /// Several polygons.
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

fn to_coord(position: &[f64]) -> Result<Coord<f64>, GeometryError> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(GeometryError::InvalidPosition(position.to_vec())),
    }
}

fn to_line(positions: &[Position]) -> Result<LineString<f64>, GeometryError> {
    positions
        .iter()
        .map(|position| to_coord(position))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn to_polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>, GeometryError> {
    let mut lines = rings.iter().map(|ring| to_line(ring));
    let exterior = lines.next().transpose()?.unwrap_or_else(|| LineString::new(Vec::new()));
    let interiors = lines.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

impl GeoJsonGeometry {
    /// Parse serialized GeoJSON.
    pub fn parse(text: &str) -> Result<Self, GeometryError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Convert a JSON value holding a geometry object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, GeometryError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Point geometry at `coord`.
    #[must_use]
    pub fn point(coord: Coord<f64>) -> Self {
        Self::Point(vec![coord.x, coord.y])
    }

    /// Declared shape of this geometry.
    #[must_use]
    pub const fn shape(&self) -> GeometryShape {
        match self {
            Self::Point(_) => GeometryShape::Point,
            Self::MultiPoint(_) => GeometryShape::MultiPoint,
            Self::LineString(_) => GeometryShape::LineString,
            Self::MultiLineString(_) => GeometryShape::MultiLineString,
            Self::Polygon(_) => GeometryShape::Polygon,
            Self::MultiPolygon(_) => GeometryShape::MultiPolygon,
        }
    }

    /// Promote single geometries to their multi counterparts.
    #[must_use]
    pub fn into_multi(self) -> Self {
        match self {
            Self::Point(position) => Self::MultiPoint(vec![position]),
            Self::LineString(line) => Self::MultiLineString(vec![line]),
            Self::Polygon(rings) => Self::MultiPolygon(vec![rings]),
            multi => multi,
        }
    }

    /// Convert to a [`geo::Geometry`].
    pub fn to_geo(&self) -> Result<geo::Geometry<f64>, GeometryError> {
        let geometry = match self {
            Self::Point(position) => geo::Geometry::Point(Point(to_coord(position)?)),
            Self::MultiPoint(positions) => geo::Geometry::MultiPoint(
                positions
                    .iter()
                    .map(|position| to_coord(position).map(Point))
                    .collect::<Result<Vec<_>, _>>()?
                    .into(),
            ),
            Self::LineString(positions) => geo::Geometry::LineString(to_line(positions)?),
            Self::MultiLineString(lines) => geo::Geometry::MultiLineString(geo::MultiLineString(
                lines
                    .iter()
                    .map(|line| to_line(line))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Self::Polygon(rings) => geo::Geometry::Polygon(to_polygon(rings)?),
            Self::MultiPolygon(polygons) => geo::Geometry::MultiPolygon(MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| to_polygon(rings))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        };
        Ok(geometry)
    }

    /// Centroid of the geometry.
    pub fn centroid(&self) -> Result<Coord<f64>, GeometryError> {
        self.to_geo()?
            .centroid()
            .map(|point| point.0)
            .ok_or(GeometryError::Empty)
    }

    /// Bounding box of the geometry as a single-polygon multi-polygon.
    pub fn bounding_box(&self) -> Result<Self, GeometryError> {
        let rect = self.to_geo()?.bounding_rect().ok_or(GeometryError::Empty)?;
        let (min, max) = (rect.min(), rect.max());
        let ring = vec![
            vec![min.x, min.y],
            vec![max.x, min.y],
            vec![max.x, max.y],
            vec![min.x, max.y],
            vec![min.x, min.y],
        ];
        Ok(Self::MultiPolygon(vec![vec![ring]]))
    }

    /// Serialize back to GeoJSON text.
    pub fn to_json(&self) -> Result<String, GeometryError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether two serialized geometries intersect.
///
/// Empty inputs never intersect anything.
pub fn intersects_text(left: &str, right: &str) -> Result<bool, GeometryError> {
    use geo::Intersects;

    if left.trim().is_empty() || right.trim().is_empty() {
        return Ok(false);
    }
    let a = GeoJsonGeometry::parse(left)?.to_geo()?;
    let b = GeoJsonGeometry::parse(right)?.to_geo()?;
    Ok(a.intersects(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;

    #[rstest]
    #[case("Point", GeometryShape::Point)]
    #[case("MultiPolygon", GeometryShape::MultiPolygon)]
    #[case("GeometryCollection", GeometryShape::GeometryCollection)]
    fn shapes_resolve_from_type_names(#[case] name: &str, #[case] shape: GeometryShape) {
        assert_eq!(GeometryShape::from_type(name).expect("known type"), shape);
        assert_eq!(shape.as_str(), name);
    }

    #[rstest]
    fn unknown_type_is_rejected() {
        let err = GeometryShape::from_type("Circle").expect_err("unknown type");
        assert!(matches!(err, GeometryError::UnknownType(name) if name == "Circle"));
    }

    #[rstest]
    fn polygon_promotes_to_multi_polygon() {
        let multi = GeoJsonGeometry::parse(SQUARE).expect("parse").into_multi();
        assert_eq!(multi.shape(), GeometryShape::MultiPolygon);
        let json = multi.to_json().expect("serialize");
        assert!(json.starts_with(r#"{"type":"MultiPolygon","coordinates":[[[[0.0,0.0]"#));
    }

    #[rstest]
    fn centroid_of_square_is_its_middle() {
        let centroid = GeoJsonGeometry::parse(SQUARE)
            .expect("parse")
            .centroid()
            .expect("centroid");
        assert!((centroid.x - 1.0).abs() < 1e-9);
        assert!((centroid.y - 1.0).abs() < 1e-9);
    }

    #[rstest]
    fn bounding_box_covers_line() {
        let line = GeoJsonGeometry::LineString(vec![vec![-1.0, 3.0], vec![4.0, -2.0]]);
        let bbox = line.bounding_box().expect("bbox");
        assert_eq!(
            bbox,
            GeoJsonGeometry::MultiPolygon(vec![vec![vec![
                vec![-1.0, -2.0],
                vec![4.0, -2.0],
                vec![4.0, 3.0],
                vec![-1.0, 3.0],
                vec![-1.0, -2.0],
            ]]])
        );
    }

    #[rstest]
    #[case(r#"{"type":"Point","coordinates":[1,1]}"#, true)]
    #[case(r#"{"type":"Point","coordinates":[5,5]}"#, false)]
    #[case("", false)]
    fn intersects_evaluates_point_in_polygon(#[case] other: &str, #[case] expected: bool) {
        assert_eq!(intersects_text(SQUARE, other).expect("valid input"), expected);
    }

    #[rstest]
    fn short_positions_are_invalid() {
        let geometry = GeoJsonGeometry::Point(vec![1.0]);
        assert!(matches!(
            geometry.to_geo(),
            Err(GeometryError::InvalidPosition(_))
        ));
    }
}
