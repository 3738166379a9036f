//! Assembly of [`StoredRecord`]s from decoded features.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use wof_spatial_core::{
    Feature, GeoJsonGeometry, GeometryShape, Hierarchy, Placetype, RecordParts, StoredRecord,
};

use crate::DecodeError;
use crate::indexer::IndexError;

/// How a polygon feature's geometry is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryMode {
    /// The full geometry, promoted to a multi-polygon.
    #[default]
    Default,
    /// The geometry's bounding box.
    #[serde(rename = "bbox")]
    BoundingBox,
    /// No geometry; the centroid only.
    Centroid,
}

impl GeometryMode {
    /// Configuration name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::BoundingBox => "bbox",
            Self::Centroid => "centroid",
        }
    }
}

impl fmt::Display for GeometryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "bbox" => Ok(Self::BoundingBox),
            "centroid" => Ok(Self::Centroid),
            other => Err(format!(
                "unknown geometry mode '{other}' (expected default, bbox or centroid)"
            )),
        }
    }
}

#[derive(Serialize)]
struct Meta<'a> {
    #[serde(rename = "wof:name")]
    name: &'a str,
    #[serde(rename = "wof:country")]
    country: &'a str,
    #[serde(rename = "wof:hierarchy")]
    hierarchy: &'a Hierarchy,
    #[serde(rename = "wof:repo")]
    repo: &'a str,
}

/// Hex MD5 digest of a serialized geometry.
#[must_use]
pub fn geometry_hash(geometry: &str) -> String {
    let digest = Md5::digest(geometry.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn invalid_geometry(id: i64, source: wof_spatial_core::GeometryError) -> IndexError {
    IndexError::Geometry { id, source }
}

/// Parse a stored geometry and make sure every position converts, so the
/// store's spatial predicate can read it back.
fn parse_checked(id: i64, text: &str) -> Result<GeoJsonGeometry, IndexError> {
    let geometry = GeoJsonGeometry::parse(text).map_err(|source| invalid_geometry(id, source))?;
    geometry
        .to_geo()
        .map_err(|source| invalid_geometry(id, source))?;
    Ok(geometry)
}

fn spatial_columns<F: Feature>(
    feature: &F,
    mode: GeometryMode,
) -> Result<(String, String), IndexError> {
    let id = feature.id();
    match feature.geometry_shape() {
        GeometryShape::Point => {
            let point = parse_checked(id, feature.geometry_text())?
                .to_json()
                .map_err(|source| invalid_geometry(id, source))?;
            Ok((String::new(), point))
        }
        GeometryShape::Polygon | GeometryShape::MultiPolygon => {
            let geometry = parse_checked(id, feature.geometry_text())?.into_multi();
            let centroid = match feature.label_centroid().or_else(|| feature.derived_centroid()) {
                Some(coord) => coord,
                None => geometry
                    .centroid()
                    .map_err(|source| invalid_geometry(id, source))?,
            };
            let centroid = GeoJsonGeometry::point(centroid)
                .to_json()
                .map_err(|source| invalid_geometry(id, source))?;
            let stored = match mode {
                GeometryMode::Default => Some(geometry),
                GeometryMode::BoundingBox => Some(
                    geometry
                        .bounding_box()
                        .map_err(|source| invalid_geometry(id, source))?,
                ),
                GeometryMode::Centroid => None,
            };
            let text = stored
                .map(|geometry| geometry.to_json())
                .transpose()
                .map_err(|source| invalid_geometry(id, source))?
                .unwrap_or_default();
            Ok((text, centroid))
        }
        other => Err(IndexError::Decode(DecodeError::UnsupportedShape {
            id,
            shape: other.as_str().to_owned(),
        })),
    }
}

/// Build the stored form of `feature`.
///
/// `lastmod` is the write timestamp in unix seconds.
pub fn assemble_record<F: Feature>(
    feature: &F,
    mode: GeometryMode,
    lastmod: i64,
) -> Result<StoredRecord, IndexError> {
    let id = feature.id();
    let placetype = Placetype::by_name(feature.placetype())
        .map_err(|source| IndexError::UnknownPlacetype { id, source })?;
    let repo = feature.repo().ok_or(IndexError::MissingRequiredField {
        field: "wof:repo",
        id,
    })?;
    let meta = serde_json::to_string(&Meta {
        name: feature.name(),
        country: feature.country(),
        hierarchy: feature.hierarchy(),
        repo,
    })
    .map_err(|source| IndexError::SerializeMeta { id, source })?;
    let (geometry, centroid) = spatial_columns(feature, mode)?;
    StoredRecord::new(RecordParts {
        id,
        parent_id: feature.parent_id(),
        placetype_id: placetype.id(),
        is_superseded: feature.is_superseded(),
        is_deprecated: feature.is_deprecated(),
        meta,
        geom_hash: geometry_hash(feature.geometry_text()),
        lastmod,
        geometry,
        centroid,
    })
    .map_err(|_| IndexError::MissingRequiredField {
        field: "geometry or centroid",
        id,
    })
}
