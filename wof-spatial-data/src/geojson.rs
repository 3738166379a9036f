//! Decoder for Who's On First GeoJSON feature documents.

use geo::Coord;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use wof_spatial_core::{Feature, GeometryShape, Hierarchy};

/// Errors raised while decoding a feature document.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The document is not valid JSON or a property has the wrong type.
    #[error("invalid feature JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required property is absent.
    #[error("feature is missing required property '{property}'")]
    MissingProperty {
        /// Name of the absent property.
        property: &'static str,
    },
    /// The feature has no geometry object.
    #[error("feature {id} has no geometry")]
    MissingGeometry {
        /// Feature identifier.
        id: i64,
    },
    /// The geometry type cannot be indexed.
    #[error("feature {id} has unsupported geometry type '{shape}'")]
    UnsupportedShape {
        /// Feature identifier.
        id: i64,
        /// Declared geometry type.
        shape: String,
    },
    /// A centroid property pair is out of range.
    #[error("feature {id} has invalid {prefix} coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// Feature identifier.
        id: i64,
        /// Property prefix (`lbl` or `geom`).
        prefix: &'static str,
        /// Latitude value.
        latitude: f64,
        /// Longitude value.
        longitude: f64,
    },
}

fn unknown_parent() -> i64 {
    -1
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(rename = "wof:id")]
    id: Option<i64>,
    #[serde(rename = "wof:placetype")]
    placetype: Option<String>,
    #[serde(rename = "wof:parent_id", default = "unknown_parent")]
    parent_id: i64,
    #[serde(rename = "wof:repo")]
    repo: Option<String>,
    #[serde(rename = "wof:name", default)]
    name: String,
    #[serde(rename = "wof:country", default)]
    country: String,
    #[serde(rename = "wof:hierarchy", default)]
    hierarchy: Hierarchy,
    #[serde(rename = "edtf:deprecated")]
    edtf_deprecated: Option<String>,
    #[serde(rename = "mz:is_deprecated")]
    mz_is_deprecated: Option<i64>,
    #[serde(rename = "wof:superseded_by", default)]
    superseded_by: Vec<i64>,
    #[serde(rename = "lbl:latitude")]
    label_latitude: Option<f64>,
    #[serde(rename = "lbl:longitude")]
    label_longitude: Option<f64>,
    #[serde(rename = "geom:latitude")]
    geom_latitude: Option<f64>,
    #[serde(rename = "geom:longitude")]
    geom_longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    id: Option<i64>,
    geometry: Option<Value>,
    #[serde(default)]
    properties: Properties,
}

/// A decoded feature document.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonFeature {
    id: i64,
    shape: GeometryShape,
    geometry: String,
    label_centroid: Option<Coord<f64>>,
    derived_centroid: Option<Coord<f64>>,
    placetype: String,
    parent_id: i64,
    repo: Option<String>,
    name: String,
    country: String,
    hierarchy: Hierarchy,
    is_deprecated: bool,
    is_superseded: bool,
}

fn coordinate_pair(
    id: i64,
    prefix: &'static str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coord<f64>>, DecodeError> {
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Ok(Some(Coord {
            x: longitude,
            y: latitude,
        }))
    } else {
        Err(DecodeError::InvalidCoordinates {
            id,
            prefix,
            latitude,
            longitude,
        })
    }
}

fn deprecated(properties: &Properties) -> bool {
    let edtf = properties
        .edtf_deprecated
        .as_deref()
        .is_some_and(|date| !date.is_empty() && date != "uuuu");
    edtf || properties.mz_is_deprecated == Some(1)
}

impl GeoJsonFeature {
    /// Decode a GeoJSON `Feature` document.
    ///
    /// # Examples
    ///
    /// ```
    /// use wof_spatial_core::{Feature, GeometryShape};
    /// use wof_spatial_data::GeoJsonFeature;
    ///
    /// let body = br#"{"type":"Feature","properties":{"wof:id":1,"wof:placetype":"locality"},
    ///     "geometry":{"type":"Point","coordinates":[-122.4,37.7]}}"#;
    /// let feature = GeoJsonFeature::decode(body).expect("valid feature");
    /// assert_eq!(feature.geometry_shape(), GeometryShape::Point);
    /// ```
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawFeature = serde_json::from_slice(body)?;
        let properties = raw.properties;
        let id = properties
            .id
            .or(raw.id)
            .ok_or(DecodeError::MissingProperty { property: "wof:id" })?;
        let geometry = raw
            .geometry
            .filter(|value| !value.is_null())
            .ok_or(DecodeError::MissingGeometry { id })?;
        let shape_name = geometry
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let shape = GeometryShape::from_type(shape_name).map_err(|_| {
            DecodeError::UnsupportedShape {
                id,
                shape: shape_name.to_owned(),
            }
        })?;
        let placetype = properties
            .placetype
            .clone()
            .ok_or(DecodeError::MissingProperty {
                property: "wof:placetype",
            })?;
        let label_centroid = coordinate_pair(
            id,
            "lbl",
            properties.label_latitude,
            properties.label_longitude,
        )?;
        let derived_centroid = coordinate_pair(
            id,
            "geom",
            properties.geom_latitude,
            properties.geom_longitude,
        )?;
        let is_deprecated = deprecated(&properties);
        Ok(Self {
            id,
            shape,
            geometry: serde_json::to_string(&geometry)?,
            label_centroid,
            derived_centroid,
            placetype,
            parent_id: properties.parent_id,
            repo: properties.repo.filter(|repo| !repo.is_empty()),
            name: properties.name,
            country: properties.country,
            hierarchy: properties.hierarchy,
            is_deprecated,
            is_superseded: !properties.superseded_by.is_empty(),
        })
    }
}

impl Feature for GeoJsonFeature {
    fn id(&self) -> i64 {
        self.id
    }

    fn geometry_shape(&self) -> GeometryShape {
        self.shape
    }

    fn geometry_text(&self) -> &str {
        &self.geometry
    }

    fn label_centroid(&self) -> Option<Coord<f64>> {
        self.label_centroid
    }

    fn derived_centroid(&self) -> Option<Coord<f64>> {
        self.derived_centroid
    }

    fn placetype(&self) -> &str {
        &self.placetype
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }

    fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn country(&self) -> &str {
        &self.country
    }

    fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    fn is_deprecated(&self) -> bool {
        self.is_deprecated
    }

    fn is_superseded(&self) -> bool {
        self.is_superseded
    }
}
