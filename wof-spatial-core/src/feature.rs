//! Read-only view of a decoded feature document.

use std::collections::BTreeMap;

use geo::Coord;

use crate::GeometryShape;

/// Ancestor identifiers keyed by placetype (`"country_id"`, `"region_id"`, ...).
pub type Hierarchy = Vec<BTreeMap<String, i64>>;

/// Typed accessors over a decoded feature.
///
/// Implementations are produced by a decoder; the indexer only reads them.
pub trait Feature {
    /// Feature identifier.
    fn id(&self) -> i64;

    /// Declared geometry type.
    fn geometry_shape(&self) -> GeometryShape;

    /// Geometry object exactly as serialized in the source document.
    fn geometry_text(&self) -> &str;

    /// Label centroid, when the document declares one.
    fn label_centroid(&self) -> Option<Coord<f64>>;

    /// Derived (math) centroid, when the document declares one.
    fn derived_centroid(&self) -> Option<Coord<f64>>;

    /// Placetype name.
    fn placetype(&self) -> &str;

    /// Parent identifier, `-1` when unknown.
    fn parent_id(&self) -> i64;

    /// Repository the feature belongs to.
    fn repo(&self) -> Option<&str>;

    /// Display name.
    fn name(&self) -> &str;

    /// ISO country code.
    fn country(&self) -> &str;

    /// Ancestor hierarchies.
    fn hierarchy(&self) -> &Hierarchy;

    /// Whether the feature is deprecated.
    fn is_deprecated(&self) -> bool;

    /// Whether the feature has been superseded.
    fn is_superseded(&self) -> bool;
}
