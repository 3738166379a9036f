//! Who's On First placetype registry.
//!
//! Placetype names found in feature documents and on the command line are
//! resolved to the numeric identifiers stored in the `placetype_id` column.

use std::fmt;

use thiserror::Error;

/// Errors raised by placetype lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacetypeError {
    /// The name is not a registered placetype.
    #[error("unknown placetype '{0}'")]
    Unknown(String),
}

/// A named placetype and its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placetype {
    name: &'static str,
    id: i64,
}

const REGISTRY: &[Placetype] = &[
    Placetype::new("continent", 102_312_305),
    Placetype::new("country", 102_312_307),
    Placetype::new("region", 102_312_309),
    Placetype::new("county", 102_312_313),
    Placetype::new("locality", 102_312_317),
    Placetype::new("neighbourhood", 102_312_319),
    Placetype::new("microhood", 102_312_321),
    Placetype::new("postalcode", 102_312_323),
    Placetype::new("venue", 102_312_325),
    Placetype::new("address", 102_312_327),
    Placetype::new("building", 102_312_329),
    Placetype::new("campus", 102_312_331),
    Placetype::new("dependency", 102_322_039),
    Placetype::new("disputed", 102_322_043),
    Placetype::new("empire", 136_057_795),
    Placetype::new("localadmin", 404_221_409),
    Placetype::new("macroregion", 404_227_475),
    Placetype::new("macrocounty", 404_227_483),
    Placetype::new("ocean", 404_528_709),
    Placetype::new("marinearea", 404_528_711),
    Placetype::new("borough", 421_205_765),
    Placetype::new("macrohood", 1_108_906_905),
];

impl Placetype {
    const fn new(name: &'static str, id: i64) -> Self {
        Self { name, id }
    }

    /// Look up a placetype by name (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use wof_spatial_core::Placetype;
    ///
    /// let country = Placetype::by_name("Country").expect("registered");
    /// assert_eq!(country.id(), 102_312_307);
    /// ```
    pub fn by_name(name: &str) -> Result<Self, PlacetypeError> {
        let wanted = name.trim();
        REGISTRY
            .iter()
            .find(|placetype| placetype.name.eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| PlacetypeError::Unknown(wanted.to_owned()))
    }

    /// Look up a placetype by identifier.
    #[must_use]
    pub fn by_id(id: i64) -> Option<Self> {
        REGISTRY.iter().find(|placetype| placetype.id == id).copied()
    }

    /// Every registered placetype.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        REGISTRY
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }

    /// Numeric identifier.
    #[must_use]
    pub const fn id(self) -> i64 {
        self.id
    }
}

impl fmt::Display for Placetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
