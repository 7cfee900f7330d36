//! Region selection and database pool wiring.
//!
//! The two regional deployments share a logical schema but are migrated
//! independently; every regional query goes through the pool selected here.

use sqlx::PgPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    India,
    Usa,
}

impl Region {
    /// Parse a region path segment. Unknown values map to `None`, which
    /// handlers surface as `400 Bad Request`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "india" | "in" => Some(Self::India),
            "usa" | "us" => Some(Self::Usa),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::India => "india",
            Self::Usa => "usa",
        }
    }

    #[must_use]
    pub fn all() -> [Self; 2] {
        [Self::India, Self::Usa]
    }
}

/// One pool per regional database plus the panel database.
#[derive(Clone)]
pub struct RegionPools {
    panel: PgPool,
    india: PgPool,
    usa: PgPool,
}

impl RegionPools {
    #[must_use]
    pub fn new(panel: PgPool, india: PgPool, usa: PgPool) -> Self {
        Self { panel, india, usa }
    }

    #[must_use]
    pub fn panel(&self) -> &PgPool {
        &self.panel
    }

    #[must_use]
    pub fn region(&self, region: Region) -> &PgPool {
        match region {
            Region::India => &self.india,
            Region::Usa => &self.usa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Region;

    #[test]
    fn parse_accepts_known_regions() {
        assert_eq!(Region::parse("india"), Some(Region::India));
        assert_eq!(Region::parse("IN"), Some(Region::India));
        assert_eq!(Region::parse(" usa "), Some(Region::Usa));
        assert_eq!(Region::parse("US"), Some(Region::Usa));
    }

    #[test]
    fn parse_rejects_unknown_regions() {
        assert_eq!(Region::parse("emea"), None);
        assert_eq!(Region::parse(""), None);
    }

    #[test]
    fn as_str_round_trips() {
        for region in Region::all() {
            assert_eq!(Region::parse(region.as_str()), Some(region));
        }
    }
}
