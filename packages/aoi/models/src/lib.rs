#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area-of-interest (AOI) query preparation types.
//!
//! These types describe the results of preparing a user-supplied AOI for a
//! warehouse query: the coarse bounding-box pre-filter, the byte budgets the
//! serialized geometry must fit in, and the record of any simplification that
//! was needed to get there. They carry no geometry themselves.

use serde::{Deserialize, Serialize};

/// Margin, in decimal degrees, added to every side of the AOI extent when
/// building the latitude/longitude pre-filter.
///
/// Measured as the largest distance between a record's representative point
/// and the corners of its own footprint's bounding box in the source data.
pub const BBOX_MARGIN_DEGREES: f64 = 0.47;

/// Decimal places kept in bounding-box coordinates (about 10 cm).
pub const BBOX_DECIMALS: i32 = 6;

/// Hard limit on the size of a single warehouse query, in bytes.
pub const BACKEND_QUERY_LIMIT_BYTES: usize = 262_144;

/// Starting simplification tolerance in metres.
pub const DEFAULT_START_TOLERANCE_M: f64 = 5.0;

/// Default attempt ceiling for [`PlainSerializationBudget`] simplification.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default attempt ceiling used when preparing an AOI for a query.
pub const DEFAULT_PREPARE_MAX_ATTEMPTS: u32 = 5;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_EPSG: u32 = 4326;

/// Budget for a geometry embedded in SQL (`ST_GeometryFromText('...')` and
/// friends), including the wrapping function call.
///
/// The default leaves roughly 5 KB of the backend limit for the rest of the
/// statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryExpressionBudget(pub usize);

impl QueryExpressionBudget {
    /// 261 000 bytes.
    pub const DEFAULT: Self = Self(261_000);

    /// Budget in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl Default for QueryExpressionBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Budget for the AOI's plain serialization (GeoJSON text or WKB hex),
/// without any SQL wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlainSerializationBudget(pub usize);

impl PlainSerializationBudget {
    /// Budget used when the AOI is going to be embedded in a query.
    pub const QUERY_EMBEDDING: Self = Self(261_000);

    /// Budget for project bounds handed to the project catalog, which
    /// accepts "well under 500 KB".
    pub const PROJECT_BOUNDS: Self = Self(300_000);

    /// Budget in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl Default for PlainSerializationBudget {
    fn default() -> Self {
        Self::QUERY_EMBEDDING
    }
}

/// Plain serialization used to measure an AOI against a
/// [`PlainSerializationBudget`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum SerializationFormat {
    /// UTF-8 length of the AOI as a GeoJSON `FeatureCollection`.
    #[default]
    #[serde(rename = "GeoJSON")]
    #[strum(serialize = "GeoJSON")]
    GeoJson,
    /// Hex-encoded length of every part's WKB.
    #[serde(rename = "WKB")]
    #[strum(serialize = "WKB")]
    Wkb,
}

/// SQL flavour used to wrap an embedded geometry.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum QueryDialect {
    /// Amazon Athena (Presto/Trino geospatial functions).
    #[default]
    Athena,
    /// `DuckDB` with the spatial extension loaded.
    DuckDb,
}

impl QueryDialect {
    /// Function that builds a geometry from WKT text.
    #[must_use]
    pub const fn from_text_fn(self) -> &'static str {
        match self {
            Self::Athena => "ST_GeometryFromText",
            Self::DuckDb => "ST_GeomFromText",
        }
    }

    /// Wraps WKT text in this dialect's constructor call.
    #[must_use]
    pub fn wrap_wkt(self, wkt: &str) -> String {
        format!("{}('{wkt}')", self.from_text_fn())
    }

    /// Wraps a WKB hex string in this dialect's constructor call.
    #[must_use]
    pub fn wrap_wkb_hex(self, hex: &str) -> String {
        match self {
            Self::Athena => format!("ST_GeomFromBinary(from_hex('{hex}'))"),
            Self::DuckDb => format!("ST_GeomFromHEXWKB('{hex}')"),
        }
    }
}

/// Expanded, rounded extent of an AOI used as a scalar-column pre-filter.
///
/// Coordinates are decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Western edge (minimum longitude).
    pub min_lon: f64,
    /// Southern edge (minimum latitude).
    pub min_lat: f64,
    /// Eastern edge (maximum longitude).
    pub max_lon: f64,
    /// Northern edge (maximum latitude).
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a box from `(minx, miny, maxx, maxy)`.
    #[must_use]
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Returns `true` when the box has positive width and height.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.max_lon > self.min_lon && self.max_lat > self.min_lat
    }

    /// The box as `[minx, miny, maxx, maxy]`.
    #[must_use]
    pub const fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// One simplification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplificationAttempt {
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// Tolerance used, in metres on the projected plane.
    pub tolerance_m: f64,
    /// Serialized size after simplification.
    pub size_bytes: usize,
    /// Whether `size_bytes` fit the budget.
    pub success: bool,
}

/// Outcome of bringing an AOI within a [`PlainSerializationBudget`].
///
/// This is what a caller needs to decide whether to warn the user that the
/// extracted data may have reduced geometric precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplificationResultMeta {
    /// Final tolerance in metres (`0.0` when no simplification happened).
    pub tolerance_m: f64,
    /// Whether the returned AOI came out of a simplification attempt.
    pub simplified: bool,
    /// Whether the returned AOI fits the budget.
    pub success: bool,
    /// Final measured size in bytes.
    pub final_size_bytes: usize,
    /// Format the size was measured in.
    pub format: SerializationFormat,
    /// Every attempt made, in order. Empty when the input already fit.
    pub attempts: Vec<SimplificationAttempt>,
}

impl SimplificationResultMeta {
    /// Metadata for an AOI that already fit its budget.
    #[must_use]
    pub const fn unchanged(size_bytes: usize, format: SerializationFormat) -> Self {
        Self {
            tolerance_m: 0.0,
            simplified: false,
            success: true,
            final_size_bytes: size_bytes,
            format,
            attempts: Vec::new(),
        }
    }

    /// The last attempt made, if any.
    #[must_use]
    pub fn last_attempt(&self) -> Option<&SimplificationAttempt> {
        self.attempts.last()
    }
}

/// Tunables for AOI preparation.
///
/// Every field has a default, so a partial TOML file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AoiConfig {
    /// Pre-filter margin in decimal degrees.
    pub bbox_margin_degrees: f64,
    /// Budget for the SQL-embedded geometry expression.
    pub query_expression_budget: QueryExpressionBudget,
    /// Budget for the AOI's plain serialization when preparing a query.
    pub plain_budget: PlainSerializationBudget,
    /// Budget for project-bounds GeoJSON.
    pub project_bounds_budget: PlainSerializationBudget,
    /// First simplification tolerance in metres.
    pub start_tolerance_m: f64,
    /// Attempt ceiling for direct `simplify_to_size` calls.
    pub max_attempts: u32,
    /// Attempt ceiling when preparing an AOI for a query.
    pub prepare_max_attempts: u32,
    /// SQL flavour for embedded geometry.
    pub dialect: QueryDialect,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            bbox_margin_degrees: BBOX_MARGIN_DEGREES,
            query_expression_budget: QueryExpressionBudget::DEFAULT,
            plain_budget: PlainSerializationBudget::QUERY_EMBEDDING,
            project_bounds_budget: PlainSerializationBudget::PROJECT_BOUNDS,
            start_tolerance_m: DEFAULT_START_TOLERANCE_M,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            prepare_max_attempts: DEFAULT_PREPARE_MAX_ATTEMPTS,
            dialect: QueryDialect::Athena,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn budgets_leave_room_for_query_text() {
        assert!(QueryExpressionBudget::DEFAULT.bytes() < BACKEND_QUERY_LIMIT_BYTES);
        assert_eq!(
            BACKEND_QUERY_LIMIT_BYTES - QueryExpressionBudget::DEFAULT.bytes(),
            1_144
        );
        assert!(
            PlainSerializationBudget::PROJECT_BOUNDS > PlainSerializationBudget::QUERY_EMBEDDING
        );
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!(
            SerializationFormat::from_str("geojson").ok(),
            Some(SerializationFormat::GeoJson)
        );
        assert_eq!(
            SerializationFormat::from_str("wkb").ok(),
            Some(SerializationFormat::Wkb)
        );
        assert!(SerializationFormat::from_str("shapefile").is_err());
        assert_eq!(SerializationFormat::Wkb.to_string(), "WKB");
    }

    #[test]
    fn athena_wrapping_overhead() {
        let dialect = QueryDialect::Athena;
        assert_eq!(dialect.wrap_wkt("").len(), 23);
        assert_eq!(dialect.wrap_wkb_hex("").len(), 31);
        assert_eq!(
            dialect.wrap_wkt("POINT(1 2)"),
            "ST_GeometryFromText('POINT(1 2)')"
        );
    }

    #[test]
    fn duckdb_wrapping() {
        assert_eq!(
            QueryDialect::DuckDb.wrap_wkb_hex("0101"),
            "ST_GeomFromHEXWKB('0101')"
        );
        assert_eq!(QueryDialect::from_str("duckdb").ok(), Some(QueryDialect::DuckDb));
    }

    #[test]
    fn bounding_box_validity() {
        assert!(BoundingBox::new(-1.0, -1.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(1.0, -1.0, 1.0, 1.0).is_valid());
        assert_eq!(
            BoundingBox::new(1.0, 2.0, 3.0, 4.0).to_array(),
            [1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: AoiConfig =
            serde_json::from_str(r#"{"start_tolerance_m": 10.0, "dialect": "duckdb"}"#)
                .unwrap();
        assert!((config.start_tolerance_m - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.dialect, QueryDialect::DuckDb);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.query_expression_budget, QueryExpressionBudget::DEFAULT);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let meta = SimplificationResultMeta::unchanged(120, SerializationFormat::GeoJson);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["finalSizeBytes"], 120);
        assert_eq!(json["format"], "GeoJSON");
        assert_eq!(json["simplified"], false);
        assert!(meta.last_attempt().is_none());
    }
}
