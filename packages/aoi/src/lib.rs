#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area-of-interest (AOI) preparation for warehouse queries.
//!
//! The warehouse has no spatial index and a hard limit on query size, so an
//! AOI goes through a small pipeline before it can be used in a query:
//!
//! 1. [`bbox::generate_bbox_filter`] builds an expanded latitude/longitude
//!    range that cheaply discards most records before the exact test.
//! 2. [`expression::to_query_expression`] encodes the dissolved AOI as WKT
//!    and as WKB hex and keeps whichever SQL expression is smaller, provided
//!    one fits the [`QueryExpressionBudget`].
//! 3. [`simplify::simplify_to_size`] reduces vertices with a quadratically
//!    growing tolerance (metres, on the Conus Albers plane) until the AOI's
//!    plain serialization fits a [`PlainSerializationBudget`].
//! 4. [`prepare::prepare_aoi_for_query`] is the entry point report code calls
//!    before building a query.
//!
//! Everything here is synchronous and pure apart from `log` output.
//!
//! [`QueryExpressionBudget`]: riverscapes_aoi_models::QueryExpressionBudget
//! [`PlainSerializationBudget`]: riverscapes_aoi_models::PlainSerializationBudget

pub mod aoi;
pub mod bbox;
pub mod config;
pub mod expression;
pub mod prepare;
pub mod projection;
pub mod simplify;
mod topology;

pub use aoi::{AreaOfInterest, UnionedGeometry};
pub use expression::{EncodingChoice, QueryGeometryExpression};
pub use prepare::{ProjectBounds, prepare_aoi_for_query};
pub use simplify::{SimplifyOptions, simplify_to_size};

use thiserror::Error;

/// Errors that can occur while loading or preparing an AOI.
///
/// A geometry that is simply too large for its budget is *not* an error; it
/// is reported through [`QueryGeometryExpression::TooLarge`] or an
/// unsuccessful [`SimplificationResultMeta`].
///
/// [`SimplificationResultMeta`]: riverscapes_aoi_models::SimplificationResultMeta
#[derive(Debug, Error)]
pub enum AoiError {
    /// The AOI has no polygon with any coordinates.
    #[error("AOI contains no polygon geometry")]
    EmptyAoi,

    /// The AOI contains a geometry that is not a polygon or multipolygon.
    #[error("Unsupported AOI geometry type: {kind}")]
    UnsupportedGeometry {
        /// Geometry type that was found.
        kind: String,
    },

    /// The AOI declares a coordinate reference system other than WGS84.
    #[error("Unsupported coordinate reference system: {name}")]
    UnsupportedCrs {
        /// CRS name as declared in the input.
        name: String,
    },

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WKB encoding failed.
    #[error("WKB encoding error: {message}")]
    Wkb {
        /// Description of what went wrong.
        message: String,
    },

    /// A coordinate could not be projected.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },

    /// A configuration value is out of range or unparsable.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}
