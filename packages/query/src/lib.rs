#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! AOI-filtered warehouse queries.
//!
//! The warehouse has no spatial index, so every AOI query has two stages:
//! a cheap range pre-filter on indexed columns inside a CTE, then an exact
//! `ST_Intersects` against the AOI geometry embedded in the SQL text. The
//! embedded geometry must fit the backend's statement limit; when it does
//! not, the AOI is simplified and the expression rebuilt.
//!
//! Running the SQL is left to a [`QueryRunner`] implementation.

pub mod runner;

pub use runner::{AoiQueryResult, QueryOutput, QueryRunner, run_aoi_query};

use riverscapes_aoi::bbox::{generate_bbox_filter_with_margin, generate_bbox_overlap_filter};
use riverscapes_aoi::expression::to_query_expression;
use riverscapes_aoi::{AoiError, AreaOfInterest, QueryGeometryExpression, prepare_aoi_for_query};
use riverscapes_aoi_models::{
    AoiConfig, BBOX_MARGIN_DEGREES, BoundingBox, DEFAULT_PREPARE_MAX_ATTEMPTS,
    PlainSerializationBudget, QueryDialect, QueryExpressionBudget, SimplificationResultMeta,
};
use thiserror::Error;

/// Table queried when none is given.
pub const DEFAULT_SOURCE_TABLE: &str = "raw_rme_pq";

/// Expression that turns a record's stored WKB into a geometry.
pub const DEFAULT_GEOMETRY_FIELD_CLAUSE: &str = "ST_GeomFromBinary(dgo_geom)";

/// Errors that can occur while building or running an AOI query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The AOI could not be loaded, serialized or simplified.
    #[error("AOI error: {0}")]
    Aoi(#[from] AoiError),

    /// Even the simplified AOI is too large to embed in a query.
    #[error(
        "AOI geometry is too large to embed (WKT {wkt_len} / WKB {wkb_len} bytes, budget {budget} bytes)"
    )]
    GeometryTooLarge {
        /// Wrapped WKT length in bytes.
        wkt_len: usize,
        /// Wrapped WKB-hex length in bytes.
        wkb_len: usize,
        /// Expression budget in bytes.
        budget: usize,
    },

    /// The query backend failed or returned nothing usable.
    #[error("Query runner error: {message}")]
    Runner {
        /// Description of what went wrong.
        message: String,
    },
}

/// `WHERE` clause keeping records whose representative point falls inside
/// `bbox`.
#[must_use]
pub fn prefilter_where_clause(bbox: &BoundingBox) -> String {
    format!(
        "WHERE (latitude BETWEEN {} AND {}) AND (longitude BETWEEN {} AND {})",
        bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon
    )
}

/// `WHERE` clause keeping records whose stored bounding box (a struct
/// column with `xmin`, `ymin`, `xmax`, `ymax`) overlaps `bbox`.
#[must_use]
pub fn bbox_overlap_where_clause(bbox: &BoundingBox, bbox_field: &str) -> String {
    format!(
        "WHERE {bbox_field}.xmax >= {} AND {bbox_field}.xmin <= {} AND {bbox_field}.ymax >= {} AND {bbox_field}.ymin <= {}",
        bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
    )
}

/// The SQL for one AOI, ready to hand to a [`QueryRunner`].
#[derive(Debug, Clone, PartialEq)]
pub struct AoiQuery {
    /// Box used by the pre-filter.
    pub bbox: BoundingBox,
    /// `SELECT count(*)` over the pre-filtered records.
    pub count_sql: String,
    /// Pre-filter CTE followed by the exact intersection.
    pub select_sql: String,
    /// Present when the AOI had to be simplified to fit.
    pub simplification: Option<SimplificationResultMeta>,
}

/// Builds [`AoiQuery`]s against one source table.
#[derive(Debug, Clone, PartialEq)]
pub struct AoiQueryBuilder {
    source_table: String,
    fields: String,
    geometry_field_clause: String,
    bbox_field: Option<String>,
    dialect: QueryDialect,
    expression_budget: QueryExpressionBudget,
    plain_budget: PlainSerializationBudget,
    max_attempts: u32,
    bbox_margin_degrees: f64,
}

impl Default for AoiQueryBuilder {
    fn default() -> Self {
        Self {
            source_table: DEFAULT_SOURCE_TABLE.to_string(),
            fields: "*".to_string(),
            geometry_field_clause: DEFAULT_GEOMETRY_FIELD_CLAUSE.to_string(),
            bbox_field: None,
            dialect: QueryDialect::default(),
            expression_budget: QueryExpressionBudget::DEFAULT,
            plain_budget: PlainSerializationBudget::QUERY_EMBEDDING,
            max_attempts: DEFAULT_PREPARE_MAX_ATTEMPTS,
            bbox_margin_degrees: BBOX_MARGIN_DEGREES,
        }
    }
}

impl AoiQueryBuilder {
    /// A builder for `source_table` with default settings.
    #[must_use]
    pub fn new(source_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            ..Self::default()
        }
    }

    /// A builder for `source_table` using budgets, margin and dialect from
    /// `config`.
    #[must_use]
    pub fn from_config(source_table: impl Into<String>, config: &AoiConfig) -> Self {
        Self {
            source_table: source_table.into(),
            dialect: config.dialect,
            expression_budget: config.query_expression_budget,
            plain_budget: config.plain_budget,
            max_attempts: config.prepare_max_attempts,
            bbox_margin_degrees: config.bbox_margin_degrees,
            ..Self::default()
        }
    }

    /// Comma-separated column list to select. Defaults to `*`.
    #[must_use]
    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }

    /// SQL expression producing each record's geometry.
    #[must_use]
    pub fn geometry_field_clause(mut self, clause: impl Into<String>) -> Self {
        self.geometry_field_clause = clause.into();
        self
    }

    /// Pre-filter on a stored bounding-box column instead of the
    /// latitude/longitude point.
    #[must_use]
    pub fn bbox_field(mut self, field: impl Into<String>) -> Self {
        self.bbox_field = Some(field.into());
        self
    }

    /// SQL flavour for the embedded AOI.
    #[must_use]
    pub const fn dialect(mut self, dialect: QueryDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Budget for the embedded AOI expression.
    #[must_use]
    pub const fn expression_budget(mut self, budget: QueryExpressionBudget) -> Self {
        self.expression_budget = budget;
        self
    }

    /// Attempt ceiling when the AOI has to be simplified.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The pre-filter box and `WHERE` clause for `aoi`.
    #[must_use]
    pub fn prefilter(&self, aoi: &AreaOfInterest) -> (BoundingBox, String) {
        match &self.bbox_field {
            Some(field) => {
                let bbox = generate_bbox_overlap_filter(aoi);
                (bbox, bbox_overlap_where_clause(&bbox, field))
            }
            None => {
                let bbox = generate_bbox_filter_with_margin(aoi, self.bbox_margin_degrees);
                (bbox, prefilter_where_clause(&bbox))
            }
        }
    }

    /// Builds the count and select statements for `aoi`.
    ///
    /// The pre-filter always uses the unsimplified AOI's extent.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::GeometryTooLarge`] if the AOI does not fit even
    /// after simplification, or [`QueryError::Aoi`] if it cannot be encoded.
    pub fn build(&self, aoi: &AreaOfInterest) -> Result<AoiQuery, QueryError> {
        let (bbox, where_clause) = self.prefilter(aoi);
        let count_sql = format!(
            "SELECT count(*) AS record_count FROM {} {where_clause}",
            self.source_table
        );

        let mut simplification = None;
        let mut expression =
            to_query_expression(&aoi.union(), self.expression_budget, self.dialect)?;

        if expression.is_too_large() {
            log::info!("AOI geometry too large, simplifying and retrying");
            let (prepared, meta) = prepare_aoi_for_query(aoi, self.fallback_budget(), self.max_attempts)?;
            expression = to_query_expression(&prepared.union(), self.expression_budget, self.dialect)?;
            simplification = Some(meta);
        }

        let geometry_sql = match expression {
            QueryGeometryExpression::Wkt(sql) | QueryGeometryExpression::Wkb(sql) => sql,
            QueryGeometryExpression::TooLarge { wkt_len, wkb_len } => {
                log::error!("Could not build a small enough AOI geometry, even after simplification");
                return Err(QueryError::GeometryTooLarge {
                    wkt_len,
                    wkb_len,
                    budget: self.expression_budget.bytes(),
                });
            }
        };

        log::info!(
            "Built AOI geometry expression: {} bytes ({})",
            geometry_sql.len(),
            if simplification.is_some() {
                "simplified"
            } else {
                "did not need to simplify"
            }
        );

        let select_sql = format!(
            "WITH pre_filtered AS (\n    SELECT\n        {fields}\n        , {geometry} AS geom_obj\n    FROM\n        {table}\n    {where_clause}\n)\nSELECT\n    *\nFROM\n    pre_filtered AS t1\nWHERE\n    ST_Intersects(\n        t1.geom_obj,\n        {geometry_sql}\n    );",
            fields = self.fields,
            geometry = self.geometry_field_clause,
            table = self.source_table,
        );

        Ok(AoiQuery {
            bbox,
            count_sql,
            select_sql,
            simplification,
        })
    }

    /// Plain WKB budget for the simplification fallback, leaving room for
    /// the dialect's wrapping call.
    fn fallback_budget(&self) -> PlainSerializationBudget {
        let wrapper = self.dialect.wrap_wkb_hex("").len();
        PlainSerializationBudget(
            self.plain_budget
                .bytes()
                .min(self.expression_budget.bytes().saturating_sub(wrapper)),
        )
    }
}
