//! Running AOI queries against a backend.

use riverscapes_aoi::AreaOfInterest;
use serde_json::{Map, Value};

use crate::{AoiQuery, AoiQueryBuilder, QueryError};

/// What a backend hands back for a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Parsed result rows.
    Rows(Vec<Map<String, Value>>),
    /// Where the backend wrote the results (for example an S3 prefix).
    Location(String),
}

/// A backend that can execute SQL text.
pub trait QueryRunner {
    /// Executes `sql` and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Runner`] if the statement fails.
    fn run_query(&self, sql: &str) -> Result<QueryOutput, QueryError>;
}

/// Output of [`run_aoi_query`] together with the statements that produced
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct AoiQueryResult {
    /// The statements that were run.
    pub query: AoiQuery,
    /// Output of the select statement.
    pub output: QueryOutput,
}

/// Builds the query for `aoi` and runs it.
///
/// With `count_first`, the pre-filter count runs first and is logged; it is
/// a diagnostic and costs an extra scan.
///
/// # Errors
///
/// Returns [`QueryError`] if the query cannot be built or either statement
/// fails.
pub fn run_aoi_query<R: QueryRunner + ?Sized>(
    runner: &R,
    builder: &AoiQueryBuilder,
    aoi: &AreaOfInterest,
    count_first: bool,
) -> Result<AoiQueryResult, QueryError> {
    let query = builder.build(aoi)?;

    if count_first {
        match runner.run_query(&query.count_sql)? {
            QueryOutput::Rows(rows) => log::debug!("Pre-filtered records: {rows:?}"),
            QueryOutput::Location(location) => {
                log::debug!("Pre-filtered record count written to {location}");
            }
        }
    }

    let output = runner.run_query(&query.select_sql)?;
    match &output {
        QueryOutput::Rows(rows) => log::info!("AOI query returned {} row(s)", rows.len()),
        QueryOutput::Location(location) => log::info!("AOI query results at {location}"),
    }

    Ok(AoiQueryResult { query, output })
}
