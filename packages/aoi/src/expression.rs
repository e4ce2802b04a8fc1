//! SQL-embeddable geometry expressions under a byte budget.
//!
//! The dissolved AOI is encoded twice, as WKT wrapped in a "geometry from
//! text" call and as WKB hex wrapped in a "geometry from binary" call. The
//! shorter expression wins, WKT on ties. When neither fits the
//! [`QueryExpressionBudget`] the caller gets [`QueryGeometryExpression::TooLarge`]
//! and is expected to simplify and retry.

use riverscapes_aoi_models::{QueryDialect, QueryExpressionBudget};

use crate::{AoiError, UnionedGeometry};

/// Which encoding to embed, decided from lengths alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingChoice {
    /// Embed the WKT expression.
    Wkt,
    /// Embed the WKB-hex expression.
    Wkb,
    /// Neither expression fits the budget.
    TooLarge,
}

/// Picks between two wrapped expression lengths.
///
/// Returns [`EncodingChoice::TooLarge`] if and only if both lengths exceed
/// the budget; otherwise the shorter one, preferring WKT on a tie.
#[must_use]
pub const fn choose_encoding(
    wkt_len: usize,
    wkb_len: usize,
    budget: QueryExpressionBudget,
) -> EncodingChoice {
    let max = budget.bytes();
    if wkt_len > max && wkb_len > max {
        EncodingChoice::TooLarge
    } else if wkt_len <= wkb_len {
        EncodingChoice::Wkt
    } else {
        EncodingChoice::Wkb
    }
}

/// A geometry ready to be spliced into a query, or the reason it can't be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryGeometryExpression {
    /// `ST_GeometryFromText('...')` (or the dialect's equivalent).
    Wkt(String),
    /// `ST_GeomFromBinary(from_hex('...'))` (or the dialect's equivalent).
    Wkb(String),
    /// Both wrapped encodings exceeded the budget.
    TooLarge {
        /// Wrapped WKT length in bytes.
        wkt_len: usize,
        /// Wrapped WKB-hex length in bytes.
        wkb_len: usize,
    },
}

impl QueryGeometryExpression {
    /// The SQL expression, if one fits.
    #[must_use]
    pub fn as_sql(&self) -> Option<&str> {
        match self {
            Self::Wkt(sql) | Self::Wkb(sql) => Some(sql),
            Self::TooLarge { .. } => None,
        }
    }

    /// Consumes `self`, returning the SQL expression if one fits.
    #[must_use]
    pub fn into_sql(self) -> Option<String> {
        match self {
            Self::Wkt(sql) | Self::Wkb(sql) => Some(sql),
            Self::TooLarge { .. } => None,
        }
    }

    /// Whether neither encoding fit.
    #[must_use]
    pub const fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }
}

/// Builds the smaller of the WKT and WKB-hex expressions for `geometry`.
///
/// Lengths are measured on the full wrapped expression, so the budget
/// accounts for the function-call syntax too.
///
/// # Errors
///
/// Returns [`AoiError::Wkb`] if the geometry cannot be WKB encoded. A
/// geometry that is merely too large is not an error.
pub fn to_query_expression(
    geometry: &UnionedGeometry,
    budget: QueryExpressionBudget,
    dialect: QueryDialect,
) -> Result<QueryGeometryExpression, AoiError> {
    let wkt_sql = dialect.wrap_wkt(&geometry.to_wkt());
    let wkb_sql = dialect.wrap_wkb_hex(&geometry.to_wkb_hex()?);

    log::debug!("WKT length: {} bytes", wkt_sql.len());
    log::debug!("WKB hex length: {} bytes", wkb_sql.len());

    Ok(match choose_encoding(wkt_sql.len(), wkb_sql.len(), budget) {
        EncodingChoice::Wkt => {
            log::info!("Using WKT geometry expression ({} bytes)", wkt_sql.len());
            QueryGeometryExpression::Wkt(wkt_sql)
        }
        EncodingChoice::Wkb => {
            log::info!("Using WKB geometry expression ({} bytes)", wkb_sql.len());
            QueryGeometryExpression::Wkb(wkb_sql)
        }
        EncodingChoice::TooLarge => {
            log::warn!(
                "AOI geometry is too big for a query (WKT {} / WKB {} bytes, budget {} bytes); simplify it and try again",
                wkt_sql.len(),
                wkb_sql.len(),
                budget.bytes()
            );
            QueryGeometryExpression::TooLarge {
                wkt_len: wkt_sql.len(),
                wkb_len: wkb_sql.len(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use geo::{Polygon, polygon};

    use super::*;
    use crate::AreaOfInterest;

    fn budget(bytes: usize) -> QueryExpressionBudget {
        QueryExpressionBudget(bytes)
    }

    #[test]
    fn picks_shorter_encoding() {
        assert_eq!(choose_encoding(100, 200, budget(1_000)), EncodingChoice::Wkt);
        assert_eq!(choose_encoding(200, 100, budget(1_000)), EncodingChoice::Wkb);
    }

    #[test]
    fn tie_goes_to_wkt() {
        assert_eq!(choose_encoding(150, 150, budget(1_000)), EncodingChoice::Wkt);
    }

    #[test]
    fn too_large_only_when_both_exceed() {
        assert_eq!(choose_encoding(1_001, 1_002, budget(1_000)), EncodingChoice::TooLarge);
        assert_eq!(choose_encoding(1_000, 5_000, budget(1_000)), EncodingChoice::Wkt);
        assert_eq!(choose_encoding(5_000, 1_000, budget(1_000)), EncodingChoice::Wkb);
        assert_eq!(choose_encoding(1_001, 1_000, budget(1_000)), EncodingChoice::Wkb);
    }

    #[test]
    fn integer_square_prefers_wkt() {
        // Small integer coordinates print far shorter than 16 bytes of hex each.
        let aoi = AreaOfInterest::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]])
        .unwrap();

        let expression =
            to_query_expression(&aoi.union(), QueryExpressionBudget::DEFAULT, QueryDialect::Athena)
                .unwrap();

        match expression {
            QueryGeometryExpression::Wkt(sql) => {
                assert!(sql.starts_with("ST_GeometryFromText('POLYGON"));
                assert!(sql.ends_with("')"));
            }
            other => panic!("expected WKT, got {other:?}"),
        }
    }

    #[test]
    fn long_decimals_prefer_wkb() {
        // Full-precision doubles print as ~17 digits each, longer than 16
        // hex characters per ordinate.
        let ring: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let theta = f64::from(i) * std::f64::consts::TAU / 12.0 + 0.1;
                (
                    -111.5 + 0.123_456_789 * theta.cos(),
                    39.5 + 0.123_456_789 * theta.sin(),
                )
            })
            .collect();
        let aoi = AreaOfInterest::new(vec![Polygon::new(ring.into(), Vec::new())]).unwrap();

        let expression =
            to_query_expression(&aoi.union(), QueryExpressionBudget::DEFAULT, QueryDialect::Athena)
                .unwrap();

        let sql = expression.as_sql().unwrap();
        assert!(sql.starts_with("ST_GeomFromBinary(from_hex('01"), "{sql}");
        assert!(matches!(expression, QueryGeometryExpression::Wkb(_)));
    }

    #[test]
    fn over_budget_returns_too_large() {
        let aoi = AreaOfInterest::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]])
        .unwrap();

        let expression =
            to_query_expression(&aoi.union(), budget(10), QueryDialect::Athena).unwrap();

        assert!(expression.is_too_large());
        assert!(expression.clone().into_sql().is_none());
        let QueryGeometryExpression::TooLarge { wkt_len, wkb_len } = expression else {
            unreachable!();
        };
        assert!(wkt_len > 10 && wkb_len > 10);
    }

    #[test]
    fn duckdb_dialect_wrapping() {
        let aoi = AreaOfInterest::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]])
        .unwrap();

        let sql = to_query_expression(&aoi.union(), QueryExpressionBudget::DEFAULT, QueryDialect::DuckDb)
            .unwrap()
            .into_sql()
            .unwrap();
        assert!(sql.starts_with("ST_GeomFromText('POLYGON"), "{sql}");
    }
}
