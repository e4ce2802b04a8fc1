//! Loading [`AoiConfig`] from TOML and `RIVERSCAPES_AOI_*` environment
//! variables.
//!
//! | Variable                               | Field                     |
//! |----------------------------------------|---------------------------|
//! | `RIVERSCAPES_AOI_BBOX_MARGIN_DEGREES`  | `bbox_margin_degrees`     |
//! | `RIVERSCAPES_AOI_EXPRESSION_BUDGET`    | `query_expression_budget` |
//! | `RIVERSCAPES_AOI_PLAIN_BUDGET`         | `plain_budget`            |
//! | `RIVERSCAPES_AOI_BOUNDS_BUDGET`        | `project_bounds_budget`   |
//! | `RIVERSCAPES_AOI_START_TOLERANCE_M`    | `start_tolerance_m`       |
//! | `RIVERSCAPES_AOI_MAX_ATTEMPTS`         | `max_attempts`            |
//! | `RIVERSCAPES_AOI_PREPARE_MAX_ATTEMPTS` | `prepare_max_attempts`    |
//! | `RIVERSCAPES_AOI_DIALECT`              | `dialect`                 |

use std::path::Path;
use std::str::FromStr;

use riverscapes_aoi_models::{AoiConfig, PlainSerializationBudget, QueryExpressionBudget};

use crate::AoiError;

/// Reads a config file and applies environment overrides.
///
/// # Errors
///
/// Returns [`AoiError`] if the file cannot be read or parsed, or if a value
/// is out of range.
pub fn load_config(path: &Path) -> Result<AoiConfig, AoiError> {
    let text = std::fs::read_to_string(path)?;
    let config = apply_env_overrides(config_from_toml_str(&text)?)?;
    log::debug!("Loaded AOI config from {}", path.display());
    Ok(config)
}

/// Parses a (possibly partial) TOML config.
///
/// # Errors
///
/// Returns [`AoiError::Toml`] on malformed TOML or [`AoiError::Config`] for
/// out-of-range values.
pub fn config_from_toml_str(text: &str) -> Result<AoiConfig, AoiError> {
    let config: AoiConfig = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

/// Applies `RIVERSCAPES_AOI_*` overrides from the process environment.
///
/// # Errors
///
/// Returns [`AoiError::Config`] if a variable cannot be parsed.
pub fn apply_env_overrides(config: AoiConfig) -> Result<AoiConfig, AoiError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Applies overrides using `lookup` to resolve variable names.
///
/// # Errors
///
/// Returns [`AoiError::Config`] if a value cannot be parsed or is out of
/// range.
pub fn apply_overrides_from(
    mut config: AoiConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AoiConfig, AoiError> {
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_BBOX_MARGIN_DEGREES")? {
        config.bbox_margin_degrees = v;
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_EXPRESSION_BUDGET")? {
        config.query_expression_budget = QueryExpressionBudget(v);
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_PLAIN_BUDGET")? {
        config.plain_budget = PlainSerializationBudget(v);
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_BOUNDS_BUDGET")? {
        config.project_bounds_budget = PlainSerializationBudget(v);
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_START_TOLERANCE_M")? {
        config.start_tolerance_m = v;
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_MAX_ATTEMPTS")? {
        config.max_attempts = v;
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_PREPARE_MAX_ATTEMPTS")? {
        config.prepare_max_attempts = v;
    }
    if let Some(v) = parse_var(&lookup, "RIVERSCAPES_AOI_DIALECT")? {
        config.dialect = v;
    }

    validate(&config)?;
    Ok(config)
}

/// Checks that margins and tolerances are positive and finite.
///
/// # Errors
///
/// Returns [`AoiError::Config`] naming the first offending field.
pub fn validate(config: &AoiConfig) -> Result<(), AoiError> {
    if !(config.bbox_margin_degrees.is_finite() && config.bbox_margin_degrees > 0.0) {
        return Err(AoiError::Config {
            message: format!(
                "bbox_margin_degrees must be positive, got {}",
                config.bbox_margin_degrees
            ),
        });
    }
    if !(config.start_tolerance_m.is_finite() && config.start_tolerance_m > 0.0) {
        return Err(AoiError::Config {
            message: format!(
                "start_tolerance_m must be positive, got {}",
                config.start_tolerance_m
            ),
        });
    }
    Ok(())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, AoiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    let value = raw.trim().parse::<T>().map_err(|e| AoiError::Config {
        message: format!("{name}={raw:?}: {e}"),
    })?;
    log::debug!("Config override from {name}");
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use riverscapes_aoi_models::{BBOX_MARGIN_DEGREES, QueryDialect};

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(config_from_toml_str("").unwrap(), AoiConfig::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = config_from_toml_str(
            r#"
            plain_budget = 100000
            dialect = "duckdb"
            "#,
        )
        .unwrap();
        assert_eq!(config.plain_budget, PlainSerializationBudget(100_000));
        assert_eq!(config.dialect, QueryDialect::DuckDb);
        assert!((config.bbox_margin_degrees - BBOX_MARGIN_DEGREES).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            config_from_toml_str("plain_budget = \"lots\""),
            Err(AoiError::Toml(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let config = apply_overrides_from(
            AoiConfig::default(),
            lookup(&[
                ("RIVERSCAPES_AOI_MAX_ATTEMPTS", "7"),
                ("RIVERSCAPES_AOI_START_TOLERANCE_M", " 2.5 "),
                ("RIVERSCAPES_AOI_DIALECT", "DuckDB"),
                ("RIVERSCAPES_AOI_EXPRESSION_BUDGET", "200000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.max_attempts, 7);
        assert!((config.start_tolerance_m - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.dialect, QueryDialect::DuckDb);
        assert_eq!(config.query_expression_budget, QueryExpressionBudget(200_000));
        assert_eq!(config.prepare_max_attempts, AoiConfig::default().prepare_max_attempts);
    }

    #[test]
    fn unparsable_override_is_reported() {
        let err = apply_overrides_from(
            AoiConfig::default(),
            lookup(&[("RIVERSCAPES_AOI_PLAIN_BUDGET", "big")]),
        )
        .unwrap_err();
        match err {
            AoiError::Config { message } => {
                assert!(message.contains("RIVERSCAPES_AOI_PLAIN_BUDGET"), "{message}");
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_positive_margin() {
        let result = apply_overrides_from(
            AoiConfig::default(),
            lookup(&[("RIVERSCAPES_AOI_BBOX_MARGIN_DEGREES", "0")]),
        );
        assert!(matches!(result, Err(AoiError::Config { .. })));
    }
}
