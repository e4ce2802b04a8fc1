#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for AOI query preparation.
//!
//! Every subcommand reads an AOI from a `GeoJSON` file and prints JSON or
//! SQL to stdout. Settings come from an optional TOML file given with
//! `--config`, overridden by `RIVERSCAPES_AOI_*` environment variables.
//! Logging is controlled with `RUST_LOG`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use riverscapes_aoi::bbox::{generate_bbox_filter_with_margin, generate_bbox_overlap_filter};
use riverscapes_aoi::config::{apply_env_overrides, load_config};
use riverscapes_aoi::expression::to_query_expression;
use riverscapes_aoi::prepare::{prepare_with_config, project_bounds};
use riverscapes_aoi::{AreaOfInterest, QueryGeometryExpression, SimplifyOptions, simplify_to_size};
use riverscapes_aoi_models::{
    AoiConfig, PlainSerializationBudget, QueryDialect, QueryExpressionBudget, SerializationFormat,
};
use riverscapes_query::{AoiQueryBuilder, DEFAULT_SOURCE_TABLE};
use serde_json::json;

#[derive(Parser)]
#[command(name = "riverscapes_aoi", about = "AOI query preparation tool")]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the latitude/longitude pre-filter box
    Bbox {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// Unbuffered box for tables with a stored bounding-box column
        #[arg(long)]
        overlap: bool,
    },
    /// Print the smaller of the WKT and WKB geometry expressions
    Expression {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// SQL flavour (athena or duckdb)
        #[arg(long)]
        dialect: Option<QueryDialect>,
        /// Expression budget in bytes
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Simplify the AOI until its plain serialization fits a budget
    Simplify {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// Budget in bytes
        #[arg(long)]
        budget: Option<usize>,
        /// First tolerance in metres
        #[arg(long)]
        start_tolerance: Option<f64>,
        /// Attempt ceiling
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Serialization to measure (`GeoJSON` or WKB)
        #[arg(long)]
        format: Option<SerializationFormat>,
        /// Write the resulting AOI here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prepare the AOI for embedding in a query
    Prepare {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// Plain WKB budget in bytes
        #[arg(long)]
        budget: Option<usize>,
        /// Attempt ceiling
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Write the prepared AOI here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Dissolve and simplify the AOI into project bounds
    Bounds {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// `GeoJSON` budget in bytes
        #[arg(long)]
        budget: Option<usize>,
        /// Write the bounds `GeoJSON` here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the count and select statements for an AOI query
    QuerySql {
        /// AOI `GeoJSON` file
        aoi: PathBuf,
        /// Source table
        #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
        table: String,
        /// Comma-separated columns to select
        #[arg(long)]
        fields: Option<String>,
        /// SQL expression producing each record's geometry
        #[arg(long)]
        geometry_field: Option<String>,
        /// Stored bounding-box column to pre-filter on
        #[arg(long)]
        bbox_field: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => apply_env_overrides(AoiConfig::default())?,
    };

    match cli.command {
        Commands::Bbox { aoi, overlap } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let bbox = if overlap {
                generate_bbox_overlap_filter(&aoi)
            } else {
                generate_bbox_filter_with_margin(&aoi, config.bbox_margin_degrees)
            };
            println!("{}", serde_json::to_string_pretty(&bbox)?);
        }
        Commands::Expression {
            aoi,
            dialect,
            budget,
        } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let budget = budget.map_or(config.query_expression_budget, QueryExpressionBudget);
            let expression =
                to_query_expression(&aoi.union(), budget, dialect.unwrap_or(config.dialect))?;
            match expression {
                QueryGeometryExpression::Wkt(sql) | QueryGeometryExpression::Wkb(sql) => {
                    println!("{sql}");
                }
                QueryGeometryExpression::TooLarge { wkt_len, wkb_len } => {
                    return Err(format!(
                        "AOI geometry too large (WKT {wkt_len} / WKB {wkb_len} bytes, budget {} bytes)",
                        budget.bytes()
                    )
                    .into());
                }
            }
        }
        Commands::Simplify {
            aoi,
            budget,
            start_tolerance,
            max_attempts,
            format,
            output,
        } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let mut options = SimplifyOptions::from_config(&config);
            if let Some(start) = start_tolerance {
                options.start_tolerance_m = start;
            }
            if let Some(max) = max_attempts {
                options.max_attempts = max;
            }
            if let Some(format) = format {
                options.format = format;
            }
            let budget = budget.map_or(config.plain_budget, PlainSerializationBudget);

            let (simplified, meta) = simplify_to_size(&aoi, budget, &options)?;
            write_output(&simplified, output.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Commands::Prepare {
            aoi,
            budget,
            max_attempts,
            output,
        } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let mut config = config;
            if let Some(budget) = budget {
                config.plain_budget = PlainSerializationBudget(budget);
            }
            if let Some(max) = max_attempts {
                config.prepare_max_attempts = max;
            }

            let (prepared, meta) = prepare_with_config(&aoi, &config)?;
            write_output(&prepared, output.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Commands::Bounds {
            aoi,
            budget,
            output,
        } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let mut config = config;
            if let Some(budget) = budget {
                config.project_bounds_budget = PlainSerializationBudget(budget);
            }
            let bounds = project_bounds(&aoi, &config)?;

            if let Some(path) = &output {
                std::fs::write(path, bounds.to_geojson_string()?)?;
                log::info!("Wrote project bounds to {}", path.display());
            }

            let summary = json!({
                "centroid": [bounds.centroid.0, bounds.centroid.1],
                "bounds": bounds.bounds,
                "simplification": bounds.meta,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::QuerySql {
            aoi,
            table,
            fields,
            geometry_field,
            bbox_field,
        } => {
            let aoi = AreaOfInterest::from_path(&aoi)?;
            let mut builder = AoiQueryBuilder::from_config(table, &config);
            if let Some(fields) = fields {
                builder = builder.fields(fields);
            }
            if let Some(clause) = geometry_field {
                builder = builder.geometry_field_clause(clause);
            }
            if let Some(field) = bbox_field {
                builder = builder.bbox_field(field);
            }

            let query = builder.build(&aoi)?;
            println!("{};\n", query.count_sql);
            println!("{}", query.select_sql);
        }
    }

    Ok(())
}

fn write_output(aoi: &AreaOfInterest, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = output {
        aoi.write_geojson(path)?;
    }
    Ok(())
}
