//! Entry points report code calls before building a query or a project.

use geo::{Coord, MapCoords};
use geojson::{Feature, FeatureCollection, JsonObject};
use riverscapes_aoi_models::{
    AoiConfig, PlainSerializationBudget, SerializationFormat,
    SimplificationResultMeta,
};

use crate::aoi::GEOJSON_DECIMALS;
use crate::bbox::round_to;
use crate::simplify::{SimplifyOptions, simplify_to_size};
use crate::{AoiError, AreaOfInterest};

/// Brings `aoi` within `budget`, measured as WKB hex, before it is
/// embedded in a query.
///
/// Delegates to [`simplify_to_size`] with the default start tolerance. The
/// returned metadata tells the caller whether precision was lost and whether
/// the result actually fits. Building the SQL expression is left to the
/// caller, which knows its dialect.
///
/// # Errors
///
/// Returns [`AoiError`] only if the AOI cannot be serialized or projected.
pub fn prepare_aoi_for_query(
    aoi: &AreaOfInterest,
    budget: PlainSerializationBudget,
    max_attempts: u32,
) -> Result<(AreaOfInterest, SimplificationResultMeta), AoiError> {
    let options = SimplifyOptions::default()
        .with_max_attempts(max_attempts)
        .with_format(SerializationFormat::Wkb);
    prepare_with_options(aoi, budget, &options)
}

/// [`prepare_aoi_for_query`] with budget, attempts and start tolerance
/// taken from `config`.
///
/// # Errors
///
/// Returns [`AoiError`] only if the AOI cannot be serialized or projected.
pub fn prepare_with_config(
    aoi: &AreaOfInterest,
    config: &AoiConfig,
) -> Result<(AreaOfInterest, SimplificationResultMeta), AoiError> {
    let options = SimplifyOptions::from_config(config)
        .with_max_attempts(config.prepare_max_attempts)
        .with_format(SerializationFormat::Wkb);
    prepare_with_options(aoi, config.plain_budget, &options)
}

fn prepare_with_options(
    aoi: &AreaOfInterest,
    budget: PlainSerializationBudget,
    options: &SimplifyOptions,
) -> Result<(AreaOfInterest, SimplificationResultMeta), AoiError> {
    let (prepared, meta) = simplify_to_size(aoi, budget, options)?;

    if !meta.success {
        log::warn!(
            "AOI could not be simplified under {} bytes ({} bytes at {} m); query results may be approximate",
            budget.bytes(),
            meta.final_size_bytes,
            meta.tolerance_m
        );
    } else if meta.simplified {
        log::info!(
            "AOI simplified with a {} m tolerance to {} bytes",
            meta.tolerance_m,
            meta.final_size_bytes
        );
    }

    Ok((prepared, meta))
}

/// Dissolved, size-bounded AOI outline for a project's bounds file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBounds {
    /// `FeatureCollection` with a single feature holding the outline.
    pub geojson: FeatureCollection,
    /// `(lon, lat)` of the dissolved AOI's centroid.
    pub centroid: (f64, f64),
    /// `[minx, miny, maxx, maxy]` of the dissolved AOI.
    pub bounds: [f64; 4],
    /// How the outline was simplified.
    pub meta: SimplificationResultMeta,
}

impl ProjectBounds {
    /// The bounds `GeoJSON` as compact text.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Json`] if serialization fails.
    pub fn to_geojson_string(&self) -> Result<String, AoiError> {
        Ok(serde_json::to_string(&self.geojson)?)
    }
}

/// Dissolves `aoi` and simplifies it until its `GeoJSON` fits the
/// configured project-bounds budget.
///
/// The centroid and extent describe the dissolved AOI before
/// simplification, so they always cover it. An outline that still does not
/// fit is returned anyway with a warning; the project catalog tolerates
/// some overshoot.
///
/// # Errors
///
/// Returns [`AoiError`] if the AOI cannot be serialized or projected.
pub fn project_bounds(aoi: &AreaOfInterest, config: &AoiConfig) -> Result<ProjectBounds, AoiError> {
    let budget = config.project_bounds_budget;
    let dissolved = aoi.union();
    let centroid = dissolved.centroid().ok_or(AoiError::EmptyAoi)?;
    let rect = dissolved.bounds().ok_or(AoiError::EmptyAoi)?;

    let options = SimplifyOptions::from_config(config).with_max_attempts(config.prepare_max_attempts);
    let (outline, meta) = simplify_to_size(&aoi.derive(dissolved.into_inner().0)?, budget, &options)?;

    if !meta.success {
        log::warn!(
            "Project bounds are {} bytes, over the {} byte budget",
            meta.final_size_bytes,
            budget.bytes()
        );
    }

    let unioned = outline.union();
    let rounded = unioned.to_geometry().map_coords(|c| Coord {
        x: round_to(c.x, GEOJSON_DECIMALS),
        y: round_to(c.y, GEOJSON_DECIMALS),
    });

    let geojson = FeatureCollection {
        bbox: None,
        features: vec![Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&rounded))),
            id: None,
            properties: Some(JsonObject::new()),
            foreign_members: None,
        }],
        foreign_members: None,
    };

    Ok(ProjectBounds {
        geojson,
        centroid: (centroid.x(), centroid.y()),
        bounds: [rect.min().x, rect.min().y, rect.max().x, rect.max().y],
        meta,
    })
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use geo::{Polygon, polygon};

    use super::*;

    fn circle(center: (f64, f64), radius: f64, vertices: u32) -> Polygon<f64> {
        let ring: Vec<(f64, f64)> = (0..vertices)
            .map(|i| {
                let theta = f64::from(i) * TAU / f64::from(vertices);
                (
                    center.0 + theta.cos() * radius,
                    center.1 + theta.sin() * radius,
                )
            })
            .collect();
        Polygon::new(ring.into(), Vec::new())
    }

    #[test]
    fn small_aoi_needs_no_preparation() {
        let aoi = AreaOfInterest::new(vec![polygon![
            (x: -111.0, y: 39.0),
            (x: -110.0, y: 39.0),
            (x: -110.0, y: 40.0),
        ]])
        .unwrap();

        let (prepared, meta) =
            prepare_aoi_for_query(&aoi, PlainSerializationBudget::QUERY_EMBEDDING, 5).unwrap();

        assert_eq!(prepared, aoi);
        assert!(meta.success);
        assert!(!meta.simplified);
        assert_eq!(meta.format, SerializationFormat::Wkb);
        assert_eq!(meta.final_size_bytes, aoi.wkb_hex_len().unwrap());
    }

    #[test]
    fn oversized_aoi_is_simplified_under_wkb_budget() {
        let aoi = AreaOfInterest::new(vec![circle((-111.5, 39.5), 0.5, 5_000)]).unwrap();
        assert!(aoi.wkb_hex_len().unwrap() > 20_000);

        let (prepared, meta) =
            prepare_aoi_for_query(&aoi, PlainSerializationBudget(20_000), 5).unwrap();

        assert!(meta.success);
        assert!(meta.simplified);
        assert!(meta.tolerance_m > 0.0);
        assert!(prepared.wkb_hex_len().unwrap() <= 20_000);
    }

    #[test]
    fn config_drives_preparation() {
        let aoi = AreaOfInterest::new(vec![circle((-111.5, 39.5), 0.5, 5_000)]).unwrap();
        let config = AoiConfig {
            plain_budget: PlainSerializationBudget(20_000),
            start_tolerance_m: 10.0,
            prepare_max_attempts: 1,
            ..AoiConfig::default()
        };

        let (_, meta) = prepare_with_config(&aoi, &config).unwrap();

        assert_eq!(meta.attempts.len(), 1);
        assert!((meta.attempts[0].tolerance_m - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn project_bounds_dissolves_parts() {
        let aoi = AreaOfInterest::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)],
            polygon![(x: 1.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 2.0), (x: 1.0, y: 2.0)],
        ])
        .unwrap();

        let bounds = project_bounds(&aoi, &AoiConfig::default()).unwrap();

        assert_eq!(bounds.geojson.features.len(), 1);
        assert!((bounds.centroid.0 - 2.0).abs() < 1e-6);
        assert!((bounds.centroid.1 - 1.0).abs() < 1e-6);
        for (actual, expected) in bounds.bounds.iter().zip([0.0, 0.0, 4.0, 2.0]) {
            assert!((actual - expected).abs() < 1e-6, "{:?}", bounds.bounds);
        }
        assert!(bounds.meta.success);

        let text = bounds.to_geojson_string().unwrap();
        assert!(text.contains("\"Polygon\""), "{text}");
    }

    #[test]
    fn project_bounds_cover_the_unsimplified_aoi() {
        // Rotated off the axes so the extreme vertices sit mid-arc.
        let ring: Vec<(f64, f64)> = (0..5_000)
            .map(|i| {
                let theta = (f64::from(i) + 0.37) * TAU / 5_000.0;
                (-111.5 + theta.cos() * 0.5, 39.5 + theta.sin() * 0.5)
            })
            .collect();
        let aoi = AreaOfInterest::new(vec![Polygon::new(ring.into(), Vec::new())]).unwrap();
        let config = AoiConfig {
            project_bounds_budget: PlainSerializationBudget(20_000),
            ..AoiConfig::default()
        };

        let bounds = project_bounds(&aoi, &config).unwrap();
        assert!(bounds.meta.simplified);
        assert!(bounds.meta.success);

        let rect = aoi.total_bounds();
        let expected = [rect.min().x, rect.min().y, rect.max().x, rect.max().y];
        for (actual, expected) in bounds.bounds.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-12, "{:?}", bounds.bounds);
        }
        assert!((bounds.centroid.0 + 111.5).abs() < 1e-3);
        assert!((bounds.centroid.1 - 39.5).abs() < 1e-3);
    }

    #[test]
    fn project_bounds_follow_configured_tolerance() {
        let aoi = AreaOfInterest::new(vec![circle((-111.5, 39.5), 0.5, 5_000)]).unwrap();
        let config = AoiConfig {
            project_bounds_budget: PlainSerializationBudget(20_000),
            start_tolerance_m: 40.0,
            ..AoiConfig::default()
        };

        let bounds = project_bounds(&aoi, &config).unwrap();
        assert!((bounds.meta.attempts[0].tolerance_m - 40.0).abs() < f64::EPSILON);
    }
}
