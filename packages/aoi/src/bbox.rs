//! Bounding-box pre-filters.
//!
//! The warehouse has no spatial index, so an exact `ST_Intersects` over the
//! full table is far too slow. Records carry a representative point in
//! indexed `latitude`/`longitude` columns; a `BETWEEN` range on those
//! columns discards most rows before the exact test runs.
//!
//! A record's point can lie well away from the corners of its own footprint,
//! so the AOI extent is pushed outward by [`BBOX_MARGIN_DEGREES`]. A polygon
//! buffer would round the corners and no longer describe a plain range.

use riverscapes_aoi_models::{BBOX_DECIMALS, BBOX_MARGIN_DEGREES, BoundingBox};

use crate::AreaOfInterest;

/// Builds the latitude/longitude pre-filter for `aoi`.
///
/// Every side of the AOI's total extent moves outward by
/// [`BBOX_MARGIN_DEGREES`], then each coordinate is rounded to
/// [`BBOX_DECIMALS`] places to keep the filter text short.
#[must_use]
pub fn generate_bbox_filter(aoi: &AreaOfInterest) -> BoundingBox {
    generate_bbox_filter_with_margin(aoi, BBOX_MARGIN_DEGREES)
}

/// [`generate_bbox_filter`] with an explicit margin in decimal degrees.
///
/// `margin` must be positive for the result to keep `max > min`.
#[must_use]
pub fn generate_bbox_filter_with_margin(aoi: &AreaOfInterest, margin: f64) -> BoundingBox {
    debug_assert!(margin > 0.0, "bbox margin must be positive, got {margin}");

    let bounds = aoi.total_bounds();
    let bbox = BoundingBox::new(
        round_to(bounds.min().x - margin, BBOX_DECIMALS),
        round_to(bounds.min().y - margin, BBOX_DECIMALS),
        round_to(bounds.max().x + margin, BBOX_DECIMALS),
        round_to(bounds.max().y + margin, BBOX_DECIMALS),
    );

    log::debug!(
        "Pre-filter box: lon {} to {}, lat {} to {}",
        bbox.min_lon,
        bbox.max_lon,
        bbox.min_lat,
        bbox.max_lat
    );

    bbox
}

/// Builds an unbuffered box for tables that store each record's own
/// bounding box.
///
/// Minima are rounded down and maxima rounded up so rounding never shrinks
/// the box.
#[must_use]
pub fn generate_bbox_overlap_filter(aoi: &AreaOfInterest) -> BoundingBox {
    let bounds = aoi.total_bounds();
    BoundingBox::new(
        round_down(bounds.min().x, BBOX_DECIMALS),
        round_down(bounds.min().y, BBOX_DECIMALS),
        round_up(bounds.max().x, BBOX_DECIMALS),
        round_up(bounds.max().y, BBOX_DECIMALS),
    )
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Rounds toward negative infinity at `decimals` places.
#[must_use]
pub fn round_down(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).floor() / factor
}

/// Rounds toward positive infinity at `decimals` places.
#[must_use]
pub fn round_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).ceil() / factor
}
