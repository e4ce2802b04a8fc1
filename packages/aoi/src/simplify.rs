//! Size-bounded AOI simplification.
//!
//! Each attempt projects the AOI onto the Conus Albers plane, runs
//! Ramer-Douglas-Peucker on every ring with a tolerance in metres, puts back
//! input vertices wherever the simplification would break the polygon's
//! topology, and projects the result back to WGS84. The tolerance grows with the square of
//! the attempt number until the serialized AOI fits its budget or the
//! attempts run out.

use geo::{Coord, LineString, Polygon, SimplifyIdx};
use riverscapes_aoi_models::{
    AoiConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_START_TOLERANCE_M, PlainSerializationBudget,
    SerializationFormat, SimplificationAttempt, SimplificationResultMeta,
};

use crate::projection::AlbersEqualArea;
use crate::{AoiError, AreaOfInterest, topology};

/// A closed ring needs at least four coordinates.
const MIN_RING_COORDS: usize = 4;

/// Tolerance in metres for a 1-indexed attempt: `start * attempt²`.
#[must_use]
pub fn tolerance_for_attempt(start_tolerance_m: f64, attempt: u32) -> f64 {
    start_tolerance_m * f64::from(attempt).powi(2)
}

/// Parameters for [`simplify_to_size`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyOptions {
    /// Tolerance of the first attempt, in metres.
    pub start_tolerance_m: f64,
    /// Attempt ceiling. Zero means "measure only".
    pub max_attempts: u32,
    /// Serialization measured against the budget.
    pub format: SerializationFormat,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            start_tolerance_m: DEFAULT_START_TOLERANCE_M,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            format: SerializationFormat::GeoJson,
        }
    }
}

impl SimplifyOptions {
    /// Options for direct simplification calls, taken from `config`.
    #[must_use]
    pub const fn from_config(config: &AoiConfig) -> Self {
        Self {
            start_tolerance_m: config.start_tolerance_m,
            max_attempts: config.max_attempts,
            format: SerializationFormat::GeoJson,
        }
    }

    /// Replaces the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replaces the measured format.
    #[must_use]
    pub const fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }
}

/// Shrinks `aoi` until its plain serialization fits `budget`.
///
/// An AOI that already fits is returned as an unchanged clone with a
/// tolerance of zero. Otherwise attempt `k` simplifies the *input* AOI at
/// [`tolerance_for_attempt`]`(start, k)` and stops at the first result that
/// fits. If none fits, the last (most simplified) result is returned with
/// `success == false`; running out of attempts is not an error.
///
/// # Errors
///
/// Returns [`AoiError`] only if the AOI cannot be serialized or projected.
pub fn simplify_to_size(
    aoi: &AreaOfInterest,
    budget: PlainSerializationBudget,
    options: &SimplifyOptions,
) -> Result<(AreaOfInterest, SimplificationResultMeta), AoiError> {
    let format = options.format;
    let initial_size = aoi.serialized_size(format)?;

    if initial_size <= budget.bytes() {
        log::debug!(
            "AOI {format} size {initial_size} bytes is within the {} byte budget",
            budget.bytes()
        );
        return Ok((
            aoi.clone(),
            SimplificationResultMeta::unchanged(initial_size, format),
        ));
    }

    log::info!(
        "AOI {format} size {initial_size} bytes exceeds the {} byte budget, simplifying ({} vertices)",
        budget.bytes(),
        aoi.vertex_count()
    );

    let mut attempts = Vec::new();
    let mut last = None;

    for attempt in 1..=options.max_attempts {
        let tolerance_m = tolerance_for_attempt(options.start_tolerance_m, attempt);
        let simplified = simplify_aoi(aoi, tolerance_m)?;
        let size_bytes = simplified.serialized_size(format)?;
        let success = size_bytes <= budget.bytes();

        log::info!(
            "Simplification attempt {attempt}: tolerance {tolerance_m} m, {} vertices, {size_bytes} bytes",
            simplified.vertex_count()
        );

        attempts.push(SimplificationAttempt {
            attempt,
            tolerance_m,
            size_bytes,
            success,
        });

        if success {
            return Ok((
                simplified,
                SimplificationResultMeta {
                    tolerance_m,
                    simplified: true,
                    success: true,
                    final_size_bytes: size_bytes,
                    format,
                    attempts,
                },
            ));
        }

        last = Some((simplified, tolerance_m, size_bytes));
    }

    let Some((simplified, tolerance_m, size_bytes)) = last else {
        log::warn!("No simplification attempts allowed; AOI remains {initial_size} bytes");
        return Ok((
            aoi.clone(),
            SimplificationResultMeta {
                tolerance_m: 0.0,
                simplified: false,
                success: false,
                final_size_bytes: initial_size,
                format,
                attempts,
            },
        ));
    };

    log::warn!(
        "AOI is still {size_bytes} bytes after {} attempt(s) (budget {} bytes); continuing with tolerance {tolerance_m} m",
        attempts.len(),
        budget.bytes()
    );

    Ok((
        simplified,
        SimplificationResultMeta {
            tolerance_m,
            simplified: true,
            success: false,
            final_size_bytes: size_bytes,
            format,
            attempts,
        },
    ))
}

/// Simplifies every part of `aoi` at `tolerance_m` metres on the Conus
/// Albers plane.
///
/// # Errors
///
/// Returns [`AoiError::Projection`] if a coordinate cannot be projected.
pub fn simplify_aoi(aoi: &AreaOfInterest, tolerance_m: f64) -> Result<AreaOfInterest, AoiError> {
    let albers = AlbersEqualArea::conus();

    let parts = aoi
        .parts()
        .iter()
        .map(|part| {
            let projected = albers.project_polygon(part)?;
            albers.unproject_polygon(&simplify_polygon(&projected, tolerance_m))
        })
        .collect::<Result<Vec<_>, AoiError>>()?;

    aoi.derive(parts)
}

/// Topology-preserving simplification of one planar polygon.
///
/// Rings are simplified independently with Ramer-Douglas-Peucker. A
/// simplified segment that crosses another segment, or that would sweep
/// another vertex of the polygon onto the wrong side of its ring, gets back
/// the input vertex farthest from it. Rings keep at least four coordinates.
/// The checks repeat until no segment offends, so only the neighbourhood of
/// a conflict keeps its detail.
#[must_use]
pub fn simplify_polygon(polygon: &Polygon<f64>, tolerance_m: f64) -> Polygon<f64> {
    let mut rings: Vec<SimplifiedRing<'_>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| SimplifiedRing::new(ring, tolerance_m))
        .collect();

    loop {
        let current: Vec<LineString<f64>> = rings.iter().map(SimplifiedRing::current).collect();
        let sections: Vec<Vec<&[Coord<f64>]>> = rings.iter().map(SimplifiedRing::sections).collect();

        let mut offending = topology::conflicting_segments(&current);
        offending.extend(topology::swallowing_segments(&current, &sections));

        // Highest segment first so earlier indices of a ring stay valid.
        let mut restored = 0_usize;
        for (ring, segment) in offending.into_iter().rev() {
            if rings[ring].split(segment) {
                restored += 1;
            }
        }
        if restored == 0 {
            break;
        }
        log::debug!("Restored {restored} vertex(es) to keep the polygon valid");
    }

    let mut rings: Vec<LineString<f64>> = rings.iter().map(SimplifiedRing::current).collect();
    let interiors = rings.split_off(1);
    let exterior = rings.remove(0);
    Polygon::new(exterior, interiors)
}

/// A ring as the indices of the input coordinates it keeps.
struct SimplifiedRing<'a> {
    input: &'a LineString<f64>,
    kept: Vec<usize>,
}

impl<'a> SimplifiedRing<'a> {
    fn new(input: &'a LineString<f64>, tolerance_m: f64) -> Self {
        let mut ring = Self {
            input,
            kept: input.simplify_idx(&tolerance_m),
        };
        while ring.kept.len() < MIN_RING_COORDS && ring.split_farthest() {}
        ring
    }

    fn current(&self) -> LineString<f64> {
        self.kept.iter().map(|&i| self.input.0[i]).collect()
    }

    /// Input coordinates replaced by each kept segment, endpoints included.
    fn sections(&self) -> Vec<&'a [Coord<f64>]> {
        let input: &'a [Coord<f64>] = &self.input.0;
        self.kept
            .windows(2)
            .map(|pair| &input[pair[0]..=pair[1]])
            .collect()
    }

    /// The dropped vertex of `segment` farthest from it, with its distance.
    fn farthest_dropped(&self, segment: usize) -> Option<(usize, f64)> {
        let (start, end) = (self.kept[segment], self.kept[segment + 1]);
        let coords = &self.input.0;
        (start + 1..end)
            .map(|i| (i, segment_distance(coords[i], coords[start], coords[end])))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Puts back the farthest dropped vertex of `segment`. Returns `false`
    /// if the segment already follows the input.
    fn split(&mut self, segment: usize) -> bool {
        if segment + 1 >= self.kept.len() {
            return false;
        }
        match self.farthest_dropped(segment) {
            Some((index, _)) => {
                self.kept.insert(segment + 1, index);
                true
            }
            None => false,
        }
    }

    fn split_farthest(&mut self) -> bool {
        let best = (0..self.kept.len().saturating_sub(1))
            .filter_map(|segment| {
                self.farthest_dropped(segment)
                    .map(|(_, distance)| (segment, distance))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        best.is_some_and(|(segment, _)| self.split(segment))
    }
}

/// Distance from `p` to the segment `a`-`b`.
fn segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let d = b - a;
    let length_sq = d.x.mul_add(d.x, d.y * d.y);
    if length_sq <= 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = ((p.x - a.x).mul_add(d.x, (p.y - a.y) * d.y) / length_sq).clamp(0.0, 1.0);
    (p.x - t.mul_add(d.x, a.x)).hypot(p.y - t.mul_add(d.y, a.y))
}
