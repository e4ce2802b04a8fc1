//! Albers equal-area conic projection on the GRS80 ellipsoid.
//!
//! Simplification tolerances are in metres, so AOIs are moved onto a
//! projected plane before vertices are dropped and moved back afterwards.
//! NAD83 / Conus Albers (EPSG:5070) is used for every AOI. It is accurate
//! over the contiguous US, where the source data lives. Elsewhere it stays
//! finite but distorted, and longitudes wrap at 84°E, opposite the -96°
//! central meridian: a polygon crossing that meridian is torn apart on the
//! plane and cannot be simplified meaningfully.
//!
//! Formulas follow Snyder, *Map Projections: A Working Manual* (USGS PP 1395),
//! equations 14-1 to 14-21 and 3-16.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::{Coord, MapCoords, Polygon};

use crate::AoiError;

/// EPSG code of NAD83 / Conus Albers.
pub const CONUS_ALBERS_EPSG: u32 = 5070;

const GRS80_SEMI_MAJOR_M: f64 = 6_378_137.0;
const GRS80_INVERSE_FLATTENING: f64 = 298.257_222_101;

const MAX_INVERSE_ITERATIONS: usize = 25;
const INVERSE_CONVERGENCE_RAD: f64 = 1e-12;

/// An ellipsoidal Albers equal-area conic projection with precomputed
/// constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    q_pole: f64,
}

impl AlbersEqualArea {
    /// Builds a projection from its defining parameters (degrees).
    #[must_use]
    pub fn new(
        semi_major_m: f64,
        inverse_flattening: f64,
        lat_origin: f64,
        lat_1: f64,
        lat_2: f64,
        lon_origin: f64,
    ) -> Self {
        let f = 1.0 / inverse_flattening;
        let e2 = f * (2.0 - f);
        let e = e2.sqrt();

        let phi0 = lat_origin.to_radians();
        let phi1 = lat_1.to_radians();
        let phi2 = lat_2.to_radians();

        let m1 = m(e2, phi1);
        let m2 = m(e2, phi2);
        let q0 = q(e, e2, phi0);
        let q1 = q(e, e2, phi1);
        let q2 = q(e, e2, phi2);

        let n = if (phi1 - phi2).abs() > f64::EPSILON {
            m1.mul_add(m1, -(m2 * m2)) / (q2 - q1)
        } else {
            phi1.sin()
        };
        let c = n.mul_add(q1, m1 * m1);
        let rho0 = semi_major_m * n.mul_add(-q0, c).sqrt() / n;

        Self {
            a: semi_major_m,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: lon_origin.to_radians(),
            q_pole: q(e, e2, FRAC_PI_2),
        }
    }

    /// NAD83 / Conus Albers (EPSG:5070).
    #[must_use]
    pub fn conus() -> Self {
        Self::new(
            GRS80_SEMI_MAJOR_M,
            GRS80_INVERSE_FLATTENING,
            23.0,
            29.5,
            45.5,
            -96.0,
        )
    }

    /// Projects a longitude/latitude pair (degrees) to metres.
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let lambda = wrap_pi(lon.to_radians() - self.lon0);

        let rho = self.a * self.n.mul_add(-q(self.e, self.e2, phi), self.c).max(0.0).sqrt() / self.n;
        let theta = self.n * lambda;

        (rho * theta.sin(), rho.mul_add(-theta.cos(), self.rho0))
    }

    /// Inverts [`Self::forward`], returning longitude/latitude in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Projection`] if the coordinate is not finite or
    /// the latitude iteration does not converge.
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), AoiError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(AoiError::Projection {
                message: format!("non-finite projected coordinate ({x}, {y})"),
            });
        }

        let dy = self.rho0 - y;
        let rho = x.hypot(dy);
        let theta = x.atan2(dy);

        let q = (self.c - (rho * self.n / self.a).powi(2)) / self.n;
        let phi = self.latitude_from_q(q)?;
        let lambda = wrap_pi(self.lon0 + theta / self.n);

        Ok((lambda.to_degrees(), phi.to_degrees()))
    }

    /// Projects every coordinate of a polygon.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Projection`] for non-finite input coordinates.
    pub fn project_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>, AoiError> {
        polygon.try_map_coords(|c| {
            if !c.x.is_finite() || !c.y.is_finite() {
                return Err(AoiError::Projection {
                    message: format!("non-finite coordinate ({}, {})", c.x, c.y),
                });
            }
            let (x, y) = self.forward(c.x, c.y);
            Ok(Coord { x, y })
        })
    }

    /// Inverse-projects every coordinate of a polygon.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Projection`] if any coordinate fails to invert.
    pub fn unproject_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>, AoiError> {
        polygon.try_map_coords(|c| {
            let (x, y) = self.inverse(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }

    /// Snyder 3-16, iterated from the spherical estimate.
    fn latitude_from_q(&self, q_value: f64) -> Result<f64, AoiError> {
        if q_value.abs() >= self.q_pole {
            return Ok(FRAC_PI_2.copysign(q_value));
        }

        let mut phi = (q_value / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..MAX_INVERSE_ITERATIONS {
            let sin_phi = phi.sin();
            let es = self.e * sin_phi;
            let one_minus = es.mul_add(-es, 1.0);

            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q_value / (1.0 - self.e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * self.e)) * ((1.0 - es) / (1.0 + es)).ln());
            phi += delta;

            if delta.abs() < INVERSE_CONVERGENCE_RAD {
                return Ok(phi);
            }
        }

        Err(AoiError::Projection {
            message: format!("latitude did not converge for q = {q_value}"),
        })
    }
}

/// Snyder 14-15.
fn m(e2: f64, phi: f64) -> f64 {
    let sin_phi = phi.sin();
    phi.cos() / (e2 * sin_phi).mul_add(-sin_phi, 1.0).sqrt()
}

/// Snyder 3-12.
fn q(e: f64, e2: f64, phi: f64) -> f64 {
    let sin_phi = phi.sin();
    let es = e * sin_phi;
    (1.0 - e2) * (sin_phi / es.mul_add(-es, 1.0) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

fn wrap_pi(angle: f64) -> f64 {
    if (-PI..=PI).contains(&angle) {
        angle
    } else {
        (angle + PI).rem_euclid(2.0 * PI) - PI
    }
}
