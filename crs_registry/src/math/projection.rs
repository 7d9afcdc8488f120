//! Map projections used by projected reference systems.
//!
//! Inputs and outputs are normalized: longitude/latitude in degrees east of
//! Greenwich, easting/northing in metres.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::Serialize;

use crate::error::{CrsError, Result};
use crate::model::{Ellipsoid, ParameterValue};

pub const LATITUDE_OF_ORIGIN: i32 = 8801;
pub const CENTRAL_MERIDIAN: i32 = 8802;
pub const SCALE_FACTOR: i32 = 8805;
pub const FALSE_EASTING: i32 = 8806;
pub const FALSE_NORTHING: i32 = 8807;
pub const STANDARD_PARALLEL: i32 = 8823;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProjectionMethod {
    TransverseMercator,
    Mercator1Sp,
    PseudoMercator,
    Orthographic,
    EquidistantCylindrical,
}

impl ProjectionMethod {
    pub fn from_epsg(code: i32) -> Option<Self> {
        match code {
            9807 => Some(ProjectionMethod::TransverseMercator),
            9804 => Some(ProjectionMethod::Mercator1Sp),
            1024 => Some(ProjectionMethod::PseudoMercator),
            9840 => Some(ProjectionMethod::Orthographic),
            1029 => Some(ProjectionMethod::EquidistantCylindrical),
            _ => None,
        }
    }

    pub fn epsg_code(&self) -> i32 {
        match self {
            ProjectionMethod::TransverseMercator => 9807,
            ProjectionMethod::Mercator1Sp => 9804,
            ProjectionMethod::PseudoMercator => 1024,
            ProjectionMethod::Orthographic => 9840,
            ProjectionMethod::EquidistantCylindrical => 1029,
        }
    }

    /// Parameters a conversion using this method must define.
    pub fn required_parameters(&self) -> &'static [i32] {
        match self {
            ProjectionMethod::TransverseMercator | ProjectionMethod::Mercator1Sp => &[
                LATITUDE_OF_ORIGIN,
                CENTRAL_MERIDIAN,
                SCALE_FACTOR,
                FALSE_EASTING,
                FALSE_NORTHING,
            ],
            ProjectionMethod::PseudoMercator | ProjectionMethod::Orthographic => {
                &[LATITUDE_OF_ORIGIN, CENTRAL_MERIDIAN, FALSE_EASTING, FALSE_NORTHING]
            }
            ProjectionMethod::EquidistantCylindrical => {
                &[STANDARD_PARALLEL, CENTRAL_MERIDIAN, FALSE_EASTING, FALSE_NORTHING]
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProjectionMethod::TransverseMercator => "Transverse Mercator",
            ProjectionMethod::Mercator1Sp => "Mercator (variant A)",
            ProjectionMethod::PseudoMercator => "Popular Visualisation Pseudo Mercator",
            ProjectionMethod::Orthographic => "Orthographic",
            ProjectionMethod::EquidistantCylindrical => "Equidistant Cylindrical (Spherical)",
        }
    }
}

/// A projection bound to an ellipsoid and a parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    method: ProjectionMethod,
    a: f64,
    e2: f64,
    lat0: f64,
    lon0: f64,
    k0: f64,
    false_easting: f64,
    false_northing: f64,
    lat1: f64,
}

impl Projection {
    /// `prime_meridian` is the Greenwich longitude of the base CRS's prime
    /// meridian; the projection's central meridian is relative to it.
    pub fn new(
        method: ProjectionMethod,
        ellipsoid: &Ellipsoid,
        prime_meridian: f64,
        parameters: &[ParameterValue],
    ) -> Self {
        let get = |code: i32, default: f64| {
            parameters
                .iter()
                .find(|p| p.code == code)
                .map(|p| p.value)
                .unwrap_or(default)
        };
        Self {
            method,
            a: ellipsoid.semi_major_axis,
            e2: ellipsoid.eccentricity_squared(),
            lat0: get(LATITUDE_OF_ORIGIN, 0.0).to_radians(),
            lon0: (get(CENTRAL_MERIDIAN, 0.0) + prime_meridian).to_radians(),
            k0: get(SCALE_FACTOR, 1.0),
            false_easting: get(FALSE_EASTING, 0.0),
            false_northing: get(FALSE_NORTHING, 0.0),
            lat1: get(STANDARD_PARALLEL, 0.0).to_radians(),
        }
    }

    pub fn method(&self) -> ProjectionMethod {
        self.method
    }

    /// Projects a geographic position (degrees) to easting/northing (metres).
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let lam = lon.to_radians();
        let phi = lat.to_radians();
        let (x, y) = match self.method {
            ProjectionMethod::TransverseMercator => self.tm_forward(lam, phi),
            ProjectionMethod::Mercator1Sp => {
                if phi.abs() >= FRAC_PI_2 {
                    return Err(self.outside(lon, lat));
                }
                let e = self.e2.sqrt();
                let es = e * phi.sin();
                let y = ((FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).ln();
                (self.a * self.k0 * self.delta_lambda(lam), self.a * self.k0 * y)
            }
            ProjectionMethod::PseudoMercator => {
                if phi.abs() >= FRAC_PI_2 {
                    return Err(self.outside(lon, lat));
                }
                (
                    self.a * self.delta_lambda(lam),
                    self.a * (FRAC_PI_4 + phi / 2.0).tan().ln(),
                )
            }
            ProjectionMethod::Orthographic => {
                let dlam = self.delta_lambda(lam);
                let cos_c = self.lat0.sin() * phi.sin() + self.lat0.cos() * phi.cos() * dlam.cos();
                if cos_c < 0.0 {
                    return Err(self.outside(lon, lat));
                }
                (
                    self.a * phi.cos() * dlam.sin(),
                    self.a * (self.lat0.cos() * phi.sin() - self.lat0.sin() * phi.cos() * dlam.cos()),
                )
            }
            ProjectionMethod::EquidistantCylindrical => (
                self.a * self.delta_lambda(lam) * self.lat1.cos(),
                self.a * (phi - self.lat0),
            ),
        };
        Ok((x + self.false_easting, y + self.false_northing))
    }

    /// Inverse of [`Projection::forward`].
    pub fn inverse(&self, easting: f64, northing: f64) -> Result<(f64, f64)> {
        let x = easting - self.false_easting;
        let y = northing - self.false_northing;
        let (lam, phi) = match self.method {
            ProjectionMethod::TransverseMercator => self.tm_inverse(x, y),
            ProjectionMethod::Mercator1Sp => {
                let t = (-y / (self.a * self.k0)).exp();
                let chi = FRAC_PI_2 - 2.0 * t.atan();
                let e2 = self.e2;
                let (e4, e6, e8) = (e2 * e2, e2 * e2 * e2, e2 * e2 * e2 * e2);
                let phi = chi
                    + (e2 / 2.0 + 5.0 * e4 / 24.0 + e6 / 12.0 + 13.0 * e8 / 360.0) * (2.0 * chi).sin()
                    + (7.0 * e4 / 48.0 + 29.0 * e6 / 240.0 + 811.0 * e8 / 11520.0) * (4.0 * chi).sin()
                    + (7.0 * e6 / 120.0 + 81.0 * e8 / 1120.0) * (6.0 * chi).sin()
                    + (4279.0 * e8 / 161280.0) * (8.0 * chi).sin();
                (x / (self.a * self.k0) + self.lon0, phi)
            }
            ProjectionMethod::PseudoMercator => (
                x / self.a + self.lon0,
                FRAC_PI_2 - 2.0 * (-y / self.a).exp().atan(),
            ),
            ProjectionMethod::Orthographic => {
                let rho = x.hypot(y);
                if rho > self.a {
                    return Err(self.outside(easting, northing));
                }
                if rho == 0.0 {
                    (self.lon0, self.lat0)
                } else {
                    let c = (rho / self.a).asin();
                    let phi = (c.cos() * self.lat0.sin() + y * c.sin() * self.lat0.cos() / rho).asin();
                    let lam = self.lon0
                        + (x * c.sin()).atan2(rho * c.cos() * self.lat0.cos() - y * c.sin() * self.lat0.sin());
                    (lam, phi)
                }
            }
            ProjectionMethod::EquidistantCylindrical => (
                x / (self.a * self.lat1.cos()) + self.lon0,
                y / self.a + self.lat0,
            ),
        };
        Ok((normalize_longitude(lam.to_degrees()), phi.to_degrees()))
    }

    /// Longitude from the central meridian, in radians within `[-pi, pi]`.
    fn delta_lambda(&self, lam: f64) -> f64 {
        normalize_longitude((lam - self.lon0).to_degrees()).to_radians()
    }

    fn outside(&self, longitude: f64, latitude: f64) -> CrsError {
        CrsError::OutsideProjection {
            method: self.method.name().to_string(),
            longitude,
            latitude,
        }
    }

    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let (e4, e6) = (e2 * e2, e2 * e2 * e2);
        self.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    fn tm_forward(&self, lam: f64, phi: f64) -> (f64, f64) {
        let ep2 = self.e2 / (1.0 - self.e2);
        let (sin_phi, cos_phi) = phi.sin_cos();
        let t = phi.tan().powi(2);
        let c = ep2 * cos_phi * cos_phi;
        let a = self.delta_lambda(lam) * cos_phi;
        let nu = self.a / (1.0 - self.e2 * sin_phi * sin_phi).sqrt();
        let m = self.meridian_arc(phi);
        let m0 = self.meridian_arc(self.lat0);
        let x = self.k0
            * nu
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);
        let y = self.k0
            * (m - m0
                + nu * phi.tan()
                    * (a * a / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
        (x, y)
    }

    fn tm_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = self.e2;
        let (e4, e6) = (e2 * e2, e2 * e2 * e2);
        let ep2 = e2 / (1.0 - e2);
        let m1 = self.meridian_arc(self.lat0) + y / self.k0;
        let mu = m1 / (self.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();
        let (sin1, cos1) = phi1.sin_cos();
        let w = 1.0 - e2 * sin1 * sin1;
        let nu1 = self.a / w.sqrt();
        let rho1 = self.a * (1.0 - e2) / w.powf(1.5);
        let t1 = phi1.tan().powi(2);
        let c1 = ep2 * cos1 * cos1;
        let d = x / (nu1 * self.k0);
        let phi = phi1
            - (nu1 * phi1.tan() / rho1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lam = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
                    / 120.0)
                / cos1;
        (lam, phi)
    }
}

/// Wraps a longitude in degrees into `[-180, 180]`.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}
