//! Standard and abridged Molodensky datum shifts, applied directly on
//! geographic coordinates without passing through geocentric space.

use crate::model::Ellipsoid;

#[derive(Debug, Clone, PartialEq)]
pub struct Molodensky {
    pub translation: [f64; 3],
    pub source: Ellipsoid,
    pub target: Ellipsoid,
    pub abridged: bool,
}

impl Molodensky {
    /// Approximate inverse: negated translations between swapped ellipsoids.
    pub fn inverse(&self) -> Self {
        let [dx, dy, dz] = self.translation;
        Self {
            translation: [-dx, -dy, -dz],
            source: self.target.clone(),
            target: self.source.clone(),
            abridged: self.abridged,
        }
    }

    /// Shifts a position given in degrees and metres.
    pub fn apply(&self, lon: f64, lat: f64, h: f64) -> (f64, f64, f64) {
        let [dx, dy, dz] = self.translation;
        let a = self.source.semi_major_axis;
        let f = self.source.flattening();
        let da = self.target.semi_major_axis - a;
        let df = self.target.flattening() - f;
        let e2 = self.source.eccentricity_squared();
        let b = self.source.semi_minor_axis();

        let (lam, phi) = (lon.to_radians(), lat.to_radians());
        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_lam, cos_lam) = lam.sin_cos();
        let w = 1.0 - e2 * sin_phi * sin_phi;
        let nu = a / w.sqrt();
        let rho = a * (1.0 - e2) / w.powf(1.5);

        let (dphi, dlam, dh) = if self.abridged {
            let k = a * df + f * da;
            (
                (-dx * sin_phi * cos_lam - dy * sin_phi * sin_lam + dz * cos_phi
                    + k * (2.0 * phi).sin())
                    / rho,
                (-dx * sin_lam + dy * cos_lam) / (nu * cos_phi),
                dx * cos_phi * cos_lam + dy * cos_phi * sin_lam + dz * sin_phi
                    + k * sin_phi * sin_phi
                    - da,
            )
        } else {
            (
                (-dx * sin_phi * cos_lam - dy * sin_phi * sin_lam
                    + dz * cos_phi
                    + da * (nu * e2 * sin_phi * cos_phi) / a
                    + df * (rho * a / b + nu * b / a) * sin_phi * cos_phi)
                    / (rho + h),
                (-dx * sin_lam + dy * cos_lam) / ((nu + h) * cos_phi),
                dx * cos_phi * cos_lam + dy * cos_phi * sin_lam + dz * sin_phi - da * a / nu
                    + df * b / a * nu * sin_phi * sin_phi,
            )
        };
        (lon + dlam.to_degrees(), lat + dphi.to_degrees(), h + dh)
    }
}
