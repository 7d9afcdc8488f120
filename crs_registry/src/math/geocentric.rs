//! Conversion between geographic and geocentric cartesian coordinates.

use crate::model::Ellipsoid;

/// Geographic (degrees, metres) to geocentric X, Y, Z (metres).
pub fn to_geocentric(ellipsoid: &Ellipsoid, lon: f64, lat: f64, h: f64) -> [f64; 3] {
    let a = ellipsoid.semi_major_axis;
    let e2 = ellipsoid.eccentricity_squared();
    let (lam, phi) = (lon.to_radians(), lat.to_radians());
    let (sin_phi, cos_phi) = phi.sin_cos();
    let nu = a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    [
        (nu + h) * cos_phi * lam.cos(),
        (nu + h) * cos_phi * lam.sin(),
        (nu * (1.0 - e2) + h) * sin_phi,
    ]
}

/// Geocentric to geographic, iterating on latitude until it settles.
pub fn from_geocentric(ellipsoid: &Ellipsoid, xyz: [f64; 3]) -> (f64, f64, f64) {
    let a = ellipsoid.semi_major_axis;
    let e2 = ellipsoid.eccentricity_squared();
    let [x, y, z] = xyz;
    let p = x.hypot(y);
    let lam = y.atan2(x);
    if p < 1e-9 {
        let b = ellipsoid.semi_minor_axis();
        return (lam.to_degrees(), 90f64.copysign(z), z.abs() - b);
    }
    let mut phi = z.atan2(p * (1.0 - e2));
    for _ in 0..20 {
        let sin_phi = phi.sin();
        let nu = a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let h = p / phi.cos() - nu;
        let next = z.atan2(p * (1.0 - e2 * nu / (nu + h)));
        let done = (next - phi).abs() < 1e-14;
        phi = next;
        if done {
            break;
        }
    }
    let sin_phi = phi.sin();
    let nu = a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let h = p / phi.cos() - nu;
    (lam.to_degrees(), phi.to_degrees(), h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip() {
        let wgs84 = Ellipsoid::wgs84();
        let xyz = to_geocentric(&wgs84, 2.12955, 53.80939444, 73.0);
        let (lon, lat, h) = from_geocentric(&wgs84, xyz);
        assert_abs_diff_eq!(lon, 2.12955, epsilon = 1e-11);
        assert_abs_diff_eq!(lat, 53.80939444, epsilon = 1e-11);
        assert_abs_diff_eq!(h, 73.0, epsilon = 1e-6);
    }

    #[test]
    fn equator_and_pole() {
        let wgs84 = Ellipsoid::wgs84();
        let [x, y, z] = to_geocentric(&wgs84, 0.0, 0.0, 0.0);
        assert_abs_diff_eq!(x, 6_378_137.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(z, 0.0, epsilon = 1e-6);
        let (_, lat, h) = from_geocentric(&wgs84, [0.0, 0.0, wgs84.semi_minor_axis() + 10.0]);
        assert_abs_diff_eq!(lat, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h, 10.0, epsilon = 1e-6);
    }
}
