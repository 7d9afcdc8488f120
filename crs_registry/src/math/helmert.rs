//! Seven-parameter (Bursa-Wolf) similarity transform between geocentric frames.

use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use super::ARC_SECOND;

/// Translations in metres, rotations in arc-seconds using the position
/// vector convention, scale difference in parts per million.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BursaWolf {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub ds: f64,
}

impl BursaWolf {
    pub fn translation(tx: f64, ty: f64, tz: f64) -> Self {
        Self {
            tx,
            ty,
            tz,
            ..Default::default()
        }
    }

    /// Parameters published with the coordinate frame rotation convention.
    pub fn from_coordinate_frame(mut self) -> Self {
        self.rx = -self.rx;
        self.ry = -self.ry;
        self.rz = -self.rz;
        self
    }

    pub fn is_translation_only(&self) -> bool {
        self.rx == 0.0 && self.ry == 0.0 && self.rz == 0.0 && self.ds == 0.0
    }

    pub fn is_identity(&self) -> bool {
        self.is_translation_only() && self.tx == 0.0 && self.ty == 0.0 && self.tz == 0.0
    }

    pub fn negate(&self) -> Self {
        Self {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            rx: -self.rx,
            ry: -self.ry,
            rz: -self.rz,
            ds: -self.ds,
        }
    }

    fn matrix(&self) -> Matrix3<f64> {
        let (rx, ry, rz) = (self.rx * ARC_SECOND, self.ry * ARC_SECOND, self.rz * ARC_SECOND);
        let rotation = Matrix3::new(1.0, -rz, ry, rz, 1.0, -rx, -ry, rx, 1.0);
        rotation * (1.0 + self.ds * 1e-6)
    }

    fn translation_vector(&self) -> Vector3<f64> {
        Vector3::new(self.tx, self.ty, self.tz)
    }

    pub fn apply(&self, xyz: [f64; 3]) -> [f64; 3] {
        let v = self.matrix() * Vector3::from(xyz) + self.translation_vector();
        [v.x, v.y, v.z]
    }

    /// Exact inverse of [`BursaWolf::apply`].
    pub fn apply_inverse(&self, xyz: [f64; 3]) -> [f64; 3] {
        let shifted = Vector3::from(xyz) - self.translation_vector();
        let v = match self.matrix().try_inverse() {
            Some(inverse) => inverse * shifted,
            None => shifted,
        };
        [v.x, v.y, v.z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn wgs72_to_wgs84() -> BursaWolf {
        BursaWolf {
            tz: 4.5,
            rz: 0.554,
            ds: 0.219,
            ..Default::default()
        }
    }

    #[test]
    fn position_vector_reference_point() {
        let out = wgs72_to_wgs84().apply([3_657_660.66, 255_768.55, 5_201_382.11]);
        assert_abs_diff_eq!(out[0], 3_657_660.78, epsilon = 0.01);
        assert_abs_diff_eq!(out[1], 255_778.43, epsilon = 0.01);
        assert_abs_diff_eq!(out[2], 5_201_387.75, epsilon = 0.01);
    }

    #[test]
    fn inverse_undoes_forward() {
        let p = wgs72_to_wgs84();
        let input = [3_657_660.66, 255_768.55, 5_201_382.11];
        let back = p.apply_inverse(p.apply(input));
        for i in 0..3 {
            assert_abs_diff_eq!(back[i], input[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn coordinate_frame_flips_rotations() {
        let cf = BursaWolf {
            rx: 1.0,
            ry: -2.0,
            rz: 3.0,
            ..Default::default()
        }
        .from_coordinate_frame();
        assert_eq!((cf.rx, cf.ry, cf.rz), (-1.0, 2.0, -3.0));
        assert!(!cf.is_translation_only());
        assert!(BursaWolf::translation(1.0, 0.0, 0.0).is_translation_only());
    }
}
