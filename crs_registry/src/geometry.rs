//! Positions and bounding boxes tagged with the reference system they are
//! expressed in.

use std::sync::Arc;

use geo_types::{Coord, Rect};

use crate::error::{CrsError, Result};
use crate::model::Crs;

/// A coordinate tuple; ordinates follow the axis order of `crs`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectPosition {
    pub crs: Option<Arc<Crs>>,
    pub ordinates: Vec<f64>,
}

impl DirectPosition {
    pub fn new(crs: Arc<Crs>, ordinates: Vec<f64>) -> Self {
        Self {
            crs: Some(crs),
            ordinates,
        }
    }

    /// A position without reference system; it cannot be transformed.
    pub fn untagged(ordinates: Vec<f64>) -> Self {
        Self {
            crs: None,
            ordinates,
        }
    }

    pub fn dimension(&self) -> usize {
        self.ordinates.len()
    }

    /// The first two ordinates as a `geo-types` coordinate.
    pub fn to_coord(&self) -> Option<Coord<f64>> {
        match self.ordinates.as_slice() {
            [x, y, ..] => Some(Coord { x: *x, y: *y }),
            _ => None,
        }
    }

    pub fn from_coord(crs: Arc<Crs>, coord: Coord<f64>) -> Self {
        Self::new(crs, vec![coord.x, coord.y])
    }
}

/// Axis-aligned box; `lower[i] <= upper[i]` for every axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub crs: Option<Arc<Crs>>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Envelope {
    /// Corner order is normalized, so swapped bounds are accepted.
    pub fn new(crs: Arc<Crs>, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(CrsError::MismatchedDimension {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        let (lower, upper): (Vec<f64>, Vec<f64>) = lower
            .iter()
            .zip(&upper)
            .map(|(a, b)| (a.min(*b), a.max(*b)))
            .unzip();
        Ok(Self {
            crs: Some(crs),
            lower,
            upper,
        })
    }

    /// An envelope containing nothing, to be grown with [`Envelope::include`].
    pub fn empty(crs: Option<Arc<Crs>>, dimension: usize) -> Self {
        Self {
            crs,
            lower: vec![f64::INFINITY; dimension],
            upper: vec![f64::NEG_INFINITY; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.iter().zip(&self.upper).any(|(l, u)| l > u)
    }

    pub fn include(&mut self, ordinates: &[f64]) {
        for (i, v) in ordinates.iter().enumerate().take(self.dimension()) {
            self.lower[i] = self.lower[i].min(*v);
            self.upper[i] = self.upper[i].max(*v);
        }
    }

    pub fn contains(&self, ordinates: &[f64]) -> bool {
        ordinates.len() == self.dimension()
            && ordinates
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (l, u))| v >= l && v <= u)
    }

    /// All `2^n` corners.
    pub fn corners(&self) -> Result<impl Iterator<Item = Vec<f64>> + '_> {
        self.lattice(1)
    }

    /// `(steps + 1)^n` points spread evenly over the box, corners included.
    /// Points are produced lazily; a count that does not fit in `usize`
    /// is rejected.
    pub fn lattice(&self, steps: usize) -> Result<impl Iterator<Item = Vec<f64>> + '_> {
        let steps = steps.max(1);
        let n = self.dimension();
        let too_many = || CrsError::TooManyPoints { steps, dimension: n };
        let per_axis = steps.checked_add(1).ok_or_else(too_many)?;
        let total = u32::try_from(n)
            .ok()
            .and_then(|n| per_axis.checked_pow(n))
            .ok_or_else(too_many)?;
        Ok((0..total).map(move |mut index| {
            (0..n)
                .map(|i| {
                    let k = index % per_axis;
                    index /= per_axis;
                    self.lower[i] + (self.upper[i] - self.lower[i]) * k as f64 / steps as f64
                })
                .collect()
        }))
    }

    pub fn to_rect(&self) -> Option<Rect<f64>> {
        if self.dimension() < 2 || self.is_empty() {
            return None;
        }
        Some(Rect::new(
            Coord { x: self.lower[0], y: self.lower[1] },
            Coord { x: self.upper[0], y: self.upper[1] },
        ))
    }

    pub fn from_rect(crs: Arc<Crs>, rect: Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self {
            crs: Some(crs),
            lower: vec![min.x, min.y],
            upper: vec![max.x, max.y],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crs() -> Arc<Crs> {
        Arc::new(Crs::crs84())
    }

    #[test]
    fn corners_of_a_box() {
        let env = Envelope::new(crs(), vec![0.0, 10.0], vec![1.0, 11.0]).unwrap();
        let corners: Vec<_> = env.corners().unwrap().collect();
        assert_eq!(corners.len(), 4);
        assert!(corners.contains(&vec![0.0, 11.0]));
        assert!(corners.contains(&vec![1.0, 10.0]));
        let lattice: Vec<_> = env.lattice(2).unwrap().collect();
        assert_eq!(lattice.len(), 9);
        assert!(lattice.contains(&vec![0.5, 10.5]));
    }

    #[test]
    fn oversized_point_sets_are_rejected() {
        let wide = Envelope::new(crs(), vec![0.0; 64], vec![1.0; 64]).unwrap();
        assert!(matches!(
            wide.corners(),
            Err(CrsError::TooManyPoints { steps: 1, dimension: 64 })
        ));
        let env = Envelope::new(crs(), vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(env.lattice(usize::MAX), Err(CrsError::TooManyPoints { .. })));
        assert!(matches!(env.lattice(1 << 33), Err(CrsError::TooManyPoints { .. })));
    }

    #[test]
    fn swapped_bounds_and_membership() {
        let env = Envelope::new(crs(), vec![5.0, 2.0], vec![-5.0, -2.0]).unwrap();
        assert_eq!(env.lower, vec![-5.0, -2.0]);
        assert!(env.contains(&[0.0, 0.0]));
        assert!(!env.contains(&[0.0, 3.0]));
        assert!(Envelope::new(crs(), vec![0.0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn grows_from_empty() {
        let mut env = Envelope::empty(None, 2);
        assert!(env.is_empty());
        env.include(&[1.0, 2.0]);
        env.include(&[-1.0, 4.0]);
        assert_eq!((env.lower.clone(), env.upper.clone()), (vec![-1.0, 2.0], vec![1.0, 4.0]));
    }

    #[test]
    fn geo_types_interop() {
        let rect = Rect::new(Coord { x: 3.0, y: 4.0 }, Coord { x: 1.0, y: 2.0 });
        let env = Envelope::from_rect(crs(), rect);
        assert_eq!(env.lower, vec![1.0, 2.0]);
        assert_eq!(env.to_rect(), Some(rect));
        let pos = DirectPosition::from_coord(crs(), Coord { x: 7.0, y: 8.0 });
        assert_eq!(pos.to_coord(), Some(Coord { x: 7.0, y: 8.0 }));
        assert_eq!(DirectPosition::untagged(vec![1.0]).to_coord(), None);
    }
}
