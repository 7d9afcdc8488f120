//! Resolved transforms and their execution.
//!
//! A [`Transform`] is a pipeline of [`Step`]s over a three-slot working
//! buffer. Native ordinates enter in the source CRS axis order; the first
//! step normalizes them to longitude/latitude in degrees east of Greenwich
//! (or easting/northing in metres) plus a height in metres, and the last
//! step maps the buffer to the target axis order.

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use crate::error::{CrsError, Result};
use crate::geometry::{DirectPosition, Envelope};
use crate::grid::DatumShiftGrid;
use crate::math::geocentric::{from_geocentric, to_geocentric};
use crate::math::molodensky::Molodensky;
use crate::math::{BursaWolf, Projection};
use crate::model::{self, Crs, Ellipsoid};

/// Elementary operation on the working buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Affine map `v -> matrix * v + translation`: axis order, direction,
    /// units and prime meridian offsets.
    Axes {
        matrix: Matrix3<f64>,
        translation: Vector3<f64>,
    },
    Project {
        projection: Projection,
        inverse: bool,
    },
    /// Seven-parameter shift through geocentric coordinates. Without height
    /// the position is shifted at zero height and slot 2 is left alone.
    Helmert {
        params: BursaWolf,
        source: Ellipsoid,
        target: Ellipsoid,
        with_height: bool,
        inverse: bool,
    },
    Molodensky {
        params: Molodensky,
        with_height: bool,
    },
    Grid {
        grid: Arc<DatumShiftGrid>,
        inverse: bool,
    },
    /// Runs `secondary` when `primary` reports a position outside its domain.
    Fallback {
        primary: Vec<Step>,
        secondary: Vec<Step>,
    },
}

impl Step {
    pub fn translation(offset: [f64; 3]) -> Self {
        Step::Axes {
            matrix: Matrix3::identity(),
            translation: Vector3::from(offset),
        }
    }

    fn is_identity(&self) -> bool {
        match self {
            Step::Axes {
                matrix,
                translation,
            } => {
                (matrix - Matrix3::identity()).amax() < 1e-15 && translation.amax() < 1e-15
            }
            Step::Helmert {
                params,
                source,
                target,
                ..
            } => params.is_identity() && source.same_figure(target),
            Step::Fallback { primary, secondary } => primary.is_empty() && secondary.is_empty(),
            _ => false,
        }
    }

    pub fn inverse(&self) -> Result<Step> {
        Ok(match self {
            Step::Axes {
                matrix,
                translation,
            } => {
                let inverse = matrix.try_inverse().ok_or_else(|| {
                    CrsError::unsupported("singular axis matrix", "its inverse")
                })?;
                Step::Axes {
                    matrix: inverse,
                    translation: -(inverse * translation),
                }
            }
            Step::Project {
                projection,
                inverse,
            } => Step::Project {
                projection: projection.clone(),
                inverse: !inverse,
            },
            Step::Helmert {
                params,
                source,
                target,
                with_height,
                inverse,
            } => Step::Helmert {
                params: *params,
                source: target.clone(),
                target: source.clone(),
                with_height: *with_height,
                inverse: !inverse,
            },
            Step::Molodensky {
                params,
                with_height,
            } => Step::Molodensky {
                params: params.inverse(),
                with_height: *with_height,
            },
            Step::Grid { grid, inverse } => Step::Grid {
                grid: grid.clone(),
                inverse: !inverse,
            },
            Step::Fallback { primary, secondary } => Step::Fallback {
                primary: invert_steps(primary)?,
                secondary: invert_steps(secondary)?,
            },
        })
    }

    fn apply(&self, v: &mut [f64; 3]) -> Result<()> {
        match self {
            Step::Axes {
                matrix,
                translation,
            } => {
                let out = matrix * Vector3::from(*v) + translation;
                *v = [out.x, out.y, out.z];
            }
            Step::Project {
                projection,
                inverse: false,
            } => {
                let (x, y) = projection.forward(v[0], v[1])?;
                v[0] = x;
                v[1] = y;
            }
            Step::Project {
                projection,
                inverse: true,
            } => {
                let (lon, lat) = projection.inverse(v[0], v[1])?;
                v[0] = lon;
                v[1] = lat;
            }
            Step::Helmert {
                params,
                source,
                target,
                with_height,
                inverse,
            } => {
                let h = if *with_height { v[2] } else { 0.0 };
                let xyz = to_geocentric(source, v[0], v[1], h);
                let xyz = if *inverse {
                    params.apply_inverse(xyz)
                } else {
                    params.apply(xyz)
                };
                let (lon, lat, h) = from_geocentric(target, xyz);
                v[0] = lon;
                v[1] = lat;
                if *with_height {
                    v[2] = h;
                }
            }
            Step::Molodensky {
                params,
                with_height,
            } => {
                let h = if *with_height { v[2] } else { 0.0 };
                let (lon, lat, h) = params.apply(v[0], v[1], h);
                v[0] = lon;
                v[1] = lat;
                if *with_height {
                    v[2] = h;
                }
            }
            Step::Grid { grid, inverse } => {
                let (lon, lat) = if *inverse {
                    grid.inverse(v[0], v[1])?
                } else {
                    grid.forward(v[0], v[1])?
                };
                v[0] = lon;
                v[1] = lat;
            }
            Step::Fallback { primary, secondary } => {
                let mut trial = *v;
                match run(primary, &mut trial) {
                    Ok(()) => *v = trial,
                    Err(CrsError::OutOfDomain { grid, .. }) => {
                        log::debug!("{} does not cover ({}, {}), using fallback", grid, v[0], v[1]);
                        run(secondary, v)?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

fn run(steps: &[Step], v: &mut [f64; 3]) -> Result<()> {
    steps.iter().try_for_each(|step| step.apply(v))
}

pub(crate) fn invert_steps(steps: &[Step]) -> Result<Vec<Step>> {
    steps.iter().rev().map(Step::inverse).collect()
}

/// Merges adjacent axis steps and drops the ones that do nothing.
fn simplify(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    for step in steps {
        if let Step::Axes {
            matrix: m2,
            translation: t2,
        } = &step
        {
            if let Some(Step::Axes {
                matrix: m1,
                translation: t1,
            }) = out.last_mut()
            {
                *t1 = m2 * *t1 + t2;
                *m1 = m2 * *m1;
                continue;
            }
        }
        out.push(step);
    }
    out.retain(|s| !s.is_identity());
    out
}

/// Maps native ordinates of `crs` into the working buffer.
///
/// Each axis lands in the slot of its direction, scaled to degrees or metres
/// and negated for south, west and down axes. Slots no axis claims take the
/// remaining buffer entries unchanged so the map stays invertible.
pub fn normalization(crs: &Crs) -> Step {
    let axes = model::axes(crs);
    let mut matrix = Matrix3::zeros();
    let mut used_slots = [false; 3];
    let mut used_inputs = [false; 3];
    for (i, axis) in axes.iter().enumerate().take(3) {
        let slot = axis.direction.slot();
        matrix[(slot, i)] = axis.direction.sign() * axis.unit.to_canonical();
        used_slots[slot] = true;
        used_inputs[i] = true;
    }
    let mut free_inputs = (0..3).filter(|i| !used_inputs[*i]);
    for slot in 0..3 {
        if !used_slots[slot] {
            if let Some(i) = free_inputs.next() {
                matrix[(slot, i)] = 1.0;
            }
        }
    }
    let mut translation = Vector3::zeros();
    let horizontal = match &crs.kind {
        model::CrsKind::Compound { horizontal, .. } => horizontal.as_ref(),
        _ => crs,
    };
    if let model::CrsKind::Geographic { datum, .. } = &horizontal.kind {
        if let Some(pm) = datum.prime_meridian() {
            translation[0] = pm.greenwich_longitude;
        }
    }
    Step::Axes {
        matrix,
        translation,
    }
}

#[derive(Debug, Clone)]
pub struct Transform {
    source: Arc<Crs>,
    target: Arc<Crs>,
    steps: Vec<Step>,
}

impl Transform {
    pub fn new(source: Arc<Crs>, target: Arc<Crs>, steps: Vec<Step>) -> Self {
        Self {
            source,
            target,
            steps: simplify(steps),
        }
    }

    pub fn identity(crs: Arc<Crs>) -> Self {
        Self::new(crs.clone(), crs, Vec::new())
    }

    pub fn source(&self) -> &Arc<Crs> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Crs> {
        &self.target
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty() && self.source.dimension() == self.target.dimension()
    }

    pub fn inverse(&self) -> Result<Transform> {
        Ok(Self::new(
            self.target.clone(),
            self.source.clone(),
            invert_steps(&self.steps)?,
        ))
    }

    /// `self` followed by `next`; the two must meet on the same CRS.
    pub fn concat(&self, next: &Transform) -> Result<Transform> {
        if !self.target.same_code(&next.source) {
            return Err(CrsError::MismatchedCrs {
                expected: self.target.code.to_string(),
                found: next.source.code.to_string(),
            });
        }
        let steps = self.steps.iter().chain(&next.steps).cloned().collect();
        Ok(Self::new(self.source.clone(), next.target.clone(), steps))
    }

    /// Transforms raw ordinates given in the source axis order.
    pub fn apply(&self, ordinates: &[f64]) -> Result<Vec<f64>> {
        let expected = self.source.dimension();
        if ordinates.len() != expected {
            return Err(CrsError::MismatchedDimension {
                expected,
                found: ordinates.len(),
            });
        }
        let mut v = [0.0; 3];
        v[..expected].copy_from_slice(ordinates);
        run(&self.steps, &mut v)?;
        Ok(v[..self.target.dimension()].to_vec())
    }

    fn check_crs(&self, crs: &Option<Arc<Crs>>) -> Result<()> {
        let crs = crs.as_ref().ok_or(CrsError::MissingCrs)?;
        if !crs.same_code(&self.source) {
            return Err(CrsError::MismatchedCrs {
                expected: self.source.code.to_string(),
                found: crs.code.to_string(),
            });
        }
        Ok(())
    }

    pub fn transform_position(&self, position: &DirectPosition) -> Result<DirectPosition> {
        self.check_crs(&position.crs)?;
        Ok(DirectPosition::new(
            self.target.clone(),
            self.apply(&position.ordinates)?,
        ))
    }

    /// Bounding box of the transformed corners.
    pub fn transform_envelope(&self, envelope: &Envelope) -> Result<Envelope> {
        self.check_envelope(envelope)?;
        self.transform_points(envelope.corners()?)
    }

    /// Bounding box of `(steps + 1)^n` transformed points spread over the
    /// envelope, catching extremes a curved image reaches between corners.
    pub fn transform_envelope_densified(&self, envelope: &Envelope, steps: usize) -> Result<Envelope> {
        self.check_envelope(envelope)?;
        self.transform_points(envelope.lattice(steps)?)
    }

    fn check_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.check_crs(&envelope.crs)?;
        let expected = self.source.dimension();
        if envelope.dimension() != expected {
            return Err(CrsError::MismatchedDimension {
                expected,
                found: envelope.dimension(),
            });
        }
        Ok(())
    }

    fn transform_points(&self, points: impl Iterator<Item = Vec<f64>>) -> Result<Envelope> {
        let mut out = Envelope::empty(Some(self.target.clone()), self.target.dimension());
        for point in points {
            out.include(&self.apply(&point)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Code;
    use crate::model::{CoordinateSystem, CrsKind, Datum};
    use approx::assert_abs_diff_eq;

    /// CRS:84 with latitude first.
    fn lat_lon() -> Arc<Crs> {
        let mut cs = CoordinateSystem::lon_lat_degrees();
        cs.axes.swap(0, 1);
        Arc::new(Crs {
            code: Code::epsg(4326),
            name: "WGS 84".into(),
            aliases: Vec::new(),
            kind: CrsKind::Geographic {
                datum: Arc::new(Datum::wgs84()),
                cs: Arc::new(cs),
            },
        })
    }

    #[test]
    fn axis_swap() {
        let crs84 = Arc::new(Crs::crs84());
        let steps = vec![normalization(&lat_lon()), normalization(&crs84).inverse().unwrap()];
        let t = Transform::new(lat_lon(), crs84, steps);
        assert_eq!(t.apply(&[45.0, 10.0]).unwrap(), vec![10.0, 45.0]);
        let back = t.inverse().unwrap();
        assert_eq!(back.apply(&[10.0, 45.0]).unwrap(), vec![45.0, 10.0]);
    }

    #[test]
    fn identity_collapses() {
        let crs = lat_lon();
        let n = normalization(&crs);
        let t = Transform::new(crs.clone(), crs.clone(), vec![n.clone(), n.inverse().unwrap()]);
        assert!(t.is_identity());
        assert!(Transform::identity(crs).steps().is_empty());
    }

    #[test]
    fn position_checks() {
        let crs = lat_lon();
        let t = Transform::identity(crs.clone());
        assert!(matches!(
            t.transform_position(&DirectPosition::untagged(vec![1.0, 2.0])),
            Err(CrsError::MissingCrs)
        ));
        assert!(matches!(
            t.transform_position(&DirectPosition::new(Arc::new(Crs::crs84()), vec![1.0, 2.0])),
            Err(CrsError::MismatchedCrs { .. })
        ));
        assert!(matches!(
            t.transform_position(&DirectPosition::new(crs.clone(), vec![1.0])),
            Err(CrsError::MismatchedDimension { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn fallback_on_out_of_domain() {
        let grid = DatumShiftGrid {
            name: "tiny".into(),
            west: 0.0,
            south: 0.0,
            lon_step: 1.0,
            lat_step: 1.0,
            cols: 2,
            rows: 2,
            shifts: vec![[3.6, 0.0]; 4],
        };
        let step = Step::Fallback {
            primary: vec![Step::Grid {
                grid: Arc::new(grid),
                inverse: false,
            }],
            secondary: vec![Step::translation([1.0, 0.0, 0.0])],
        };
        let mut inside = [0.5, 0.5, 0.0];
        step.apply(&mut inside).unwrap();
        assert_abs_diff_eq!(inside[0], 0.501, epsilon = 1e-12);
        let mut outside = [5.0, 5.0, 0.0];
        step.apply(&mut outside).unwrap();
        assert_eq!(outside, [6.0, 5.0, 0.0]);
    }

    #[test]
    fn adjacent_axes_merge() {
        let steps = simplify(vec![
            Step::translation([1.0, 0.0, 0.0]),
            Step::translation([0.0, 2.0, 0.0]),
        ]);
        assert_eq!(steps, vec![Step::translation([1.0, 2.0, 0.0])]);
    }
}
