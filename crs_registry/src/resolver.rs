//! Finds the transform between two reference systems.
//!
//! Registry operations relating the two codes directly are tried first.
//! Otherwise both sides are decomposed into axis normalization, map
//! projection and datum, and the pieces are recomposed around a datum shift
//! chosen by [`crate::shift`].

use std::sync::Arc;

use crate::code::EPSG;
use crate::error::{CrsError, Result};
use crate::factory::CrsFactory;
use crate::math::Projection;
use crate::model::{self, Crs, CrsKind};
use crate::shift::{self, ShiftMethod};
use crate::transform::{normalization, Step, Transform};

/// Map projection of a projected CRS, bound to its base ellipsoid.
fn projection(crs: &Crs) -> Result<Option<Projection>> {
    let CrsKind::Projected { base, conversion, .. } = &crs.kind else {
        return Ok(None);
    };
    let datum = model::geodetic_datum(base).ok_or_else(|| CrsError::unsupported(&crs.code, &base.code))?;
    let ellipsoid = datum
        .ellipsoid()
        .ok_or_else(|| CrsError::unsupported(&crs.code, &base.code))?;
    let prime_meridian = datum.prime_meridian().map_or(0.0, |pm| pm.greenwich_longitude);
    Ok(Some(Projection::new(
        conversion.method,
        ellipsoid,
        prime_meridian,
        &conversion.parameters,
    )))
}

fn epsg_id(crs: &Crs) -> Option<i32> {
    (crs.code.authority == EPSG).then_some(crs.code.id)
}

pub struct OperationResolver<'f> {
    factory: &'f CrsFactory,
}

impl<'f> OperationResolver<'f> {
    pub fn new(factory: &'f CrsFactory) -> Self {
        Self { factory }
    }

    pub fn find_transform(&self, source: &Arc<Crs>, target: &Arc<Crs>) -> Result<Transform> {
        if source.same_code(target) {
            return Ok(Transform::identity(source.clone()));
        }
        if let Some(transform) = self.registry_transform(source, target)? {
            log::debug!("{} -> {} through a registry operation", source.code, target.code);
            return Ok(transform);
        }
        let steps = self.decomposed(source, target).map_err(|e| match e {
            CrsError::UnsupportedOperation { .. } => CrsError::unsupported(&source.code, &target.code),
            e => e,
        })?;
        let transform = Transform::new(source.clone(), target.clone(), steps);
        log::debug!(
            "{} -> {} resolved in {} steps",
            source.code,
            target.code,
            transform.steps().len()
        );
        Ok(transform)
    }

    /// The method used to shift `source_datum` to `target_datum`; identical
    /// datums need no shift and report [`ShiftMethod::Geocentric`].
    pub fn select_method(&self, source_datum: i32, target_datum: i32, hint: Option<ShiftMethod>) -> Result<ShiftMethod> {
        if source_datum == target_datum {
            return Ok(ShiftMethod::Geocentric);
        }
        Ok(shift::plan(self.factory, source_datum, target_datum, hint)?.method())
    }

    fn registry_transform(&self, source: &Arc<Crs>, target: &Arc<Crs>) -> Result<Option<Transform>> {
        let (Some(s), Some(t)) = (epsg_id(source), epsg_id(target)) else {
            return Ok(None);
        };
        let registry = self.factory.registry();
        let candidates = shift::collect(
            self.factory,
            registry.operations_between(s, t)?,
            registry.operations_between(t, s)?,
        )?;
        let hints = self.factory.hints();
        let Some(selection) = shift::select(
            &candidates,
            hints.datum_shift_method,
            self.factory.grids(),
            hints.grid_fallback,
        ) else {
            return Ok(None);
        };
        let with_height = model::has_ellipsoidal_height(source) && model::has_ellipsoidal_height(target);
        let mut steps = vec![normalization(source)];
        steps.extend(shift::selection_steps(self.factory, &selection, with_height)?);
        steps.push(normalization(target).inverse()?);
        Ok(Some(Transform::new(source.clone(), target.clone(), steps)))
    }

    fn decomposed(&self, source: &Arc<Crs>, target: &Arc<Crs>) -> Result<Vec<Step>> {
        let (source_h, source_v) = model::components(source);
        let (target_h, target_v) = model::components(target);
        let mut steps = vec![normalization(source)];
        match (&source_h, &target_h) {
            (Some(sh), Some(th)) => steps.extend(self.horizontal(sh, th)?),
            (None, None) => {}
            _ => return Err(CrsError::unsupported(&source.code, &target.code)),
        }
        steps.extend(self.vertical(source_v.as_ref(), target_v.as_ref(), target)?);
        steps.push(normalization(target).inverse()?);
        Ok(steps)
    }

    fn horizontal(&self, source: &Arc<Crs>, target: &Arc<Crs>) -> Result<Vec<Step>> {
        if source.same_code(target) {
            return Ok(Vec::new());
        }
        let unsupported = || CrsError::unsupported(&source.code, &target.code);
        let source_geo = model::base_geographic(source).ok_or_else(unsupported)?;
        let target_geo = model::base_geographic(target).ok_or_else(unsupported)?;
        let mut steps = Vec::new();
        if let Some(projection) = projection(source)? {
            steps.push(Step::Project {
                projection,
                inverse: true,
            });
        }
        let with_height = model::has_ellipsoidal_height(&source_geo) && model::has_ellipsoidal_height(&target_geo);
        steps.extend(shift::datum_shift(self.factory, &source_geo, &target_geo, with_height)?);
        if let Some(projection) = projection(target)? {
            steps.push(Step::Project {
                projection,
                inverse: false,
            });
        }
        Ok(steps)
    }

    /// Height handling; unit and direction changes are left to axis
    /// normalization.
    fn vertical(&self, source: Option<&Arc<Crs>>, target: Option<&Arc<Crs>>, whole_target: &Crs) -> Result<Vec<Step>> {
        match (source, target) {
            (None, None) => Ok(Vec::new()),
            (Some(source), None) => {
                if model::has_ellipsoidal_height(whole_target) {
                    // Gravity-related to ellipsoidal height needs a geoid model.
                    return Err(CrsError::unsupported(&source.code, &whole_target.code));
                }
                log::debug!("dropping {} height", source.code);
                Ok(Vec::new())
            }
            (None, Some(target)) => Err(CrsError::unsupported("no vertical component", &target.code)),
            (Some(source), Some(target)) => {
                let (CrsKind::Vertical { datum: sd, .. }, CrsKind::Vertical { datum: td, .. }) =
                    (&source.kind, &target.kind)
                else {
                    return Err(CrsError::unsupported(&source.code, &target.code));
                };
                if model::same_datum(sd, td) {
                    return Ok(Vec::new());
                }
                self.vertical_offset(source, target)
            }
        }
    }

    fn vertical_offset(&self, source: &Crs, target: &Crs) -> Result<Vec<Step>> {
        let unsupported = || CrsError::unsupported(&source.code, &target.code);
        let (s, t) = epsg_id(source).zip(epsg_id(target)).ok_or_else(unsupported)?;
        let registry = self.factory.registry();
        let candidates = shift::collect(
            self.factory,
            registry.operations_between(s, t)?,
            registry.operations_between(t, s)?,
        )?;
        let candidate = candidates
            .iter()
            .find(|c| c.operation.method == Some(shift::VERTICAL_OFFSET))
            .ok_or_else(unsupported)?;
        shift::candidate_steps(self.factory, candidate, ShiftMethod::Geocentric, false)
    }
}
