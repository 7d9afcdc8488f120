//! Datum-shift strategy selection.
//!
//! Candidates are registry transformations between two geodetic datums, in
//! either direction. A grid candidate is usable when every grid file it names
//! is installed; parametric candidates (geocentric translations, Helmert,
//! Molodensky) are always usable. The selector honours a configured
//! [`ShiftMethod`] when the data for it exists and otherwise prefers an
//! installed grid over the most accurate parametric operation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CrsError, Result};
use crate::factory::CrsFactory;
use crate::grid::GridStore;
use crate::math::molodensky::Molodensky;
use crate::math::BursaWolf;
use crate::model::{self, CoordinateOperation, Crs, Datum, Ellipsoid, OperationKind};
use crate::transform::{invert_steps, Step};

pub const WGS84_DATUM: i32 = 6326;

pub const LONGITUDE_ROTATION: i32 = 9601;
pub const GEOCENTRIC_TRANSLATIONS: i32 = 9603;
pub const MOLODENSKY: i32 = 9604;
pub const ABRIDGED_MOLODENSKY: i32 = 9605;
pub const POSITION_VECTOR: i32 = 9606;
pub const COORDINATE_FRAME: i32 = 9607;
pub const NADCON: i32 = 9613;
pub const NTV2: i32 = 9615;
pub const VERTICAL_OFFSET: i32 = 9616;
pub const SIMILARITY: i32 = 9621;

const LONGITUDE_OFFSET: i32 = 8602;
const VERTICAL_OFFSET_VALUE: i32 = 8603;
const TRANSLATIONS: [i32; 3] = [8605, 8606, 8607];
const ROTATIONS: [i32; 3] = [8608, 8609, 8610];
const SCALE_DIFFERENCE: i32 = 8611;
const ROTATION_ANGLE: i32 = 8614;
const SCALE_FACTOR: i32 = 1061;
const ORIGIN_EASTING: i32 = 8621;
const ORIGIN_NORTHING: i32 = 8622;
const NTV2_FILE: i32 = 8656;
const LATITUDE_DIFFERENCE_FILE: i32 = 8657;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftMethod {
    Grid,
    Geocentric,
    Molodensky,
}

impl fmt::Display for ShiftMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftMethod::Grid => "Grid",
            ShiftMethod::Geocentric => "Geocentric",
            ShiftMethod::Molodensky => "Molodensky",
        })
    }
}

impl FromStr for ShiftMethod {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(ShiftMethod::Grid),
            "geocentric" => Ok(ShiftMethod::Geocentric),
            "molodensky" => Ok(ShiftMethod::Molodensky),
            _ => Err(CrsError::InvalidHint {
                key: "datum_shift_method".into(),
                value: s.to_string(),
            }),
        }
    }
}

fn is_grid_method(method: Option<i32>) -> bool {
    matches!(method, Some(NTV2 | NADCON))
}

fn is_supported(op: &CoordinateOperation) -> bool {
    match op.kind {
        OperationKind::Concatenated => op.steps.iter().all(|s| is_supported(s)),
        _ => matches!(
            op.method,
            Some(
                LONGITUDE_ROTATION
                    | GEOCENTRIC_TRANSLATIONS
                    | MOLODENSKY
                    | ABRIDGED_MOLODENSKY
                    | POSITION_VECTOR
                    | COORDINATE_FRAME
                    | NADCON
                    | NTV2
                    | VERTICAL_OFFSET
                    | SIMILARITY
            )
        ),
    }
}

fn leaves(op: &CoordinateOperation) -> Vec<&CoordinateOperation> {
    match op.kind {
        OperationKind::Concatenated => op.steps.iter().map(|s| s.as_ref()).collect(),
        _ => vec![op],
    }
}

fn grid_file(op: &CoordinateOperation) -> Option<&str> {
    match op.method {
        Some(NTV2) => op.file(NTV2_FILE),
        Some(NADCON) => op.file(LATITUDE_DIFFERENCE_FILE),
        _ => None,
    }
}

fn translation(op: &CoordinateOperation) -> [f64; 3] {
    TRANSLATIONS.map(|code| op.value(code).unwrap_or(0.0))
}

fn bursa_wolf(op: &CoordinateOperation) -> BursaWolf {
    let [tx, ty, tz] = translation(op);
    let [rx, ry, rz] = ROTATIONS.map(|code| op.value(code).unwrap_or(0.0) * 3600.0);
    let params = BursaWolf {
        tx,
        ty,
        tz,
        rx,
        ry,
        rz,
        ds: op.value(SCALE_DIFFERENCE).unwrap_or(0.0) * 1e6,
    };
    if op.method == Some(COORDINATE_FRAME) {
        params.from_coordinate_frame()
    } else {
        params
    }
}

/// A registry operation usable as a datum shift, possibly run backwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub operation: Arc<CoordinateOperation>,
    pub reversed: bool,
}

impl Candidate {
    pub fn code(&self) -> i32 {
        self.operation.code
    }

    /// Grid files the operation reads.
    pub fn grid_files(&self) -> Vec<&str> {
        leaves(&self.operation).into_iter().filter_map(grid_file).collect()
    }

    pub fn is_grid(&self) -> bool {
        leaves(&self.operation).iter().any(|op| is_grid_method(op.method))
    }

    pub fn grids_installed(&self, grids: &GridStore) -> bool {
        let files = self.grid_files();
        !files.is_empty() && files.iter().all(|f| grids.contains(f))
    }

    /// Registry method is a Molodensky variant.
    fn uses_molodensky(&self) -> bool {
        leaves(&self.operation)
            .iter()
            .any(|op| matches!(op.method, Some(MOLODENSKY | ABRIDGED_MOLODENSKY)))
    }

    /// Every geocentric step carries translations only.
    fn molodensky_capable(&self) -> bool {
        !self.is_grid()
            && leaves(&self.operation).iter().all(|op| match op.method {
                Some(POSITION_VECTOR | COORDINATE_FRAME) => bursa_wolf(op).is_translation_only(),
                _ => true,
            })
    }
}

fn by_accuracy(a: &&Candidate, b: &&Candidate) -> Ordering {
    let key = |c: &Candidate| c.operation.accuracy.unwrap_or(f64::INFINITY);
    key(a).total_cmp(&key(b)).then(a.code().cmp(&b.code()))
}

/// Outcome of [`select`]: the method and operation to run, plus the
/// parametric operation to use outside the grid when fallback is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub method: ShiftMethod,
    pub operation: Candidate,
    pub fallback: Option<Candidate>,
}

/// Picks the datum shift among `candidates`; `None` when no candidate is
/// usable with the installed grids.
pub fn select(
    candidates: &[Candidate],
    hint: Option<ShiftMethod>,
    grids: &GridStore,
    grid_fallback: bool,
) -> Option<Selection> {
    let grid = candidates
        .iter()
        .filter(|c| c.is_grid() && c.grids_installed(grids))
        .min_by(by_accuracy);
    let parametric = candidates.iter().filter(|c| !c.is_grid()).min_by(by_accuracy);
    let molodensky = candidates.iter().filter(|c| c.molodensky_capable()).min_by(by_accuracy);

    let with_grid = |grid: &Candidate| Selection {
        method: ShiftMethod::Grid,
        operation: grid.clone(),
        fallback: parametric.filter(|_| grid_fallback).cloned(),
    };
    match (hint, grid, parametric, molodensky) {
        (Some(ShiftMethod::Grid), Some(g), _, _) => return Some(with_grid(g)),
        (Some(ShiftMethod::Geocentric), _, Some(p), _) => {
            return Some(Selection {
                method: ShiftMethod::Geocentric,
                operation: p.clone(),
                fallback: None,
            })
        }
        (Some(ShiftMethod::Molodensky), _, _, Some(m)) => {
            return Some(Selection {
                method: ShiftMethod::Molodensky,
                operation: m.clone(),
                fallback: None,
            })
        }
        (Some(hint), ..) if !candidates.is_empty() => {
            log::warn!("no data for {hint} datum shift, using the default method");
        }
        _ => {}
    }
    if let Some(g) = grid {
        return Some(with_grid(g));
    }
    parametric.map(|p| Selection {
        method: if p.uses_molodensky() {
            ShiftMethod::Molodensky
        } else {
            ShiftMethod::Geocentric
        },
        operation: p.clone(),
        fallback: None,
    })
}

/// Supported operations from `forward` codes, followed by `reverse` codes
/// run backwards.
pub(crate) fn collect(factory: &CrsFactory, forward: Vec<i32>, reverse: Vec<i32>) -> Result<Vec<Candidate>> {
    let mut out = Vec::new();
    for (codes, reversed) in [(forward, false), (reverse, true)] {
        for code in codes {
            let operation = factory.operation(code)?;
            if is_supported(&operation) {
                out.push(Candidate { operation, reversed });
            } else {
                log::debug!("skipping operation {} with unsupported method {:?}", code, operation.method);
            }
        }
    }
    Ok(out)
}

/// Registry datum shifts from `source_datum` to `target_datum`.
pub fn candidates(factory: &CrsFactory, source_datum: i32, target_datum: i32) -> Result<Vec<Candidate>> {
    let registry = factory.registry();
    collect(
        factory,
        registry.datum_shift_operations(source_datum, target_datum)?,
        registry.datum_shift_operations(target_datum, source_datum)?,
    )
}

fn crs_datum(factory: &CrsFactory, crs: Option<i32>, op: i32) -> Result<Arc<Datum>> {
    let code = crs.ok_or_else(|| CrsError::illegal("epsg_coordoperation", op, "missing source or target CRS"))?;
    let crs = factory.crs(code)?;
    model::geodetic_datum(&crs)
        .cloned()
        .ok_or_else(|| CrsError::illegal("epsg_coordoperation", op, format!("CRS {code} has no geodetic datum")))
}

fn crs_ellipsoid(factory: &CrsFactory, crs: Option<i32>, op: i32) -> Result<Ellipsoid> {
    let datum = crs_datum(factory, crs, op)?;
    datum
        .ellipsoid()
        .map(|e| Ellipsoid::clone(e))
        .ok_or_else(|| CrsError::illegal("epsg_coordoperation", op, "datum has no ellipsoid"))
}

fn greenwich_longitude(factory: &CrsFactory, crs: Option<i32>, op: i32) -> Result<f64> {
    let datum = crs_datum(factory, crs, op)?;
    Ok(datum.prime_meridian().map_or(0.0, |pm| pm.greenwich_longitude))
}

/// Steps of a single operation run forward.
fn leaf_steps(
    factory: &CrsFactory,
    op: &CoordinateOperation,
    method: ShiftMethod,
    with_height: bool,
) -> Result<Vec<Step>> {
    let code = op.code;
    let required = |param: i32| {
        op.value(param)
            .ok_or_else(|| CrsError::illegal("epsg_coordoperationparamvalue", code, format!("missing parameter {param}")))
    };
    let molodensky = |abridged: bool| -> Result<Step> {
        Ok(Step::Molodensky {
            params: Molodensky {
                translation: translation(op),
                source: crs_ellipsoid(factory, op.source_crs, code)?,
                target: crs_ellipsoid(factory, op.target_crs, code)?,
                abridged,
            },
            with_height,
        })
    };
    let helmert = |params: BursaWolf| -> Result<Step> {
        Ok(Step::Helmert {
            params,
            source: crs_ellipsoid(factory, op.source_crs, code)?,
            target: crs_ellipsoid(factory, op.target_crs, code)?,
            with_height,
            inverse: false,
        })
    };
    let step = match op.method {
        Some(GEOCENTRIC_TRANSLATIONS | POSITION_VECTOR | COORDINATE_FRAME) => {
            let params = bursa_wolf(op);
            if method == ShiftMethod::Molodensky && params.is_translation_only() {
                molodensky(false)?
            } else {
                helmert(params)?
            }
        }
        Some(m @ (MOLODENSKY | ABRIDGED_MOLODENSKY)) => {
            if method == ShiftMethod::Geocentric {
                let [tx, ty, tz] = translation(op);
                helmert(BursaWolf::translation(tx, ty, tz))?
            } else {
                molodensky(m == ABRIDGED_MOLODENSKY)?
            }
        }
        Some(NTV2 | NADCON) => {
            let file = grid_file(op)
                .ok_or_else(|| CrsError::illegal("epsg_coordoperationparamvalue", code, "missing grid file"))?;
            let grid = factory
                .grids()
                .get(file)
                .ok_or_else(|| CrsError::MissingGrid(file.to_string()))?;
            Step::Grid { grid, inverse: false }
        }
        Some(LONGITUDE_ROTATION) => {
            // Buffer longitudes are already relative to Greenwich.
            let offset = required(LONGITUDE_OFFSET)?
                + greenwich_longitude(factory, op.target_crs, code)?
                - greenwich_longitude(factory, op.source_crs, code)?;
            Step::translation([offset, 0.0, 0.0])
        }
        Some(VERTICAL_OFFSET) => Step::translation([0.0, 0.0, required(VERTICAL_OFFSET_VALUE)?]),
        Some(SIMILARITY) => {
            let m = op.value(SCALE_FACTOR).unwrap_or(1.0);
            let (sin, cos) = op.value(ROTATION_ANGLE).unwrap_or(0.0).to_radians().sin_cos();
            Step::Axes {
                matrix: Matrix3::new(m * cos, m * sin, 0.0, -m * sin, m * cos, 0.0, 0.0, 0.0, 1.0),
                translation: Vector3::new(required(ORIGIN_EASTING)?, required(ORIGIN_NORTHING)?, 0.0),
            }
        }
        other => {
            return Err(CrsError::unsupported(
                format!("operation {code}"),
                format!("method {}", other.map_or("none".to_string(), |m| m.to_string())),
            ))
        }
    };
    Ok(vec![step])
}

/// Steps running `candidate` in its requested direction.
pub(crate) fn candidate_steps(
    factory: &CrsFactory,
    candidate: &Candidate,
    method: ShiftMethod,
    with_height: bool,
) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for op in leaves(&candidate.operation) {
        steps.extend(leaf_steps(factory, op, method, with_height)?);
    }
    if candidate.reversed {
        invert_steps(&steps)
    } else {
        Ok(steps)
    }
}

pub(crate) fn selection_steps(factory: &CrsFactory, selection: &Selection, with_height: bool) -> Result<Vec<Step>> {
    let primary = candidate_steps(factory, &selection.operation, selection.method, with_height)?;
    match &selection.fallback {
        Some(fallback) => {
            let method = if fallback.uses_molodensky() {
                ShiftMethod::Molodensky
            } else {
                ShiftMethod::Geocentric
            };
            Ok(vec![Step::Fallback {
                primary,
                secondary: candidate_steps(factory, fallback, method, with_height)?,
            }])
        }
        None => Ok(primary),
    }
}

/// How a shift between two datums is carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Direct(Selection),
    /// Through WGS 84: source to hub, then hub to target.
    Hub(Selection, Selection),
    /// No registry operation; ellipsoid change only.
    EllipsoidOnly,
}

impl Plan {
    /// The method of the first shift performed.
    pub fn method(&self) -> ShiftMethod {
        match self {
            Plan::Direct(s) | Plan::Hub(s, _) => s.method,
            Plan::EllipsoidOnly => ShiftMethod::Geocentric,
        }
    }
}

pub(crate) fn plan(factory: &CrsFactory, source_datum: i32, target_datum: i32, hint: Option<ShiftMethod>) -> Result<Plan> {
    let hints = factory.hints();
    let grids = factory.grids();
    let direct = candidates(factory, source_datum, target_datum)?;
    if let Some(selection) = select(&direct, hint, grids, hints.grid_fallback) {
        return Ok(Plan::Direct(selection));
    }
    if source_datum != WGS84_DATUM && target_datum != WGS84_DATUM {
        let to_hub = candidates(factory, source_datum, WGS84_DATUM)?;
        let from_hub = candidates(factory, WGS84_DATUM, target_datum)?;
        if let (Some(a), Some(b)) = (
            select(&to_hub, hint, grids, hints.grid_fallback),
            select(&from_hub, hint, grids, hints.grid_fallback),
        ) {
            log::debug!("shifting datum {source_datum} to {target_datum} through WGS 84");
            return Ok(Plan::Hub(a, b));
        }
    }
    if let Some(file) = direct.iter().flat_map(|c| c.grid_files()).find(|f| !grids.contains(f)) {
        return Err(CrsError::MissingGrid(file.to_string()));
    }
    if hints.lenient_datum_shift {
        log::warn!("no datum shift from datum {source_datum} to {target_datum}, changing ellipsoid only");
        return Ok(Plan::EllipsoidOnly);
    }
    Err(CrsError::unsupported(
        format!("datum {source_datum}"),
        format!("datum {target_datum}"),
    ))
}

/// Steps shifting normalized geographic coordinates from the datum of
/// `source` to the datum of `target`; both are geographic CRSs.
pub(crate) fn datum_shift(factory: &CrsFactory, source: &Crs, target: &Crs, with_height: bool) -> Result<Vec<Step>> {
    let (Some(sd), Some(td)) = (model::geodetic_datum(source), model::geodetic_datum(target)) else {
        return Err(CrsError::unsupported(&source.code, &target.code));
    };
    if model::same_datum(sd, td) {
        return Ok(Vec::new());
    }
    match plan(factory, sd.code, td.code, factory.hints().datum_shift_method)? {
        Plan::Direct(selection) => selection_steps(factory, &selection, with_height),
        Plan::Hub(a, b) => {
            let mut steps = selection_steps(factory, &a, with_height)?;
            steps.extend(selection_steps(factory, &b, with_height)?);
            Ok(steps)
        }
        Plan::EllipsoidOnly => {
            let (Some(se), Some(te)) = (sd.ellipsoid(), td.ellipsoid()) else {
                return Err(CrsError::unsupported(&source.code, &target.code));
            };
            if se.same_figure(te) {
                return Ok(Vec::new());
            }
            Ok(vec![Step::Helmert {
                params: BursaWolf::default(),
                source: Ellipsoid::clone(se),
                target: Ellipsoid::clone(te),
                with_height,
                inverse: false,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DatumShiftGrid;
    use crate::hints::Hints;
    use crate::model::OperationParameter;

    fn op(code: i32, method: i32, accuracy: Option<f64>, params: &[(i32, f64)], file: Option<&str>) -> Candidate {
        let mut parameters: Vec<_> = params
            .iter()
            .map(|(code, value)| OperationParameter {
                code: *code,
                name: String::new(),
                value: Some(*value),
                file: None,
            })
            .collect();
        if let Some(file) = file {
            parameters.push(OperationParameter {
                code: NTV2_FILE,
                name: String::new(),
                value: None,
                file: Some(file.to_string()),
            });
        }
        Candidate {
            operation: Arc::new(CoordinateOperation {
                code,
                name: format!("op {code}"),
                kind: OperationKind::Transformation,
                source_crs: None,
                target_crs: None,
                method: Some(method),
                accuracy,
                parameters,
                steps: Vec::new(),
            }),
            reversed: false,
        }
    }

    fn installed(name: &str) -> GridStore {
        let mut grids = GridStore::new();
        grids
            .insert(DatumShiftGrid {
                name: name.into(),
                west: 0.0,
                south: 0.0,
                lon_step: 1.0,
                lat_step: 1.0,
                cols: 2,
                rows: 2,
                shifts: vec![[0.0, 0.0]; 4],
            })
            .unwrap();
        grids
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            op(1, GEOCENTRIC_TRANSLATIONS, Some(10.0), &[(8605, 1.0)], None),
            op(2, POSITION_VECTOR, Some(2.0), &[(8605, 1.0), (8608, 1e-5)], None),
            op(3, NTV2, Some(0.1), &[], Some("fine.gsb")),
        ]
    }

    #[test]
    fn installed_grid_wins() {
        let s = select(&candidates(), None, &installed("fine"), false).unwrap();
        assert_eq!((s.method, s.operation.code()), (ShiftMethod::Grid, 3));
        assert!(s.fallback.is_none());
        let s = select(&candidates(), None, &installed("fine"), true).unwrap();
        assert_eq!(s.fallback.map(|c| c.code()), Some(2));
    }

    #[test]
    fn most_accurate_parametric_without_grid() {
        let s = select(&candidates(), None, &GridStore::new(), true).unwrap();
        assert_eq!((s.method, s.operation.code()), (ShiftMethod::Geocentric, 2));
    }

    #[test]
    fn hints_are_honoured_when_data_exists() {
        let grids = installed("fine");
        let s = select(&candidates(), Some(ShiftMethod::Geocentric), &grids, false).unwrap();
        assert_eq!((s.method, s.operation.code()), (ShiftMethod::Geocentric, 2));
        // Only the translation-only operation qualifies for Molodensky.
        let s = select(&candidates(), Some(ShiftMethod::Molodensky), &grids, false).unwrap();
        assert_eq!((s.method, s.operation.code()), (ShiftMethod::Molodensky, 1));
        let s = select(&candidates(), Some(ShiftMethod::Grid), &GridStore::new(), false).unwrap();
        assert_eq!((s.method, s.operation.code()), (ShiftMethod::Geocentric, 2));
    }

    #[test]
    fn registry_molodensky_method() {
        let c = vec![op(9, ABRIDGED_MOLODENSKY, None, &[(8605, 1.0)], None)];
        let s = select(&c, None, &GridStore::new(), false).unwrap();
        assert_eq!(s.method, ShiftMethod::Molodensky);
    }

    #[test]
    fn uninstalled_grid_only() {
        let c = vec![op(3, NTV2, Some(0.1), &[], Some("fine.gsb"))];
        assert!(select(&c, None, &GridStore::new(), false).is_none());
        assert_eq!(c[0].grid_files(), vec!["fine.gsb"]);
    }

    #[test]
    fn method_names() {
        assert_eq!("geocentric".parse::<ShiftMethod>().unwrap(), ShiftMethod::Geocentric);
        assert_eq!(ShiftMethod::Molodensky.to_string(), "Molodensky");
        assert!(matches!("bilinear".parse::<ShiftMethod>(), Err(CrsError::InvalidHint { .. })));
    }

    #[test]
    fn registry_plans() {
        let factory = CrsFactory::bundled(Hints::default()).unwrap();
        // OSGB 36: the OSTN15 grid is not installed, Helmert remains.
        let plan = plan(&factory, 6277, 6326, None).unwrap();
        assert!(matches!(&plan, Plan::Direct(s) if s.operation.code() == 1314));
        // NAD 27 to NAD 83: NADCON missing, both legs via WGS 84 exist.
        match super::plan(&factory, 6267, 6269, None).unwrap() {
            Plan::Hub(a, b) => {
                assert_eq!((a.operation.code(), a.operation.reversed), (1173, false));
                assert_eq!((b.operation.code(), b.operation.reversed), (1188, true));
            }
            other => panic!("unexpected plan {other:?}"),
        }
        // No operation relates ED50 and OSGB 36 except through WGS 84.
        assert!(matches!(super::plan(&factory, 6230, 6277, None).unwrap(), Plan::Hub(..)));
    }

    #[test]
    fn lenient_shift() {
        let strict = CrsFactory::bundled(Hints::default()).unwrap();
        strict
            .registry()
            .execute_batch("DELETE FROM epsg_coordoperation WHERE coord_op_code = 1133;")
            .unwrap();
        assert!(matches!(
            plan(&strict, 6230, 6326, None),
            Err(CrsError::UnsupportedOperation { .. })
        ));
        let lenient = CrsFactory::bundled(Hints {
            lenient_datum_shift: true,
            ..Hints::default()
        })
        .unwrap();
        lenient
            .registry()
            .execute_batch("DELETE FROM epsg_coordoperation WHERE coord_op_code = 1133;")
            .unwrap();
        assert_eq!(plan(&lenient, 6230, 6326, None).unwrap(), Plan::EllipsoidOnly);
    }
}
