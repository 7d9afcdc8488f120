//! Object factory: turns registry rows into shared, immutable objects.
//!
//! Each object kind has its own [`Cache`]; a code is built at most once and
//! every later lookup returns the same [`Arc`]. Nested objects (a datum's
//! ellipsoid, a projected CRS's base) go through the same caches.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::auto;
use crate::cache::Cache;
use crate::code::{Code, EPSG};
use crate::error::{CrsError, Result};
use crate::grid::GridStore;
use crate::hints::Hints;
use crate::math::ProjectionMethod;
use crate::model::{
    Axis, AxisDirection, CoordinateOperation, CoordinateSystem, Conversion, Crs, CrsKind, CsKind,
    Datum, DatumKind, Ellipsoid, OperationKind, OperationParameter, ParameterValue, PrimeMeridian,
    Unit, UnitKind, VerticalDatumType,
};
use crate::registry::{AxisRecord, Registry};
use crate::resolver::OperationResolver;

const UNITS: &str = "epsg_unitofmeasure";
const ELLIPSOIDS: &str = "epsg_ellipsoid";
const PRIME_MERIDIANS: &str = "epsg_primemeridian";
const DATUMS: &str = "epsg_datum";
const COORDINATE_SYSTEMS: &str = "epsg_coordinatesystem";
const AXES: &str = "epsg_coordinateaxis";
const CRS_TABLE: &str = "epsg_coordinatereferencesystem";
const OPERATIONS: &str = "epsg_coordoperation";

#[derive(Debug)]
pub struct CrsFactory {
    registry: Registry,
    hints: Hints,
    grids: GridStore,
    units: Cache<Unit>,
    ellipsoids: Cache<Ellipsoid>,
    prime_meridians: Cache<PrimeMeridian>,
    datums: Cache<Datum>,
    coordinate_systems: Cache<CoordinateSystem>,
    crs: Cache<Crs>,
    operations: Cache<CoordinateOperation>,
}

fn required<T>(table: &str, key: i32, field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| CrsError::illegal(table, key, format!("missing {field}")))
}

/// `1984`, `1984-06-30` or a decimal year such as `2005.5`.
fn parse_epoch(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    let year: f64 = text.parse().ok()?;
    if !year.is_finite() {
        return None;
    }
    let start = NaiveDate::from_ymd_opt(year.trunc() as i32, 1, 1)?;
    start.checked_add_signed(Duration::days((year.fract() * 365.25).round() as i64))
}

fn parse_direction(text: &str) -> Option<AxisDirection> {
    let first = text.split_whitespace().next()?.to_ascii_lowercase();
    match first.as_str() {
        "north" => Some(AxisDirection::North),
        "south" => Some(AxisDirection::South),
        "east" => Some(AxisDirection::East),
        "west" => Some(AxisDirection::West),
        "up" => Some(AxisDirection::Up),
        "down" => Some(AxisDirection::Down),
        _ => None,
    }
}

impl CrsFactory {
    /// Builds a factory over `registry`, loading grids from
    /// `hints.grid_directory` when one is given.
    pub fn new(registry: Registry, hints: Hints) -> Result<Self> {
        if registry.dialect() != hints.dialect {
            log::warn!(
                "registry uses the {} dialect, hints ask for {}",
                registry.dialect(),
                hints.dialect
            );
        }
        let grids = match &hints.grid_directory {
            Some(dir) => GridStore::load_dir(dir)?,
            None => GridStore::new(),
        };
        Ok(Self {
            registry,
            hints,
            grids,
            units: Cache::new("unit"),
            ellipsoids: Cache::new("ellipsoid"),
            prime_meridians: Cache::new("prime meridian"),
            datums: Cache::new("datum"),
            coordinate_systems: Cache::new("coordinate system"),
            crs: Cache::new("reference system"),
            operations: Cache::new("operation"),
        })
    }

    /// Factory over the bundled definitions.
    pub fn bundled(hints: Hints) -> Result<Self> {
        let registry = Registry::bundled(hints.dialect)?;
        Self::new(registry, hints)
    }

    /// Factory over a registry database on disk.
    pub fn open(path: impl AsRef<Path>, hints: Hints) -> Result<Self> {
        let registry = Registry::open(path, hints.dialect)?;
        Self::new(registry, hints)
    }

    /// Replaces the installed datum shift grids.
    pub fn with_grids(mut self, grids: GridStore) -> Self {
        self.grids = grids;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    pub fn grids(&self) -> &GridStore {
        &self.grids
    }

    pub fn resolver(&self) -> OperationResolver<'_> {
        OperationResolver::new(self)
    }

    /// Drops every cached object.
    pub fn clear(&self) {
        self.units.clear();
        self.ellipsoids.clear();
        self.prime_meridians.clear();
        self.datums.clear();
        self.coordinate_systems.clear();
        self.crs.clear();
        self.operations.clear();
    }

    fn name(&self, raw: &str) -> String {
        self.hints.name_factory.apply(raw)
    }

    /// Parses `raw` and returns the reference system it names.
    pub fn decode(&self, raw: &str) -> Result<Arc<Crs>> {
        self.create(&Code::parse(raw)?)
    }

    pub fn create(&self, code: &Code) -> Result<Arc<Crs>> {
        if code.is_procedural() {
            return auto::build(code);
        }
        match code.authority.as_str() {
            EPSG => self.crs(code.id),
            "CRS" | "OGC" if code.id == 84 => Ok(auto::crs84()),
            _ => Err(CrsError::NoSuchCode {
                authority: code.authority.clone(),
                code: code.id.to_string(),
            }),
        }
    }

    /// Every reference system code the registry defines.
    pub fn authority_codes(&self) -> Result<Vec<Code>> {
        Ok(self
            .registry
            .crs_codes()?
            .into_iter()
            .map(Code::epsg)
            .collect())
    }

    pub fn unit(&self, code: i32) -> Result<Arc<Unit>> {
        self.units.get_or_try_insert(code, || {
            let rec = self.registry.unit(code)?;
            let kind = match rec.kind.to_ascii_lowercase().as_str() {
                "length" => UnitKind::Length,
                "angle" => UnitKind::Angle,
                "scale" => UnitKind::Scale,
                "time" => UnitKind::Time,
                other => {
                    return Err(CrsError::illegal(UNITS, code, format!("unknown unit type {other:?}")))
                }
            };
            let factor = match (rec.factor_b, rec.factor_c) {
                (Some(b), Some(c)) if b != 0.0 && c != 0.0 => b / c,
                _ => return Err(CrsError::illegal(UNITS, code, "missing conversion factor")),
            };
            Ok(Unit {
                code,
                name: self.name(&rec.name),
                kind,
                factor,
            })
        })
    }

    fn unit_of_kind(&self, code: i32, kind: UnitKind, table: &str, key: i32) -> Result<Arc<Unit>> {
        let unit = self.unit(code)?;
        if unit.kind != kind {
            return Err(CrsError::illegal(
                table,
                key,
                format!("unit {} is not a {:?} unit", code, kind),
            ));
        }
        Ok(unit)
    }

    pub fn ellipsoid(&self, code: i32) -> Result<Arc<Ellipsoid>> {
        self.ellipsoids.get_or_try_insert(code, || {
            let rec = self.registry.ellipsoid(code)?;
            let factor = match rec.uom {
                Some(uom) => self.unit_of_kind(uom, UnitKind::Length, ELLIPSOIDS, code)?.factor,
                None => 1.0,
            };
            let a = required(ELLIPSOIDS, code, "semi_major_axis", rec.semi_major_axis)? * factor;
            let inverse_flattening = match (rec.inverse_flattening, rec.semi_minor_axis) {
                (Some(f), _) if f > 0.0 => f,
                (Some(_), _) => f64::INFINITY,
                (None, Some(b)) => {
                    let b = b * factor;
                    if (a - b).abs() < 1e-9 {
                        f64::INFINITY
                    } else {
                        a / (a - b)
                    }
                }
                (None, None) => {
                    return Err(CrsError::illegal(
                        ELLIPSOIDS,
                        code,
                        "neither inverse flattening nor semi-minor axis",
                    ))
                }
            };
            Ok(Ellipsoid {
                code,
                name: self.name(&rec.name),
                semi_major_axis: a,
                inverse_flattening,
            })
        })
    }

    pub fn prime_meridian(&self, code: i32) -> Result<Arc<PrimeMeridian>> {
        self.prime_meridians.get_or_try_insert(code, || {
            let rec = self.registry.prime_meridian(code)?;
            let longitude = required(PRIME_MERIDIANS, code, "greenwich_longitude", rec.greenwich_longitude)?;
            let factor = match rec.uom {
                Some(uom) => self
                    .unit_of_kind(uom, UnitKind::Angle, PRIME_MERIDIANS, code)?
                    .to_canonical(),
                None => 1.0,
            };
            Ok(PrimeMeridian {
                code,
                name: self.name(&rec.name),
                greenwich_longitude: longitude * factor,
            })
        })
    }

    pub fn datum(&self, code: i32) -> Result<Arc<Datum>> {
        self.datums.get_or_try_insert(code, || {
            let rec = self.registry.datum(code)?;
            let datum_type = rec.datum_type.as_deref().unwrap_or("").to_ascii_lowercase();
            let kind = match datum_type.as_str() {
                "geodetic" => DatumKind::Geodetic {
                    ellipsoid: self.ellipsoid(required(DATUMS, code, "ellipsoid_code", rec.ellipsoid)?)?,
                    prime_meridian: self.prime_meridian(required(
                        DATUMS,
                        code,
                        "prime_meridian_code",
                        rec.prime_meridian,
                    )?)?,
                },
                "vertical" => {
                    let vertical_type = match rec.vertical_datum_type.as_deref().map(str::to_ascii_lowercase) {
                        None => VerticalDatumType::Other,
                        Some(t) => match t.as_str() {
                            "geoidal" => VerticalDatumType::Geoidal,
                            "depth" => VerticalDatumType::Depth,
                            "barometric" => VerticalDatumType::Barometric,
                            "other" => VerticalDatumType::Other,
                            _ => {
                                return Err(CrsError::illegal(
                                    DATUMS,
                                    code,
                                    format!("unknown vertical datum type {t:?}"),
                                ))
                            }
                        },
                    };
                    DatumKind::Vertical { vertical_type }
                }
                "temporal" => DatumKind::Temporal,
                "engineering" => DatumKind::Engineering,
                other => {
                    return Err(CrsError::illegal(DATUMS, code, format!("unknown datum type {other:?}")))
                }
            };
            let realization_epoch = match rec.realization_epoch.as_deref() {
                Some(text) => Some(parse_epoch(text).ok_or_else(|| {
                    CrsError::illegal(DATUMS, code, format!("bad realization epoch {text:?}"))
                })?),
                None => None,
            };
            Ok(Datum {
                code,
                name: self.name(&rec.name),
                anchor: rec.origin,
                realization_epoch,
                kind,
            })
        })
    }

    fn axis(&self, cs_kind: CsKind, rec: AxisRecord) -> Result<Axis> {
        let orientation = required(AXES, rec.code, "coord_axis_orientation", rec.orientation)?;
        let direction = parse_direction(&orientation).ok_or_else(|| {
            CrsError::illegal(AXES, rec.code, format!("unknown orientation {orientation:?}"))
        })?;
        let expected = match (cs_kind, direction) {
            (_, AxisDirection::Up | AxisDirection::Down) => UnitKind::Length,
            (CsKind::Ellipsoidal, _) => UnitKind::Angle,
            _ => UnitKind::Length,
        };
        let unit = self.unit_of_kind(required(AXES, rec.code, "uom_code", rec.uom)?, expected, AXES, rec.code)?;
        Ok(Axis {
            abbreviation: rec.abbreviation.unwrap_or_default(),
            name: rec.name,
            direction,
            unit,
        })
    }

    pub fn coordinate_system(&self, code: i32) -> Result<Arc<CoordinateSystem>> {
        self.coordinate_systems.get_or_try_insert(code, || {
            let rec = self.registry.coordinate_system(code)?;
            let cs_type = rec.cs_type.as_deref().unwrap_or("").to_ascii_lowercase();
            let kind = match cs_type.as_str() {
                "ellipsoidal" => CsKind::Ellipsoidal,
                "cartesian" => CsKind::Cartesian,
                "vertical" => CsKind::Vertical,
                other => {
                    return Err(CrsError::illegal(
                        COORDINATE_SYSTEMS,
                        code,
                        format!("unsupported coordinate system type {other:?}"),
                    ))
                }
            };
            let axes = self
                .registry
                .axes(code)?
                .into_iter()
                .map(|rec| self.axis(kind, rec))
                .collect::<Result<Vec<_>>>()?;
            if axes.is_empty() || axes.len() > 3 {
                return Err(CrsError::illegal(
                    COORDINATE_SYSTEMS,
                    code,
                    format!("{} axes", axes.len()),
                ));
            }
            if let Some(dimension) = rec.dimension {
                if dimension != axes.len() as i64 {
                    return Err(CrsError::illegal(
                        COORDINATE_SYSTEMS,
                        code,
                        format!("dimension {} but {} axes", dimension, axes.len()),
                    ));
                }
            }
            for (i, a) in axes.iter().enumerate() {
                if axes[..i].iter().any(|b| b.direction.slot() == a.direction.slot()) {
                    return Err(CrsError::illegal(
                        COORDINATE_SYSTEMS,
                        code,
                        format!("axis {} is collinear with an earlier axis", a.name),
                    ));
                }
            }
            Ok(CoordinateSystem {
                code: Some(code),
                name: self.name(&rec.name),
                kind,
                axes,
            })
        })
    }

    pub fn crs(&self, code: i32) -> Result<Arc<Crs>> {
        self.crs.get_or_try_insert(code, || self.build_crs(code))
    }

    /// Kind string of a CRS row, without building it.
    fn crs_kind(&self, code: i32) -> Result<String> {
        Ok(self
            .registry
            .crs(code)?
            .kind
            .unwrap_or_default()
            .to_ascii_lowercase())
    }

    fn build_crs(&self, code: i32) -> Result<Crs> {
        let rec = self.registry.crs(code)?;
        let illegal = |reason: String| CrsError::illegal(CRS_TABLE, code, reason);
        let kind_name = rec.kind.as_deref().unwrap_or("").to_ascii_lowercase();
        let kind = match kind_name.as_str() {
            "geographic 2d" | "geographic 3d" => {
                let datum = self.datum(required(CRS_TABLE, code, "datum_code", rec.datum)?)?;
                if datum.ellipsoid().is_none() {
                    return Err(illegal(format!("datum {} is not geodetic", datum.code)));
                }
                let cs = self.coordinate_system(required(CRS_TABLE, code, "coord_sys_code", rec.coordinate_system)?)?;
                let expected = if kind_name.ends_with("3d") { 3 } else { 2 };
                if cs.kind != CsKind::Ellipsoidal || cs.dimension() != expected {
                    return Err(illegal(format!("{} needs a {}D ellipsoidal coordinate system", kind_name, expected)));
                }
                CrsKind::Geographic { datum, cs }
            }
            "projected" => {
                let base_code = required(CRS_TABLE, code, "source_geogcrs_code", rec.base_crs)?;
                if !self.crs_kind(base_code)?.starts_with("geographic") {
                    return Err(illegal(format!("base {base_code} is not a geographic CRS")));
                }
                let base = self.crs(base_code)?;
                let conversion = self.conversion(required(CRS_TABLE, code, "projection_conv_code", rec.conversion)?)?;
                let cs = self.coordinate_system(required(CRS_TABLE, code, "coord_sys_code", rec.coordinate_system)?)?;
                if cs.kind != CsKind::Cartesian || cs.dimension() != 2 {
                    return Err(illegal("projected CRS needs a 2D cartesian coordinate system".into()));
                }
                CrsKind::Projected { base, conversion, cs }
            }
            "vertical" => {
                let datum = self.datum(required(CRS_TABLE, code, "datum_code", rec.datum)?)?;
                if !matches!(datum.kind, DatumKind::Vertical { .. }) {
                    return Err(illegal(format!("datum {} is not vertical", datum.code)));
                }
                let cs = self.coordinate_system(required(CRS_TABLE, code, "coord_sys_code", rec.coordinate_system)?)?;
                if cs.kind != CsKind::Vertical || cs.dimension() != 1 {
                    return Err(illegal("vertical CRS needs a 1D vertical coordinate system".into()));
                }
                CrsKind::Vertical { datum, cs }
            }
            "compound" => {
                let h = required(CRS_TABLE, code, "cmpd_horizcrs_code", rec.horizontal)?;
                let v = required(CRS_TABLE, code, "cmpd_vertcrs_code", rec.vertical)?;
                let h_kind = self.crs_kind(h)?;
                if h_kind != "projected" && h_kind != "geographic 2d" {
                    return Err(illegal(format!("horizontal component {h} is {h_kind:?}")));
                }
                if self.crs_kind(v)? != "vertical" {
                    return Err(illegal(format!("vertical component {v} is not vertical")));
                }
                CrsKind::Compound {
                    horizontal: self.crs(h)?,
                    vertical: self.crs(v)?,
                }
            }
            other => return Err(illegal(format!("unknown reference system kind {other:?}"))),
        };
        Ok(Crs {
            code: Code::epsg(code),
            name: self.name(&rec.name),
            aliases: self.registry.aliases(CRS_TABLE, code)?,
            kind,
        })
    }

    fn conversion(&self, code: i32) -> Result<Conversion> {
        let op = self.operation(code)?;
        if op.kind != OperationKind::Conversion {
            return Err(CrsError::illegal(OPERATIONS, code, "not a conversion"));
        }
        let method_code = required(OPERATIONS, code, "coord_op_method_code", op.method)?;
        let method = ProjectionMethod::from_epsg(method_code).ok_or_else(|| {
            CrsError::illegal(OPERATIONS, code, format!("unsupported projection method {method_code}"))
        })?;
        let parameters = op
            .parameters
            .iter()
            .map(|p| {
                Ok(ParameterValue {
                    code: p.code,
                    name: p.name.clone(),
                    value: required(OPERATIONS, code, &format!("value of parameter {}", p.code), p.value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(missing) = method
            .required_parameters()
            .iter()
            .find(|required| !parameters.iter().any(|p| p.code == **required))
        {
            return Err(CrsError::illegal(OPERATIONS, code, format!("missing parameter {missing}")));
        }
        Ok(Conversion {
            code: Some(code),
            name: op.name.clone(),
            method,
            parameters,
        })
    }

    /// A registry operation with its parameters in canonical units.
    pub fn operation(&self, code: i32) -> Result<Arc<CoordinateOperation>> {
        self.operations.get_or_try_insert(code, || {
            let rec = self.registry.operation(code)?;
            let op_type = rec.op_type.as_deref().unwrap_or("").to_ascii_lowercase();
            let kind = match op_type.as_str() {
                "conversion" => OperationKind::Conversion,
                "transformation" => OperationKind::Transformation,
                "concatenated operation" => OperationKind::Concatenated,
                other => {
                    return Err(CrsError::illegal(OPERATIONS, code, format!("unknown operation type {other:?}")))
                }
            };
            let parameters = self
                .registry
                .operation_parameters(code)?
                .into_iter()
                .map(|p| {
                    let value = match (p.value, p.uom) {
                        (Some(v), Some(uom)) => Some(v * self.unit(uom)?.to_canonical()),
                        (value, _) => value,
                    };
                    Ok(OperationParameter {
                        code: p.code,
                        name: p.name.unwrap_or_default(),
                        value,
                        file: p.file,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let mut steps = Vec::new();
            if kind == OperationKind::Concatenated {
                let path = self.registry.operation_path(code)?;
                if path.is_empty() {
                    return Err(CrsError::illegal(OPERATIONS, code, "concatenated operation without steps"));
                }
                for step in path {
                    let nested = self.registry.operation(step)?.op_type.unwrap_or_default();
                    if nested.eq_ignore_ascii_case("concatenated operation") {
                        return Err(CrsError::illegal(
                            OPERATIONS,
                            code,
                            format!("step {step} is itself concatenated"),
                        ));
                    }
                    steps.push(self.operation(step)?);
                }
            }
            Ok(CoordinateOperation {
                code,
                name: self.name(&rec.name),
                kind,
                source_crs: rec.source_crs,
                target_crs: rec.target_crs,
                method: rec.method,
                accuracy: rec.accuracy,
                parameters,
                steps,
            })
        })
    }
}
