//! Immutable reference-system objects built by the factory.
//!
//! Objects are shared through [`Arc`]; the factory hands out one instance per
//! code. Behaviour common to several variants lives in free functions at the
//! bottom of the module.

use std::f64::consts::PI;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::code::Code;
use crate::math::projection::ProjectionMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitKind {
    Angle,
    Length,
    Scale,
    Time,
}

/// Unit of measure; `factor` converts to radians, metres, unity or seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub code: i32,
    pub name: String,
    pub kind: UnitKind,
    pub factor: f64,
}

impl Unit {
    pub fn metre() -> Self {
        Self {
            code: 9001,
            name: "metre".into(),
            kind: UnitKind::Length,
            factor: 1.0,
        }
    }

    pub fn degree() -> Self {
        Self {
            code: 9122,
            name: "degree".into(),
            kind: UnitKind::Angle,
            factor: PI / 180.0,
        }
    }

    /// Factor converting a value in this unit to degrees (angles), metres
    /// (lengths) or unity (scales).
    pub fn to_canonical(&self) -> f64 {
        match self.kind {
            UnitKind::Angle => self.factor * 180.0 / PI,
            _ => self.factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ellipsoid {
    pub code: i32,
    pub name: String,
    /// Metres.
    pub semi_major_axis: f64,
    /// Infinite for a sphere.
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub fn wgs84() -> Self {
        Self {
            code: 7030,
            name: "WGS 84".into(),
            semi_major_axis: 6_378_137.0,
            inverse_flattening: 298.257_223_563,
        }
    }

    pub fn flattening(&self) -> f64 {
        if self.inverse_flattening.is_finite() {
            1.0 / self.inverse_flattening
        } else {
            0.0
        }
    }

    pub fn semi_minor_axis(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.flattening())
    }

    pub fn eccentricity_squared(&self) -> f64 {
        let f = self.flattening();
        f * (2.0 - f)
    }

    /// Same figure, regardless of code and name.
    pub fn same_figure(&self, other: &Ellipsoid) -> bool {
        (self.semi_major_axis - other.semi_major_axis).abs() < 1e-6
            && (self.flattening() - other.flattening()).abs() < 1e-15
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimeMeridian {
    pub code: i32,
    pub name: String,
    /// Degrees east of Greenwich.
    pub greenwich_longitude: f64,
}

impl PrimeMeridian {
    pub fn greenwich() -> Self {
        Self {
            code: 8901,
            name: "Greenwich".into(),
            greenwich_longitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerticalDatumType {
    Geoidal,
    Depth,
    Barometric,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DatumKind {
    Geodetic {
        ellipsoid: Arc<Ellipsoid>,
        prime_meridian: Arc<PrimeMeridian>,
    },
    Vertical {
        vertical_type: VerticalDatumType,
    },
    Temporal,
    Engineering,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datum {
    pub code: i32,
    pub name: String,
    pub anchor: Option<String>,
    pub realization_epoch: Option<NaiveDate>,
    pub kind: DatumKind,
}

impl Datum {
    pub fn wgs84() -> Self {
        Self {
            code: 6326,
            name: "World Geodetic System 1984".into(),
            anchor: None,
            realization_epoch: NaiveDate::from_ymd_opt(1984, 1, 1),
            kind: DatumKind::Geodetic {
                ellipsoid: Arc::new(Ellipsoid::wgs84()),
                prime_meridian: Arc::new(PrimeMeridian::greenwich()),
            },
        }
    }

    pub fn ellipsoid(&self) -> Option<&Arc<Ellipsoid>> {
        match &self.kind {
            DatumKind::Geodetic { ellipsoid, .. } => Some(ellipsoid),
            _ => None,
        }
    }

    pub fn prime_meridian(&self) -> Option<&Arc<PrimeMeridian>> {
        match &self.kind {
            DatumKind::Geodetic { prime_meridian, .. } => Some(prime_meridian),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisDirection {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl AxisDirection {
    /// Working-buffer slot of the axis: 0 east-west, 1 north-south, 2 vertical.
    pub fn slot(&self) -> usize {
        match self {
            AxisDirection::East | AxisDirection::West => 0,
            AxisDirection::North | AxisDirection::South => 1,
            AxisDirection::Up | AxisDirection::Down => 2,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            AxisDirection::West | AxisDirection::South | AxisDirection::Down => -1.0,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub name: String,
    pub abbreviation: String,
    pub direction: AxisDirection,
    pub unit: Arc<Unit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CsKind {
    Ellipsoidal,
    Cartesian,
    Vertical,
}

/// Ordered axes; fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateSystem {
    pub code: Option<i32>,
    pub name: String,
    pub kind: CsKind,
    pub axes: Vec<Axis>,
}

impl CoordinateSystem {
    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    /// Longitude/latitude in degrees, the axis order of `CRS:84`.
    pub fn lon_lat_degrees() -> Self {
        let degree = Arc::new(Unit::degree());
        Self {
            code: None,
            name: "Ellipsoidal 2D CS. Axes: longitude, latitude. Orientations: east, north. UoM: degree".into(),
            kind: CsKind::Ellipsoidal,
            axes: vec![
                Axis {
                    name: "Geodetic longitude".into(),
                    abbreviation: "Lon".into(),
                    direction: AxisDirection::East,
                    unit: degree.clone(),
                },
                Axis {
                    name: "Geodetic latitude".into(),
                    abbreviation: "Lat".into(),
                    direction: AxisDirection::North,
                    unit: degree,
                },
            ],
        }
    }

    pub fn easting_northing(unit: Unit) -> Self {
        let unit = Arc::new(unit);
        Self {
            code: None,
            name: format!("Cartesian 2D CS. Axes: easting, northing (E,N). UoM: {}", unit.name),
            kind: CsKind::Cartesian,
            axes: vec![
                Axis {
                    name: "Easting".into(),
                    abbreviation: "E".into(),
                    direction: AxisDirection::East,
                    unit: unit.clone(),
                },
                Axis {
                    name: "Northing".into(),
                    abbreviation: "N".into(),
                    direction: AxisDirection::North,
                    unit,
                },
            ],
        }
    }
}

/// Numeric operation parameter, in degrees, metres or unity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterValue {
    pub code: i32,
    pub name: String,
    pub value: f64,
}

/// Map projection applied by a projected reference system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub code: Option<i32>,
    pub name: String,
    pub method: ProjectionMethod,
    pub parameters: Vec<ParameterValue>,
}

impl Conversion {
    pub fn parameter(&self, code: i32) -> Option<f64> {
        self.parameters.iter().find(|p| p.code == code).map(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CrsKind {
    Geographic {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Projected {
        base: Arc<Crs>,
        conversion: Conversion,
        cs: Arc<CoordinateSystem>,
    },
    Vertical {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Compound {
        horizontal: Arc<Crs>,
        vertical: Arc<Crs>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crs {
    pub code: Code,
    pub name: String,
    pub aliases: Vec<String>,
    pub kind: CrsKind,
}

impl Crs {
    /// WGS 84 in longitude/latitude order, independent of any registry.
    pub fn crs84() -> Self {
        Self {
            code: Code::with_parameters("CRS", 84, Vec::new()),
            name: "WGS 84 (CRS84)".into(),
            aliases: Vec::new(),
            kind: CrsKind::Geographic {
                datum: Arc::new(Datum::wgs84()),
                cs: Arc::new(CoordinateSystem::lon_lat_degrees()),
            },
        }
    }

    pub fn dimension(&self) -> usize {
        dimension(self)
    }

    /// Same definition as `other`; the code is what makes two objects the same.
    pub fn same_code(&self, other: &Crs) -> bool {
        self.code == other.code
    }
}

/// Number of ordinates of positions in `crs`.
pub fn dimension(crs: &Crs) -> usize {
    match &crs.kind {
        CrsKind::Geographic { cs, .. }
        | CrsKind::Projected { cs, .. }
        | CrsKind::Vertical { cs, .. } => cs.dimension(),
        CrsKind::Compound {
            horizontal,
            vertical,
        } => dimension(horizontal) + dimension(vertical),
    }
}

/// All axes of `crs` in ordinate order.
pub fn axes(crs: &Crs) -> Vec<Axis> {
    match &crs.kind {
        CrsKind::Geographic { cs, .. }
        | CrsKind::Projected { cs, .. }
        | CrsKind::Vertical { cs, .. } => cs.axes.clone(),
        CrsKind::Compound {
            horizontal,
            vertical,
        } => {
            let mut all = axes(horizontal);
            all.extend(axes(vertical));
            all
        }
    }
}

/// The geographic reference system a horizontal CRS is ultimately based on.
pub fn base_geographic(crs: &Arc<Crs>) -> Option<Arc<Crs>> {
    match &crs.kind {
        CrsKind::Geographic { .. } => Some(crs.clone()),
        CrsKind::Projected { base, .. } => base_geographic(base),
        CrsKind::Compound { horizontal, .. } => base_geographic(horizontal),
        CrsKind::Vertical { .. } => None,
    }
}

pub fn geodetic_datum(crs: &Crs) -> Option<&Arc<Datum>> {
    match &crs.kind {
        CrsKind::Geographic { datum, .. } => Some(datum),
        CrsKind::Projected { base, .. } => geodetic_datum(base),
        CrsKind::Compound { horizontal, .. } => geodetic_datum(horizontal),
        CrsKind::Vertical { .. } => None,
    }
}

/// Horizontal and vertical components; either may be absent.
pub fn components(crs: &Arc<Crs>) -> (Option<Arc<Crs>>, Option<Arc<Crs>>) {
    match &crs.kind {
        CrsKind::Compound {
            horizontal,
            vertical,
        } => (Some(horizontal.clone()), Some(vertical.clone())),
        CrsKind::Vertical { .. } => (None, Some(crs.clone())),
        _ => (Some(crs.clone()), None),
    }
}

/// `true` when the reference system carries an ellipsoidal height ordinate.
pub fn has_ellipsoidal_height(crs: &Crs) -> bool {
    match &crs.kind {
        CrsKind::Geographic { cs, .. } => cs.dimension() == 3,
        _ => false,
    }
}

pub fn same_datum(a: &Datum, b: &Datum) -> bool {
    a.code == b.code
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Conversion,
    Transformation,
    Concatenated,
}

/// Operation parameter; numeric values are in degrees, metres or unity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationParameter {
    pub code: i32,
    pub name: String,
    pub value: Option<f64>,
    pub file: Option<String>,
}

/// A registry-defined operation between two reference systems.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateOperation {
    pub code: i32,
    pub name: String,
    pub kind: OperationKind,
    pub source_crs: Option<i32>,
    pub target_crs: Option<i32>,
    pub method: Option<i32>,
    /// Metres; `None` when the registry does not say.
    pub accuracy: Option<f64>,
    pub parameters: Vec<OperationParameter>,
    /// Single operations of a concatenated operation, in order.
    pub steps: Vec<Arc<CoordinateOperation>>,
}

impl CoordinateOperation {
    pub fn value(&self, code: i32) -> Option<f64> {
        self.parameters.iter().find(|p| p.code == code).and_then(|p| p.value)
    }

    pub fn file(&self, code: i32) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.code == code)
            .and_then(|p| p.file.as_deref())
    }
}
