//! Procedural `AUTO` / `AUTO2` projections centred on a caller-supplied
//! position. Every call builds a fresh reference system on the built-in
//! WGS 84 base; nothing is read from the registry and nothing is cached.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::code::{Code, AUTO2};
use crate::error::{CrsError, Result};
use crate::math::projection::{
    CENTRAL_MERIDIAN, FALSE_EASTING, FALSE_NORTHING, LATITUDE_OF_ORIGIN, SCALE_FACTOR,
    STANDARD_PARALLEL,
};
use crate::math::ProjectionMethod;
use crate::model::{CoordinateSystem, Conversion, Crs, CrsKind, ParameterValue, Unit, UnitKind};

static CRS84: Lazy<Arc<Crs>> = Lazy::new(|| Arc::new(Crs::crs84()));

/// The shared `CRS:84` instance.
pub fn crs84() -> Arc<Crs> {
    CRS84.clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFamily {
    /// 42001
    Utm,
    /// 42002
    TransverseMercator,
    /// 42003
    Orthographic,
    /// 42004
    Equirectangular,
}

impl AutoFamily {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            42001 => Some(AutoFamily::Utm),
            42002 => Some(AutoFamily::TransverseMercator),
            42003 => Some(AutoFamily::Orthographic),
            42004 => Some(AutoFamily::Equirectangular),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AutoFamily::Utm => "WGS 84 / Auto UTM",
            AutoFamily::TransverseMercator => "WGS 84 / Auto Tr. Mercator",
            AutoFamily::Orthographic => "WGS 84 / Auto Orthographic",
            AutoFamily::Equirectangular => "WGS 84 / Auto Equirectangular",
        }
    }
}

fn linear_unit(code: i32) -> Option<Unit> {
    let (name, factor) = match code {
        9001 => ("metre", 1.0),
        9002 => ("foot", 0.3048),
        9003 => ("US survey foot", 12.0 / 39.37),
        _ => return None,
    };
    Some(Unit {
        code,
        name: name.into(),
        kind: UnitKind::Length,
        factor,
    })
}

/// AUTO2 gives the unit as metres per unit; known factors map back to their codes.
fn unit_from_factor(factor: f64) -> Unit {
    [9001, 9002, 9003]
        .into_iter()
        .filter_map(linear_unit)
        .find(|u| (u.factor - factor).abs() < 1e-12)
        .unwrap_or_else(|| Unit {
            code: 0,
            name: format!("{factor} metre"),
            kind: UnitKind::Length,
            factor,
        })
}

fn param(code: i32, name: &str, value: f64) -> ParameterValue {
    ParameterValue {
        code,
        name: name.into(),
        value,
    }
}

/// Builds the reference system named by an `AUTO` or `AUTO2` code.
pub fn build(code: &Code) -> Result<Arc<Crs>> {
    let invalid = || CrsError::InvalidCode(code.to_string());
    let family = AutoFamily::from_id(code.id).ok_or_else(invalid)?;
    let (unit, lon, lat) = match (code.authority.as_str(), code.parameters.as_slice()) {
        (_, &[lon, lat]) => (Unit::metre(), lon, lat),
        (AUTO2, &[factor, lon, lat]) if factor > 0.0 => (unit_from_factor(factor), lon, lat),
        (AUTO2, _) => return Err(invalid()),
        (_, &[unit, lon, lat]) if unit.fract() == 0.0 => {
            (linear_unit(unit as i32).ok_or_else(invalid)?, lon, lat)
        }
        _ => return Err(invalid()),
    };
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(invalid());
    }
    let south_offset = if lat < 0.0 { 10_000_000.0 } else { 0.0 };
    let (method, parameters) = match family {
        AutoFamily::Utm => {
            let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).min(60);
            let central_meridian = -183.0 + 6.0 * f64::from(zone);
            (
                ProjectionMethod::TransverseMercator,
                vec![
                    param(LATITUDE_OF_ORIGIN, "Latitude of natural origin", 0.0),
                    param(CENTRAL_MERIDIAN, "Longitude of natural origin", central_meridian),
                    param(SCALE_FACTOR, "Scale factor at natural origin", 0.9996),
                    param(FALSE_EASTING, "False easting", 500_000.0),
                    param(FALSE_NORTHING, "False northing", south_offset),
                ],
            )
        }
        AutoFamily::TransverseMercator => (
            ProjectionMethod::TransverseMercator,
            vec![
                param(LATITUDE_OF_ORIGIN, "Latitude of natural origin", 0.0),
                param(CENTRAL_MERIDIAN, "Longitude of natural origin", lon),
                param(SCALE_FACTOR, "Scale factor at natural origin", 0.9996),
                param(FALSE_EASTING, "False easting", 500_000.0),
                param(FALSE_NORTHING, "False northing", south_offset),
            ],
        ),
        AutoFamily::Orthographic => (
            ProjectionMethod::Orthographic,
            vec![
                param(LATITUDE_OF_ORIGIN, "Latitude of natural origin", lat),
                param(CENTRAL_MERIDIAN, "Longitude of natural origin", lon),
                param(FALSE_EASTING, "False easting", 0.0),
                param(FALSE_NORTHING, "False northing", 0.0),
            ],
        ),
        AutoFamily::Equirectangular => (
            ProjectionMethod::EquidistantCylindrical,
            vec![
                param(STANDARD_PARALLEL, "Latitude of 1st standard parallel", lat),
                param(CENTRAL_MERIDIAN, "Longitude of natural origin", lon),
                param(FALSE_EASTING, "False easting", 0.0),
                param(FALSE_NORTHING, "False northing", 0.0),
            ],
        ),
    };
    Ok(Arc::new(Crs {
        code: code.clone(),
        name: family.name().to_string(),
        aliases: Vec::new(),
        kind: CrsKind::Projected {
            base: crs84(),
            conversion: Conversion {
                code: None,
                name: family.name().trim_start_matches("WGS 84 / ").to_string(),
                method,
                parameters,
            },
            cs: Arc::new(CoordinateSystem::easting_northing(unit)),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversion(crs: &Crs) -> &Conversion {
        match &crs.kind {
            CrsKind::Projected { conversion, .. } => conversion,
            _ => panic!("not projected"),
        }
    }

    #[test]
    fn utm_zone_from_longitude() {
        let crs = build(&Code::parse("AUTO:42001,-100,45").unwrap()).unwrap();
        assert_eq!(crs.name, "WGS 84 / Auto UTM");
        assert_eq!(conversion(&crs).parameter(CENTRAL_MERIDIAN), Some(-99.0));
        let south = build(&Code::parse("AUTO:42001,-100,-45").unwrap()).unwrap();
        assert_eq!(conversion(&south).parameter(FALSE_NORTHING), Some(10_000_000.0));
        let east_edge = build(&Code::parse("AUTO:42001,180,0").unwrap()).unwrap();
        assert_eq!(conversion(&east_edge).parameter(CENTRAL_MERIDIAN), Some(177.0));
    }

    #[test]
    fn units_from_parameters() {
        let feet = build(&Code::parse("AUTO:42002,9002,10,50").unwrap()).unwrap();
        let CrsKind::Projected { cs, .. } = &feet.kind else {
            panic!("not projected")
        };
        assert_eq!(cs.axes[0].unit.code, 9002);
        let auto2 = build(&Code::parse("AUTO2:42002,0.3048,10,50").unwrap()).unwrap();
        let CrsKind::Projected { cs, .. } = &auto2.kind else {
            panic!("not projected")
        };
        assert_eq!(cs.axes[0].unit.code, 9002);
    }

    #[test]
    fn bad_codes() {
        for raw in [
            "AUTO:42005,0,0",
            "AUTO:42001,0",
            "AUTO:42001,200,0",
            "AUTO:42001,9999,0,0",
            "AUTO2:42001,0,0,0",
        ] {
            let code = Code::parse(raw).unwrap();
            assert!(matches!(build(&code), Err(CrsError::InvalidCode(_))), "{raw}");
        }
    }

    #[test]
    fn built_afresh() {
        let code = Code::parse("AUTO:42003,10,45").unwrap();
        let a = build(&code).unwrap();
        let b = build(&code).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }
}
