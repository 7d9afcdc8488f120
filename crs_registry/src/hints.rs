//! Factory configuration, consumed once when a factory is built.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{CrsError, Result};
use crate::shift::ShiftMethod;

/// How object names are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    /// The registry name as stored, e.g. `WGS 84`.
    #[default]
    Local,
    /// The name prefixed with its authority, e.g. `EPSG:WGS 84`.
    Scoped,
}

impl NameStyle {
    pub fn apply(&self, name: &str) -> String {
        match self {
            NameStyle::Local => name.to_string(),
            NameStyle::Scoped => format!("EPSG:{name}"),
        }
    }
}

impl fmt::Display for NameStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameStyle::Local => "local",
            NameStyle::Scoped => "scoped",
        })
    }
}

impl FromStr for NameStyle {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(NameStyle::Local),
            "scoped" => Ok(NameStyle::Scoped),
            _ => Err(invalid("name_factory", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hints {
    /// Preferred datum shift method; registry data decides when absent.
    pub datum_shift_method: Option<ShiftMethod>,
    pub name_factory: NameStyle,
    pub dialect: Dialect,
    /// Directory scanned for `*.json` datum shift grids.
    pub grid_directory: Option<PathBuf>,
    /// Run the parametric shift where a grid does not cover a position.
    pub grid_fallback: bool,
    /// Accept an ellipsoid-only shift when the registry knows no operation.
    pub lenient_datum_shift: bool,
}

fn invalid(key: &str, value: &str) -> CrsError {
    CrsError::InvalidHint {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

impl Hints {
    /// Builds hints from named options; unknown names are rejected.
    pub fn from_map(options: &HashMap<String, String>) -> Result<Self> {
        let mut hints = Hints::default();
        for (key, value) in options {
            match key.as_str() {
                "datum_shift_method" => hints.datum_shift_method = Some(value.parse()?),
                "name_factory" => hints.name_factory = value.parse()?,
                "dialect" => hints.dialect = value.parse()?,
                "grid_directory" => hints.grid_directory = Some(PathBuf::from(value)),
                "grid_fallback" => hints.grid_fallback = parse_bool(key, value)?,
                "lenient_datum_shift" => hints.lenient_datum_shift = parse_bool(key, value)?,
                _ => return Err(invalid(key, value)),
            }
        }
        Ok(hints)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn named_options() {
        let hints = Hints::from_map(&options(&[
            ("datum_shift_method", "Molodensky"),
            ("name_factory", "scoped"),
            ("dialect", "hsql"),
            ("grid_fallback", "true"),
        ]))
        .unwrap();
        assert_eq!(hints.datum_shift_method, Some(ShiftMethod::Molodensky));
        assert_eq!(hints.name_factory, NameStyle::Scoped);
        assert_eq!(hints.dialect, Dialect::Hsql);
        assert!(hints.grid_fallback);
        assert!(!hints.lenient_datum_shift);
    }

    #[test]
    fn unknown_or_bad_values() {
        assert!(matches!(
            Hints::from_map(&options(&[("colour", "red")])),
            Err(CrsError::InvalidHint { ref key, .. }) if key == "colour"
        ));
        assert!(Hints::from_map(&options(&[("datum_shift_method", "Guess")])).is_err());
        assert!(Hints::from_map(&options(&[("grid_fallback", "maybe")])).is_err());
    }

    #[test]
    fn json_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let hints = Hints {
            datum_shift_method: Some(ShiftMethod::Grid),
            grid_directory: Some(PathBuf::from("/opt/grids")),
            ..Default::default()
        };
        hints.save(file.path()).unwrap();
        assert_eq!(Hints::load(file.path()).unwrap(), hints);

        std::fs::write(file.path(), r#"{ "dialect": "access" }"#).unwrap();
        let partial = Hints::load(file.path()).unwrap();
        assert_eq!(partial.dialect, Dialect::Access);
        assert_eq!(partial.datum_shift_method, None);
    }

    #[test]
    fn scoped_names() {
        assert_eq!(NameStyle::Scoped.apply("WGS 84"), "EPSG:WGS 84");
        assert_eq!(NameStyle::Local.apply("WGS 84"), "WGS 84");
    }
}
