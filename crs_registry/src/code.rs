//! Authority codes and the textual forms they are written in.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CrsError, Result};

pub const EPSG: &str = "EPSG";
pub const AUTO: &str = "AUTO";
pub const AUTO2: &str = "AUTO2";

/// Authority namespace plus identifier, with optional runtime parameters for
/// procedural codes such as `AUTO:42001,-100,45`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Code {
    pub authority: String,
    pub id: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<f64>,
}

impl Code {
    /// A plain code in the EPSG namespace.
    pub fn epsg(id: i32) -> Self {
        Self {
            authority: EPSG.to_string(),
            id,
            parameters: Vec::new(),
        }
    }

    /// A code with runtime parameters; the authority is upper-cased.
    pub fn with_parameters(authority: &str, id: i32, parameters: Vec<f64>) -> Self {
        Self {
            authority: authority.to_ascii_uppercase(),
            id,
            parameters,
        }
    }

    /// Parses the textual forms accepted by [`crate::decode`]:
    /// `EPSG:4326`, bare `4326`, `urn:ogc:def:crs:EPSG::4326`,
    /// `http://www.opengis.net/def/crs/EPSG/0/4326` and `AUTO[2]:id,params…`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid = || CrsError::InvalidCode(raw.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }
        if let Ok(id) = trimmed.parse::<i32>() {
            return Ok(Self::epsg(id));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("urn:") {
            // urn:ogc:def:crs:EPSG:<version>:<id>
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() < 6 || !parts[3].eq_ignore_ascii_case("crs") {
                return Err(invalid());
            }
            let id = parts[parts.len() - 1].parse().map_err(|_| invalid())?;
            return Ok(Self::with_parameters(parts[4], id, Vec::new()));
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let parts: Vec<&str> = trimmed.trim_end_matches('/').split('/').collect();
            let n = parts.len();
            if n < 4 || !parts[n - 4].eq_ignore_ascii_case("crs") {
                return Err(invalid());
            }
            let id = parts[n - 1].parse().map_err(|_| invalid())?;
            return Ok(Self::with_parameters(parts[n - 3], id, Vec::new()));
        }
        let (authority, rest) = trimmed.split_once(':').ok_or_else(invalid)?;
        let authority = authority.trim().to_ascii_uppercase();
        if authority.is_empty() {
            return Err(invalid());
        }
        let mut fields = rest.split(',').map(str::trim);
        let id = fields
            .next()
            .and_then(|f| f.parse::<i32>().ok())
            .ok_or_else(invalid)?;
        let parameters = fields
            .map(|f| f.parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        if !parameters.is_empty() && !Self::is_procedural_authority(&authority) {
            return Err(invalid());
        }
        Ok(Self {
            authority,
            id,
            parameters,
        })
    }

    fn is_procedural_authority(authority: &str) -> bool {
        authority == AUTO || authority == AUTO2
    }

    /// `true` for codes synthesized by the AUTO factlets instead of the registry.
    pub fn is_procedural(&self) -> bool {
        Self::is_procedural_authority(&self.authority)
    }
}

impl FromStr for Code {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.id)?;
        for p in &self.parameters {
            write!(f, ",{}", p)?;
        }
        Ok(())
    }
}
