//! Datum-shift grids: sampled correction surfaces over a geographic region.
//!
//! Grids are stored as JSON documents. Shifts are arc-seconds, positive
//! east and north, laid out row by row starting at the south-west node.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CrsError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatumShiftGrid {
    pub name: String,
    /// Longitude of the south-west node, degrees.
    pub west: f64,
    /// Latitude of the south-west node, degrees.
    pub south: f64,
    pub lon_step: f64,
    pub lat_step: f64,
    pub cols: usize,
    pub rows: usize,
    /// `[longitude, latitude]` shifts in arc-seconds.
    pub shifts: Vec<[f64; 2]>,
}

/// Geographic bounds a grid is defined over, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coverage {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Coverage {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        const EPS: f64 = 1e-12;
        lon >= self.west - EPS
            && lon <= self.east + EPS
            && lat >= self.south - EPS
            && lat <= self.north + EPS
    }
}

impl DatumShiftGrid {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CrsError::InvalidGrid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.cols < 2 || self.rows < 2 {
            return Err(invalid("a grid needs at least 2x2 nodes"));
        }
        if !(self.lon_step > 0.0 && self.lat_step > 0.0) {
            return Err(invalid("grid steps must be positive"));
        }
        if self.shifts.len() != self.cols * self.rows {
            return Err(invalid("node count does not match cols x rows"));
        }
        Ok(())
    }

    pub fn coverage(&self) -> Coverage {
        Coverage {
            west: self.west,
            south: self.south,
            east: self.west + self.lon_step * (self.cols - 1) as f64,
            north: self.south + self.lat_step * (self.rows - 1) as f64,
        }
    }

    /// Bilinear interpolation of the shift in degrees; `None` outside the grid.
    pub fn interpolate(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !self.coverage().contains(lon, lat) {
            return None;
        }
        let fx = ((lon - self.west) / self.lon_step).max(0.0);
        let fy = ((lat - self.south) / self.lat_step).max(0.0);
        let col = (fx.floor() as usize).min(self.cols - 2);
        let row = (fy.floor() as usize).min(self.rows - 2);
        let tx = fx - col as f64;
        let ty = fy - row as f64;
        let node = |c: usize, r: usize| self.shifts[r * self.cols + c];
        let (sw, se) = (node(col, row), node(col + 1, row));
        let (nw, ne) = (node(col, row + 1), node(col + 1, row + 1));
        let blend = |i: usize| {
            let south = sw[i] + (se[i] - sw[i]) * tx;
            let north = nw[i] + (ne[i] - nw[i]) * tx;
            (south + (north - south) * ty) / 3600.0
        };
        Some((blend(0), blend(1)))
    }

    fn out_of_domain(&self, longitude: f64, latitude: f64) -> CrsError {
        CrsError::OutOfDomain {
            grid: self.name.clone(),
            longitude,
            latitude,
        }
    }

    /// Applies the correction at `(lon, lat)`.
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let (dlon, dlat) = self
            .interpolate(lon, lat)
            .ok_or_else(|| self.out_of_domain(lon, lat))?;
        Ok((lon + dlon, lat + dlat))
    }

    /// Finds the position whose corrected value is `(lon, lat)`.
    pub fn inverse(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let (mut x, mut y) = (lon, lat);
        for _ in 0..20 {
            let (dlon, dlat) = self
                .interpolate(x, y)
                .ok_or_else(|| self.out_of_domain(lon, lat))?;
            let (nx, ny) = (lon - dlon, lat - dlat);
            let converged = (nx - x).abs() < 1e-12 && (ny - y).abs() < 1e-12;
            x = nx;
            y = ny;
            if converged {
                break;
            }
        }
        Ok((x, y))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let grid: DatumShiftGrid = serde_json::from_str(&data)?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Installed grids, looked up by the file name a registry operation refers to.
#[derive(Debug, Default, Clone)]
pub struct GridStore {
    grids: HashMap<String, Arc<DatumShiftGrid>>,
}

/// `"dir/NTv2_0.gsb"` and `"ntv2_0.json"` share the key `"ntv2_0"`.
fn grid_key(file: &str) -> String {
    let base = file.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    stem.to_ascii_lowercase()
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` grid found in `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let grid = DatumShiftGrid::load(&path)?;
            let key = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(grid_key)
                .unwrap_or_else(|| grid_key(&grid.name));
            log::info!("loaded datum shift grid {} from {}", grid.name, path.display());
            store.grids.insert(key, Arc::new(grid));
        }
        Ok(store)
    }

    pub fn insert(&mut self, grid: DatumShiftGrid) -> Result<()> {
        grid.validate()?;
        self.grids.insert(grid_key(&grid.name), Arc::new(grid));
        Ok(())
    }

    pub fn get(&self, file: &str) -> Option<Arc<DatumShiftGrid>> {
        self.grids.get(&grid_key(file)).cloned()
    }

    pub fn contains(&self, file: &str) -> bool {
        self.grids.contains_key(&grid_key(file))
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    /// 3x3 nodes over [0, 2] x [50, 52] with shifts growing eastwards.
    fn sample() -> DatumShiftGrid {
        let mut shifts = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                shifts.push([col as f64 * 3.6, 1.8 + row as f64 * 0.36]);
            }
        }
        DatumShiftGrid {
            name: "sample.gsb".into(),
            west: 0.0,
            south: 50.0,
            lon_step: 1.0,
            lat_step: 1.0,
            cols: 3,
            rows: 3,
            shifts,
        }
    }

    #[test]
    fn interpolates_inside() {
        let grid = sample();
        let (dlon, dlat) = grid.interpolate(0.5, 51.5).unwrap();
        assert_abs_diff_eq!(dlon, 0.0005, epsilon = 1e-12);
        assert_abs_diff_eq!(dlat, (1.8 + 0.54) / 3600.0, epsilon = 1e-12);
        let (dlon, _) = grid.interpolate(2.0, 52.0).unwrap();
        assert_abs_diff_eq!(dlon, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn rejects_outside() {
        let grid = sample();
        assert_eq!(grid.coverage().east, 2.0);
        assert!(grid.interpolate(2.1, 51.0).is_none());
        assert!(matches!(
            grid.forward(-1.0, 51.0),
            Err(CrsError::OutOfDomain { .. })
        ));
    }

    #[test]
    fn inverse_converges() {
        let grid = sample();
        let (lon, lat) = grid.forward(1.25, 50.75).unwrap();
        let (x, y) = grid.inverse(lon, lat).unwrap();
        assert_abs_diff_eq!(x, 1.25, epsilon = 1e-11);
        assert_abs_diff_eq!(y, 50.75, epsilon = 1e-11);
    }

    #[test]
    fn store_loads_directory() {
        let dir = TempDir::new().unwrap();
        sample().save(dir.path().join("Sample.json")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = GridStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("SAMPLE.gsb"));
        assert!(store.get("other.gsb").is_none());
    }

    #[test]
    fn invalid_grid_is_rejected() {
        let mut grid = sample();
        grid.shifts.pop();
        assert!(matches!(
            GridStore::new().insert(grid),
            Err(CrsError::InvalidGrid { .. })
        ));
    }
}
