//! Cross-checks against PROJ, available with the `proj` feature.

use proj::Proj;

use crate::model::Crs;

/// Converts `(x, y)` with PROJ between the registry codes of `source` and
/// `target`. Ordinates are in PROJ's visualization order (longitude first).
pub fn reference_point(source: &Crs, target: &Crs, x: f64, y: f64) -> Option<(f64, f64)> {
    let proj = Proj::new_known_crs(&source.code.to_string(), &target.code.to_string(), None).ok()?;
    proj.convert((x, y)).ok()
}
