//! Numerical kernels: projections and datum-shift formulas.

pub mod geocentric;
pub mod helmert;
pub mod molodensky;
pub mod projection;

pub use helmert::BursaWolf;
pub use projection::{Projection, ProjectionMethod};

/// Radians per arc-second.
pub const ARC_SECOND: f64 = std::f64::consts::PI / (180.0 * 3600.0);
