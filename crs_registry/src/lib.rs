//! Coordinate reference system registry and transform engine.
//!
//! Reference systems are read from an EPSG-style relational registry,
//! built once per code and shared. [`find_transform`] resolves the steps
//! between two systems, including datum shifts chosen from the registry's
//! grid and parametric transformations.
//!
//! ```no_run
//! let source = crs_registry::decode("EPSG:27700")?;
//! let target = crs_registry::decode("EPSG:4326")?;
//! let transform = crs_registry::find_transform(&source, &target)?;
//! let position = crs_registry::DirectPosition::new(source, vec![530_000.0, 180_000.0]);
//! let wgs84 = crs_registry::transform(&transform, &position)?;
//! println!("{:?}", wgs84.ordinates);
//! # Ok::<(), crs_registry::CrsError>(())
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

pub mod auto;
pub mod cache;
pub mod code;
pub mod dialect;
pub mod error;
pub mod factory;
pub mod geometry;
pub mod grid;
pub mod hints;
pub mod math;
pub mod model;
#[cfg(feature = "proj")]
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod shift;
pub mod transform;

pub use code::Code;
pub use dialect::Dialect;
pub use error::{CrsError, Result};
pub use factory::CrsFactory;
pub use geometry::{DirectPosition, Envelope};
pub use grid::{DatumShiftGrid, GridStore};
pub use hints::{Hints, NameStyle};
pub use model::Crs;
pub use registry::Registry;
pub use resolver::OperationResolver;
pub use shift::ShiftMethod;
pub use transform::Transform;

static FACTORY: Lazy<RwLock<Option<Arc<CrsFactory>>>> = Lazy::new(|| RwLock::new(None));

/// Replaces the process-wide factory. Objects decoded earlier stay valid but
/// are no longer shared with later lookups.
pub fn install(factory: CrsFactory) -> Arc<CrsFactory> {
    let factory = Arc::new(factory);
    let mut slot = FACTORY.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        log::info!("replacing the installed reference system factory");
    }
    *slot = Some(factory.clone());
    factory
}

/// Drops the process-wide factory; the next lookup opens the bundled registry.
pub fn reset() {
    FACTORY.write().unwrap_or_else(PoisonError::into_inner).take();
}

/// The process-wide factory, created over the bundled registry with default
/// hints on first use.
pub fn factory() -> Result<Arc<CrsFactory>> {
    if let Some(factory) = FACTORY.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(factory.clone());
    }
    let mut slot = FACTORY.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(factory) = slot.as_ref() {
        return Ok(factory.clone());
    }
    let factory = Arc::new(CrsFactory::bundled(Hints::default())?);
    *slot = Some(factory.clone());
    Ok(factory)
}

/// Decodes `code` through the process-wide factory.
pub fn decode(code: &str) -> Result<Arc<Crs>> {
    factory()?.decode(code)
}

/// Finds the transform from `source` to `target` with the process-wide factory.
pub fn find_transform(source: &Arc<Crs>, target: &Arc<Crs>) -> Result<Transform> {
    factory()?.resolver().find_transform(source, target)
}

/// Transforms one position; it must be tagged with the transform's source.
pub fn transform(transform: &Transform, position: &DirectPosition) -> Result<DirectPosition> {
    transform.transform_position(position)
}

/// Bounding box of the transformed envelope corners.
pub fn transform_envelope(transform: &Transform, envelope: &Envelope) -> Result<Envelope> {
    transform.transform_envelope(envelope)
}
