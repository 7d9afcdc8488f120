#![cfg(feature = "proj")]

use approx::assert_abs_diff_eq;
use crs_registry::reference::reference_point;
use crs_registry::{CrsFactory, Hints};

#[test]
fn utm_agrees_with_proj() {
    let f = CrsFactory::bundled(Hints::default()).unwrap();
    let (source, target) = (f.decode("EPSG:4326").unwrap(), f.decode("EPSG:32630").unwrap());
    let t = f.resolver().find_transform(&source, &target).unwrap();
    for (lon, lat) in [(-3.0, 50.0), (-4.5, 56.0), (-1.2, 52.3)] {
        let ours = t.apply(&[lat, lon]).unwrap();
        let (x, y) = reference_point(&source, &target, lon, lat).unwrap();
        assert_abs_diff_eq!(ours[0], x, epsilon = 1e-2);
        assert_abs_diff_eq!(ours[1], y, epsilon = 1e-2);
    }
}
