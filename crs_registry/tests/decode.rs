use std::sync::{Arc, Barrier};

use crs_registry::model::CrsKind;
use crs_registry::{CrsError, CrsFactory, Dialect, Hints, Registry};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn factory() -> CrsFactory {
    init();
    CrsFactory::bundled(Hints::default()).unwrap()
}

#[test]
fn decode_returns_the_same_instance() {
    let f = factory();
    for raw in ["EPSG:27700", "urn:ogc:def:crs:EPSG::4326", "5498"] {
        let a = f.decode(raw).unwrap();
        let b = f.decode(raw).unwrap();
        assert!(Arc::ptr_eq(&a, &b), "{raw}");
    }
    let short = f.decode("4326").unwrap();
    let url = f.decode("http://www.opengis.net/def/crs/EPSG/0/4326").unwrap();
    assert!(Arc::ptr_eq(&short, &url));
}

#[test]
fn shared_nested_objects() {
    let f = factory();
    let projected = f.decode("EPSG:32630").unwrap();
    let geographic = f.decode("EPSG:4326").unwrap();
    let CrsKind::Projected { base, .. } = &projected.kind else {
        panic!("32630 is projected");
    };
    assert!(Arc::ptr_eq(base, &geographic));
}

#[test]
fn concurrent_first_lookup_builds_once() {
    let f = Arc::new(factory());
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (f, barrier) = (f.clone(), barrier.clone());
            std::thread::spawn(move || {
                barrier.wait();
                f.decode("EPSG:7405").unwrap()
            })
        })
        .collect();
    let all: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(all.iter().all(|crs| Arc::ptr_eq(crs, &all[0])));
}

#[test]
fn clear_builds_new_instances() {
    let f = factory();
    let before = f.decode("EPSG:27700").unwrap();
    f.clear();
    let after = f.decode("EPSG:27700").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before, after);
}

#[test]
fn duplicated_rows_fail_decode() {
    let f = factory();
    f.registry()
        .execute_batch(
            "INSERT INTO epsg_coordinatereferencesystem VALUES \
             (4230, 'ED50 copy', 'geographic 2D', 6422, 6230, NULL, NULL, NULL, NULL);",
        )
        .unwrap();
    match f.decode("EPSG:4230") {
        Err(CrsError::DuplicatedRecord { table, key, .. }) => {
            assert_eq!(table, "epsg_coordinatereferencesystem");
            assert_eq!(key, "4230");
        }
        other => panic!("expected a duplicated record, got {other:?}"),
    }
    // Other codes are unaffected.
    assert!(f.decode("EPSG:4326").is_ok());
}

#[test]
fn duplicated_nested_rows_fail_decode() {
    let f = factory();
    f.registry()
        .execute_batch(
            "INSERT INTO epsg_ellipsoid VALUES (7022, 'International 1924', 6378388, 297, NULL, 9001);",
        )
        .unwrap();
    assert!(matches!(
        f.decode("EPSG:4230"),
        Err(CrsError::DuplicatedRecord { key, .. }) if key == "7022"
    ));
}

#[test]
fn duplicated_parameter_values_fail_decode() {
    let f = factory();
    f.registry()
        .execute_batch("INSERT INTO epsg_coordoperationparamvalue VALUES (16030, 9807, 8802, 15, NULL, 9102);")
        .unwrap();
    match f.decode("EPSG:32630") {
        Err(CrsError::DuplicatedRecord { table, column, key }) => {
            assert_eq!(table, "epsg_coordoperationparamvalue");
            assert_eq!(column, 3);
            assert_eq!(key, "16030/8802");
        }
        other => panic!("expected a duplicated record, got {other:?}"),
    }
    assert!(f.operation(16030).is_err());
    assert!(f.decode("EPSG:32614").is_ok());
}

#[test]
fn duplicated_path_steps_fail_decode() {
    let f = factory();
    f.registry()
        .execute_batch("INSERT INTO epsg_coordoperationpath VALUES (8094, 1763, 1);")
        .unwrap();
    assert!(matches!(
        f.operation(8094),
        Err(CrsError::DuplicatedRecord { key, .. }) if key == "8094/1"
    ));
}

#[test]
fn unknown_and_malformed_codes() {
    let f = factory();
    assert!(matches!(f.decode("EPSG:999999"), Err(CrsError::NoSuchCode { .. })));
    assert!(matches!(f.decode("not a code"), Err(CrsError::InvalidCode(_))));
    assert!(matches!(f.decode("AUTO:49999,0,0"), Err(CrsError::InvalidCode(_))));
}

#[test]
fn every_dialect_decodes_alike() {
    init();
    let decoded: Vec<_> = [Dialect::Ansi, Dialect::Hsql, Dialect::Access]
        .into_iter()
        .map(|dialect| {
            let hints = Hints {
                dialect,
                ..Hints::default()
            };
            let f = CrsFactory::new(Registry::bundled(dialect).unwrap(), hints).unwrap();
            f.decode("EPSG:7405").unwrap()
        })
        .collect();
    assert_eq!(decoded[0], decoded[1]);
    assert_eq!(decoded[0], decoded[2]);
}

#[test]
fn registry_on_disk() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("epsg.sqlite");
    drop(Registry::create(&path, Dialect::Ansi).unwrap());
    let f = CrsFactory::open(&path, Hints::default()).unwrap();
    assert_eq!(f.decode("EPSG:27700").unwrap().name, "OSGB36 / British National Grid");
    assert!(f.authority_codes().unwrap().len() > 20);
}

#[test]
fn auto_codes_differ_in_one_parameter() {
    let f = factory();
    let a = f.decode("AUTO:42001,-100,45").unwrap();
    let b = f.decode("AUTO:42001,-94,45").unwrap();
    let (
        CrsKind::Projected {
            base: base_a,
            conversion: conv_a,
            cs: cs_a,
        },
        CrsKind::Projected {
            base: base_b,
            conversion: conv_b,
            cs: cs_b,
        },
    ) = (&a.kind, &b.kind)
    else {
        panic!("auto codes build projected systems");
    };
    assert_eq!(a.name, b.name);
    assert_eq!(base_a, base_b);
    assert_eq!(cs_a, cs_b);
    assert_eq!(conv_a.method, conv_b.method);
    let differing: Vec<_> = conv_a
        .parameters
        .iter()
        .zip(&conv_b.parameters)
        .filter(|(p, q)| p != q)
        .map(|(p, q)| (p.code, p.value, q.value))
        .collect();
    assert_eq!(differing, vec![(8802, -99.0, -93.0)]);
    // Procedural systems are not cached.
    assert!(!Arc::ptr_eq(&a, &f.decode("AUTO:42001,-100,45").unwrap()));
}

