use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn cli() -> Command {
    Command::cargo_bin("crs_registry_cli").unwrap()
}

#[test]
fn decode_command() {
    cli()
        .args(["decode", "EPSG:27700"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "EPSG:27700: OSGB36 / British National Grid (projected, 2D)",
        ));
}

#[test]
fn decode_json_command() {
    cli()
        .args(["decode", "urn:ogc:def:crs:EPSG::7405", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ODN height"));
}

#[test]
fn unknown_code_fails() {
    cli()
        .args(["decode", "EPSG:999999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no object found for code EPSG:999999"));
}

#[test]
fn transform_command() {
    cli()
        .args(["transform", "EPSG:4326", "CRS:84", "51.5", "-0.12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-0.120000,51.500000"));

    cli()
        .args(["transform", "EPSG:27700", "EPSG:4326", "530000", "180000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("51.503991,-0.128354"));
}

#[test]
fn transform_geojson_command() {
    cli()
        .args(["transform", "CRS:84", "AUTO:42001,-100,45", "-99", "45", "--geojson"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\":\"Point\""))
        .stdout(predicate::str::contains("\"crs\":\"AUTO:42001"));
}

#[test]
fn unsupported_transform_fails() {
    cli()
        .args(["transform", "EPSG:5701", "EPSG:4326", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no operation available from EPSG:5701 to EPSG:4326"));
}

#[test]
fn envelope_command() {
    cli()
        .args(["envelope", "EPSG:4326", "EPSG:3857", "-10", "-10", "10", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lower: -1113194.9079"))
        .stdout(predicate::str::contains("upper: 1113194.9079"));

    cli()
        .args([
            "envelope", "EPSG:4326", "EPSG:32614", "30", "-105", "50", "-93", "--densify", "4", "--geojson",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\":\"Polygon\""));

    cli()
        .args([
            "envelope", "EPSG:4326", "EPSG:3857", "-10", "-10", "10", "10", "--densify", "18446744073709551615",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot sample"));
}

#[test]
fn adapt_sql_command() {
    cli()
        .args(["adapt-sql", "hsql", "SELECT a.x FROM (a INNER JOIN b ON a.x=b.x) WHERE a.y=1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "SELECT a.x FROM a INNER JOIN b ON a.x=b.x WHERE a.y=1",
        ));

    cli()
        .args(["adapt-sql", "oracle", "SELECT 1"])
        .assert()
        .failure();
}

#[test]
fn init_registry_and_decode_from_it() {
    let dir = assert_fs::TempDir::new().unwrap();
    let db = dir.child("epsg.sqlite");
    cli()
        .args(["init-registry", db.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    db.assert(predicate::path::exists());

    cli()
        .args(["--registry", db.path().to_str().unwrap(), "decode", "4326"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EPSG:4326: WGS 84 (geographic, 2D)"));
    dir.close().unwrap();
}

#[test]
fn hints_file_is_applied() {
    let file = assert_fs::NamedTempFile::new("hints.json").unwrap();
    file.write_str(r#"{"name_factory": "scoped"}"#).unwrap();
    cli()
        .args(["--hints", file.path().to_str().unwrap(), "decode", "EPSG:4326"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EPSG:WGS 84"));
}

#[test]
fn grid_directory_is_used() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("OSTN15_NTv2_OSGBtoETRS.json")
        .write_str(
            r#"{"name": "OSTN15_NTv2_OSGBtoETRS", "west": -8.0, "south": 49.0,
                "lon_step": 1.0, "lat_step": 1.0, "cols": 2, "rows": 2,
                "shifts": [[-4.5, 2.0], [-4.5, 2.0], [-4.5, 2.0], [-4.5, 2.0]]}"#,
        )
        .unwrap();
    let grid_dir = dir.path().to_str().unwrap();
    // The grid ends at 7 degrees west; London is outside it.
    cli()
        .args(["--grid-dir", grid_dir, "transform", "EPSG:27700", "EPSG:4326", "530000", "180000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the domain of grid OSTN15_NTv2_OSGBtoETRS"));
    cli()
        .args([
            "--grid-dir", grid_dir, "--grid-fallback", "transform", "EPSG:27700", "EPSG:4326", "530000", "180000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("51.503991,-0.128354"));
    dir.close().unwrap();
}
