//! Registry tables and the bundled seed data set.
//!
//! Tables deliberately carry no primary key constraints: duplicated codes
//! must be detected by the lookups rather than rejected at insert time.

use rusqlite::Connection;

use crate::dialect::Dialect;
use crate::error::Result;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS epsg_unitofmeasure (
    uom_code INTEGER NOT NULL,
    unit_of_meas_name TEXT NOT NULL,
    unit_of_meas_type TEXT NOT NULL,
    factor_b REAL,
    factor_c REAL
);
CREATE TABLE IF NOT EXISTS epsg_ellipsoid (
    ellipsoid_code INTEGER NOT NULL,
    ellipsoid_name TEXT NOT NULL,
    semi_major_axis REAL,
    inv_flattening REAL,
    semi_minor_axis REAL,
    uom_code INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_primemeridian (
    prime_meridian_code INTEGER NOT NULL,
    prime_meridian_name TEXT NOT NULL,
    greenwich_longitude REAL,
    uom_code INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_datum (
    datum_code INTEGER NOT NULL,
    datum_name TEXT NOT NULL,
    datum_type TEXT,
    origin_description TEXT,
    realization_epoch TEXT,
    ellipsoid_code INTEGER,
    prime_meridian_code INTEGER,
    vertical_datum_type TEXT
);
CREATE TABLE IF NOT EXISTS epsg_coordinatesystem (
    coord_sys_code INTEGER NOT NULL,
    coord_sys_name TEXT NOT NULL,
    coord_sys_type TEXT,
    dimension INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_coordinateaxis (
    coord_axis_code INTEGER NOT NULL,
    coord_sys_code INTEGER NOT NULL,
    coord_axis_name TEXT NOT NULL,
    coord_axis_orientation TEXT,
    coord_axis_abbreviation TEXT,
    uom_code INTEGER,
    coord_axis_order INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_coordinatereferencesystem (
    coord_ref_sys_code INTEGER NOT NULL,
    coord_ref_sys_name TEXT NOT NULL,
    coord_ref_sys_kind TEXT,
    coord_sys_code INTEGER,
    datum_code INTEGER,
    source_geogcrs_code INTEGER,
    projection_conv_code INTEGER,
    cmpd_horizcrs_code INTEGER,
    cmpd_vertcrs_code INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_coordoperation (
    coord_op_code INTEGER NOT NULL,
    coord_op_name TEXT NOT NULL,
    coord_op_type TEXT,
    source_crs_code INTEGER,
    target_crs_code INTEGER,
    coord_op_method_code INTEGER,
    coord_op_accuracy REAL
);
CREATE TABLE IF NOT EXISTS epsg_coordoperationmethod (
    coord_op_method_code INTEGER NOT NULL,
    coord_op_method_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS epsg_coordoperationparam (
    parameter_code INTEGER NOT NULL,
    parameter_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS epsg_coordoperationparamvalue (
    coord_op_code INTEGER NOT NULL,
    coord_op_method_code INTEGER,
    parameter_code INTEGER NOT NULL,
    parameter_value REAL,
    param_value_file_ref TEXT,
    uom_code INTEGER
);
CREATE TABLE IF NOT EXISTS epsg_coordoperationpath (
    concat_operation_code INTEGER NOT NULL,
    single_operation_code INTEGER NOT NULL,
    op_path_step INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS epsg_alias (
    alias_code INTEGER NOT NULL,
    object_table_name TEXT NOT NULL,
    object_code INTEGER NOT NULL,
    alias TEXT NOT NULL
);
";

const BUNDLED: &str = include_str!("../data/epsg_subset.sql");

/// Creates the registry tables, named as `dialect` expects them.
pub fn create(conn: &Connection, dialect: Dialect) -> Result<()> {
    conn.execute_batch(&dialect.adapt(DDL))?;
    Ok(())
}

/// Loads the bundled subset of EPSG definitions.
pub fn seed_bundled(conn: &Connection, dialect: Dialect) -> Result<()> {
    conn.execute_batch(&dialect.adapt(BUNDLED))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_access_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, Dialect::Access).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM [Coordinate Reference System]", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn bundled_data_loads() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, Dialect::Ansi).unwrap();
        seed_bundled(&conn, Dialect::Ansi).unwrap();
        let name: String = conn
            .query_row(
                "SELECT coord_ref_sys_name FROM epsg_coordinatereferencesystem WHERE coord_ref_sys_code = 4326",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(name, "WGS 84");
    }
}
