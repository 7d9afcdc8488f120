use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crs_registry::model::CrsKind;
use crs_registry::{Crs, CrsError, CrsFactory, Dialect, DirectPosition, Envelope, Hints, Registry, ShiftMethod};
use geojson::{Feature, GeoJson, Geometry, JsonObject, Value};

/// Look up reference systems and transform coordinates between them.
#[derive(Parser)]
#[command(name = "crs_registry_cli", version)]
struct Cli {
    /// Registry database; the bundled definitions are used when absent
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    /// JSON file holding factory hints
    #[arg(long, global = true)]
    hints: Option<PathBuf>,
    /// SQL dialect of the registry (ansi, hsql or access)
    #[arg(long, global = true)]
    dialect: Option<Dialect>,
    /// Preferred datum shift method (grid, geocentric or molodensky)
    #[arg(long, global = true)]
    datum_shift: Option<ShiftMethod>,
    /// Directory of JSON datum shift grids
    #[arg(long, global = true)]
    grid_dir: Option<PathBuf>,
    /// Use the parametric shift where a grid does not cover a position
    #[arg(long, global = true)]
    grid_fallback: bool,
    /// Allow ellipsoid-only datum shifts
    #[arg(long, global = true)]
    lenient: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe the reference system behind a code.
    Decode {
        code: String,
        /// Print the full definition as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the reference system codes of the registry.
    Codes,
    /// Transform one position; ordinates follow the source axis order.
    Transform {
        source: String,
        target: String,
        #[arg(required = true, allow_negative_numbers = true)]
        ordinates: Vec<f64>,
        /// Print a GeoJSON feature instead of plain ordinates
        #[arg(long)]
        geojson: bool,
        #[arg(long, default_value_t = 6)]
        precision: usize,
        /// Also print the PROJ result for the same codes
        #[cfg(feature = "proj")]
        #[arg(long)]
        check: bool,
    },
    /// Transform a two-dimensional bounding box.
    Envelope {
        source: String,
        target: String,
        #[arg(allow_negative_numbers = true)]
        min_x: f64,
        #[arg(allow_negative_numbers = true)]
        min_y: f64,
        #[arg(allow_negative_numbers = true)]
        max_x: f64,
        #[arg(allow_negative_numbers = true)]
        max_y: f64,
        /// Sample each axis in this many intervals instead of using corners only
        #[arg(long)]
        densify: Option<usize>,
        #[arg(long)]
        geojson: bool,
        #[arg(long, default_value_t = 6)]
        precision: usize,
    },
    /// Print a registry query as the given dialect expects it.
    AdaptSql {
        #[arg(value_name = "DIALECT")]
        backend: Dialect,
        sql: String,
    },
    /// Write a registry database holding the bundled definitions.
    InitRegistry { path: PathBuf },
}

fn hints(cli: &Cli) -> Result<Hints, CrsError> {
    let mut hints = match &cli.hints {
        Some(path) => Hints::load(path)?,
        None => Hints::default(),
    };
    if let Some(dialect) = cli.dialect {
        hints.dialect = dialect;
    }
    if cli.datum_shift.is_some() {
        hints.datum_shift_method = cli.datum_shift;
    }
    if let Some(dir) = &cli.grid_dir {
        hints.grid_directory = Some(dir.clone());
    }
    hints.grid_fallback |= cli.grid_fallback;
    hints.lenient_datum_shift |= cli.lenient;
    Ok(hints)
}

fn factory(cli: &Cli) -> Result<CrsFactory, CrsError> {
    let hints = hints(cli)?;
    match &cli.registry {
        Some(path) => CrsFactory::open(path, hints),
        None => CrsFactory::bundled(hints),
    }
}

fn kind(crs: &Crs) -> &'static str {
    match crs.kind {
        CrsKind::Geographic { .. } => "geographic",
        CrsKind::Projected { .. } => "projected",
        CrsKind::Vertical { .. } => "vertical",
        CrsKind::Compound { .. } => "compound",
    }
}

fn format_ordinates(ordinates: &[f64], precision: usize) -> String {
    ordinates
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn feature(geometry: Value, crs: &Crs) -> String {
    let mut properties = JsonObject::new();
    properties.insert("crs".into(), serde_json::Value::String(crs.code.to_string()));
    GeoJson::Feature(Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
    .to_string()
}

fn decode(cli: &Cli, code: &str, json: bool) -> Result<(), CrsError> {
    let crs = factory(cli)?.decode(code)?;
    if json {
        println!("{}", serde_json::to_string_pretty(crs.as_ref())?);
    } else {
        println!("{}: {} ({}, {}D)", crs.code, crs.name, kind(&crs), crs.dimension());
    }
    Ok(())
}

fn codes(cli: &Cli) -> Result<(), CrsError> {
    for code in factory(cli)?.authority_codes()? {
        println!("{code}");
    }
    Ok(())
}

#[cfg_attr(not(feature = "proj"), allow(unused_variables))]
fn transform(
    cli: &Cli,
    source: &str,
    target: &str,
    ordinates: &[f64],
    geojson: bool,
    precision: usize,
    check: bool,
) -> Result<(), CrsError> {
    let f = factory(cli)?;
    let (source, target) = (f.decode(source)?, f.decode(target)?);
    let transform = f.resolver().find_transform(&source, &target)?;
    log::debug!("{} steps", transform.steps().len());
    let out = transform.transform_position(&DirectPosition::new(source.clone(), ordinates.to_vec()))?;
    if geojson {
        println!("{}", feature(Value::Point(out.ordinates.clone()), &target));
    } else {
        println!("{}", format_ordinates(&out.ordinates, precision));
    }
    #[cfg(feature = "proj")]
    if check {
        check_with_proj(&source, &target, ordinates, precision);
    }
    Ok(())
}

#[cfg(feature = "proj")]
fn check_with_proj(source: &Crs, target: &Crs, ordinates: &[f64], precision: usize) {
    let [x, y, ..] = ordinates else {
        eprintln!("PROJ check needs two ordinates");
        return;
    };
    match crs_registry::reference::reference_point(source, target, *x, *y) {
        Some((x, y)) => println!("proj: {}", format_ordinates(&[x, y], precision)),
        None => eprintln!("PROJ cannot transform {} to {}", source.code, target.code),
    }
}

fn envelope(
    cli: &Cli,
    source: &str,
    target: &str,
    bounds: [f64; 4],
    densify: Option<usize>,
    geojson: bool,
    precision: usize,
) -> Result<(), CrsError> {
    let f = factory(cli)?;
    let (source, target) = (f.decode(source)?, f.decode(target)?);
    let transform = f.resolver().find_transform(&source, &target)?;
    let [min_x, min_y, max_x, max_y] = bounds;
    let envelope = Envelope::new(Arc::clone(&source), vec![min_x, min_y], vec![max_x, max_y])?;
    let out = match densify {
        Some(steps) => transform.transform_envelope_densified(&envelope, steps)?,
        None => transform.transform_envelope(&envelope)?,
    };
    if geojson {
        let Some(rect) = out.to_rect() else {
            return Err(CrsError::MismatchedDimension {
                expected: 2,
                found: out.dimension(),
            });
        };
        let ring = rect
            .to_polygon()
            .exterior()
            .coords()
            .map(|c| vec![c.x, c.y])
            .collect();
        println!("{}", feature(Value::Polygon(vec![ring]), &target));
    } else {
        println!("lower: {}", format_ordinates(&out.lower, precision));
        println!("upper: {}", format_ordinates(&out.upper, precision));
    }
    Ok(())
}

fn init_registry(cli: &Cli, path: &PathBuf) -> Result<(), CrsError> {
    let dialect = cli.dialect.unwrap_or_default();
    let registry = Registry::create(path, dialect)?;
    let count = registry.crs_codes()?.len();
    println!("Wrote {count} reference systems to {} ({dialect})", path.display());
    Ok(())
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Commands::Decode { code, json } => decode(cli, code, *json)?,
        Commands::Codes => codes(cli)?,
        #[cfg(feature = "proj")]
        Commands::Transform {
            source,
            target,
            ordinates,
            geojson,
            precision,
            check,
        } => transform(cli, source, target, ordinates, *geojson, *precision, *check)?,
        #[cfg(not(feature = "proj"))]
        Commands::Transform {
            source,
            target,
            ordinates,
            geojson,
            precision,
        } => transform(cli, source, target, ordinates, *geojson, *precision, false)?,
        Commands::Envelope {
            source,
            target,
            min_x,
            min_y,
            max_x,
            max_y,
            densify,
            geojson,
            precision,
        } => envelope(
            cli,
            source,
            target,
            [*min_x, *min_y, *max_x, *max_y],
            *densify,
            *geojson,
            *precision,
        )?,
        Commands::AdaptSql { backend, sql } => println!("{}", backend.try_adapt(sql)?),
        Commands::InitRegistry { path } => init_registry(cli, path)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
