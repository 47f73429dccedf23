//! CLI boot probe.
//!
//! # Responsibility
//! - Boot a declaration tree and open its database to verify wiring.
//! - Print a deterministic schema summary.
//!
//! Usage: `eav_cli <config.json> [database.sqlite3]`. Without a database
//! path an in-memory database is used. Set `EAV_LOG_DIR` to an absolute
//! directory to write the core log there.

use eav_core::{
    core_version, default_log_level, ensure_value_tables, init_logging, open_db,
    open_db_in_memory, Schema, SqliteDataRepository,
};
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(config_path) = args.first() else {
        eprintln!("usage: eav_cli <config.json> [database.sqlite3]");
        return ExitCode::from(2);
    };
    if let Ok(log_dir) = std::env::var("EAV_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }
    match run(config_path, args.get(1).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str, db_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::from_json_file(config_path)?;
    let conn = match db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    ensure_value_tables(&conn, schema.storage())?;
    SqliteDataRepository::try_new(&conn, &schema)?;
    info!(
        "event=cli_probe module=cli status=ok config={config_path} database={}",
        db_path.unwrap_or(":memory:")
    );

    println!("eav_core version={}", core_version());
    println!(
        "schema types={} attributes={} families={}",
        schema.types().len(),
        schema.attributes().len(),
        schema.families().len()
    );
    for family in schema.families().families() {
        println!(
            "family code={} parent={} value_class={} attributes={} instantiable={}",
            family.code(),
            family.parent_code().unwrap_or("-"),
            family.value_class().name(),
            family.attributes().len(),
            family.is_instantiable()
        );
    }
    Ok(())
}
