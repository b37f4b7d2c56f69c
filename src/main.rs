use anyhow::{bail, Context, Result};
use bank_compare::entities::comparison::purge_expired_sessions;
use bank_compare::{
    import_catalog, init_tracing, load_catalog, now, open_database, seed_bank_types, table_counts,
    verify_schema, Config, SCHEMA_VERSION,
};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::info;

/// Bank and service comparison database
#[derive(Parser, Debug)]
#[command(name = "bank-compare", version)]
struct Cli {
    /// Database file (overrides BANK_COMPARE_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the schema (safe to repeat)
    Init,
    /// Insert or refresh the standard bank types
    SeedTypes,
    /// Import banks and services from a catalogue CSV
    Import {
        csv: PathBuf,
    },
    /// Row counts per table
    Stats,
    /// Delete comparison sessions that have expired
    PurgeExpired,
    /// Compare the on-disk schema with the expected one
    CheckSchema,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().with_database(cli.database);
    init_tracing(&config);

    let mut conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    match cli.command {
        Commands::Init => {
            info!(version = SCHEMA_VERSION, "schema initialised");
            println!("✓ Database ready at {}", config.database_path.display());
        }
        Commands::SeedTypes => {
            let count = seed_bank_types(&conn).context("Failed to seed bank types")?;
            println!("✓ {} bank types in place", count);
        }
        Commands::Import { csv } => run_import(&mut conn, csv)?,
        Commands::Stats => run_stats(&conn)?,
        Commands::PurgeExpired => {
            let purged = purge_expired_sessions(&conn, now()).context("Failed to purge sessions")?;
            println!("✓ Purged {} expired comparison sessions", purged);
        }
        Commands::CheckSchema => {
            let check = verify_schema(&conn).context("Failed to read schema")?;
            println!("fingerprint: {}", check.fingerprint);
            println!("expected:    {}", check.expected);
            println!("version:     {} (expected {})", check.user_version, SCHEMA_VERSION);
            if !check.is_current() {
                for table in &check.missing_tables {
                    println!("missing table: {}", table);
                }
                for index in &check.missing_indexes {
                    println!("missing index: {}", index);
                }
                bail!("schema does not match");
            }
            println!("✓ Schema is current");
        }
    }

    Ok(())
}

fn run_import(conn: &mut Connection, csv: PathBuf) -> Result<()> {
    let rows = load_catalog(&csv).with_context(|| format!("Failed to read catalogue {}", csv.display()))?;
    let summary = import_catalog(conn, &rows).context("Catalogue import failed")?;

    println!("✓ {} rows read", summary.rows);
    println!("  banks created:    {}", summary.banks_created);
    println!("  services created: {}", summary.services_created);
    println!("  services skipped: {}", summary.services_skipped);
    Ok(())
}

fn run_stats(conn: &Connection) -> Result<()> {
    for count in table_counts(conn).context("Failed to count rows")? {
        println!("{:<26} {:>8}", count.table, count.rows);
    }
    Ok(())
}
