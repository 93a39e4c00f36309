use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use record_store_core::{ConverterRegistry, SchemaConfig};
use record_store_sqlite::{
    MigrationCodec, OpenOutcome, SchemaManager, TableReport, export_to_writer,
    import_from_reader, set_user_version,
};
use rusqlite::Connection;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "record-store")]
#[command(about = "Versioned SQLite record store: create, upgrade, and back up tables")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Path to the YAML schema configuration.
    #[arg(long)]
    config: PathBuf,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create every table on an empty database and stamp the declared version.
    Create,
    /// Drop every table and reset the stored version.
    Drop,
    /// Create or upgrade the database to the declared version.
    Open,
    /// Show stored version and per-table row counts.
    Status(StatusArgs),
    /// Export every table to the backup directory.
    Backup(VersionArgs),
    /// Append rows from backup files into their tables.
    Restore(VersionArgs),
    /// Export one table in the interchange format.
    Export(ExportArgs),
    /// Import one table from an interchange file.
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Print status as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct VersionArgs {
    /// Version used in backup file names (default: stored version, or the
    /// declared version on an empty database).
    #[arg(long)]
    version: Option<u32>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Table to export.
    #[arg(long)]
    table: String,
    /// Output file (default: stdout).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Table to import into.
    #[arg(long)]
    table: String,
    /// Interchange file to read.
    #[arg(long)]
    input: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = match cli.command {
        Command::Create => run_create(&cli.global),
        Command::Drop => run_drop(&cli.global),
        Command::Open => run_open(&cli.global),
        Command::Status(args) => run_status(&cli.global, args),
        Command::Backup(args) => run_backup(&cli.global, args),
        Command::Restore(args) => run_restore(&cli.global, args),
        Command::Export(args) => run_export(&cli.global, args),
        Command::Import(args) => run_import(&cli.global, args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run_create(global: &GlobalArgs) -> Result<(), String> {
    let mut manager = open_manager(global)?;
    let stored = manager
        .stored_version()
        .map_err(|e| format!("Failed to read stored version: {e}"))?;
    if stored != 0 {
        return Err(format!(
            "Database '{}' is already at version {stored}; use 'open' to upgrade",
            global.db.display()
        ));
    }
    manager
        .on_create()
        .map_err(|e| format!("Create failed: {e}"))?;
    let version = manager.schema().version();
    set_user_version(manager.connection(), version)
        .map_err(|e| format!("Failed to stamp version: {e}"))?;
    println!(
        "Created {} tables in '{}' at version {version}.",
        manager.schema().tables().len(),
        global.db.display()
    );
    Ok(())
}

fn run_drop(global: &GlobalArgs) -> Result<(), String> {
    let mut manager = open_manager(global)?;
    manager.on_drop().map_err(|e| format!("Drop failed: {e}"))?;
    println!(
        "Dropped {} tables from '{}'.",
        manager.schema().tables().len(),
        global.db.display()
    );
    Ok(())
}

fn run_open(global: &GlobalArgs) -> Result<(), String> {
    let mut manager = open_manager(global)?;
    let outcome = manager.open().map_err(|e| format!("Open failed: {e}"))?;
    let version = manager.schema().version();
    match outcome {
        OpenOutcome::Created => println!("Created database at version {version}."),
        OpenOutcome::Current => println!("Database is current at version {version}."),
        OpenOutcome::Upgraded(report) => {
            println!(
                "Upgrade from version {} to {} ({:?}):",
                report.from, report.to, report.strategy
            );
            print_reports(&report.tables);
            let failed = report.failures().count();
            if failed > 0 {
                return Err(format!(
                    "{failed} table(s) failed to upgrade; stored version left at {}",
                    report.from
                ));
            }
        }
    }
    Ok(())
}

fn run_status(global: &GlobalArgs, args: StatusArgs) -> Result<(), String> {
    let manager = open_manager(global)?;
    let status = manager
        .status()
        .map_err(|e| format!("Failed to get status: {e}"))?;
    if args.json {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{json}");
        return Ok(());
    }
    println!("Database: {}", status.database);
    println!("  Declared version: {}", status.declared_version);
    println!("  Stored version: {}", status.stored_version);
    for table in &status.tables {
        if table.exists {
            println!("  {}: {} rows", table.name, table.row_count);
        } else {
            println!("  {}: missing", table.name);
        }
    }
    Ok(())
}

fn run_backup(global: &GlobalArgs, args: VersionArgs) -> Result<(), String> {
    let manager = open_manager(global)?;
    let version = resolve_version(&manager, args.version)?;
    let reports = manager.backup_all_tables(version);
    println!(
        "Backup of version {version} to '{}':",
        manager.codec().dir().display()
    );
    print_reports(&reports);
    check_reports(&reports, "back up")
}

fn run_restore(global: &GlobalArgs, args: VersionArgs) -> Result<(), String> {
    let manager = open_manager(global)?;
    let version = resolve_version(&manager, args.version)?;
    let reports = manager.restore_all_tables(version);
    println!(
        "Restore of version {version} from '{}':",
        manager.codec().dir().display()
    );
    print_reports(&reports);
    check_reports(&reports, "restore")
}

fn run_export(global: &GlobalArgs, args: ExportArgs) -> Result<(), String> {
    let manager = open_manager(global)?;
    let table = manager
        .table(&args.table)
        .ok_or_else(|| format!("Unknown table '{}'", args.table))?;
    let written = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("Failed to create '{}': {e}", path.display()))?;
            export_to_writer(manager.connection(), table, BufWriter::new(file))
        }
        None => export_to_writer(manager.connection(), table, io::stdout().lock()),
    }
    .map_err(|e| format!("Export of '{}' failed: {e}", args.table))?;
    if let Some(path) = &args.output {
        println!(
            "Exported {written} rows from '{}' to '{}'.",
            args.table,
            path.display()
        );
    }
    Ok(())
}

fn run_import(global: &GlobalArgs, args: ImportArgs) -> Result<(), String> {
    let manager = open_manager(global)?;
    let table = manager
        .table(&args.table)
        .ok_or_else(|| format!("Unknown table '{}'", args.table))?;
    let file = File::open(&args.input)
        .map_err(|e| format!("Failed to open '{}': {e}", args.input.display()))?;
    let read = import_from_reader(manager.connection(), table, BufReader::new(file))
        .map_err(|e| format!("Import into '{}' failed: {e}", args.table))?;
    println!(
        "Imported {read} rows into '{}' from '{}'.",
        args.table,
        args.input.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads the configuration, opens the database and builds a manager.
fn open_manager(global: &GlobalArgs) -> Result<SchemaManager, String> {
    let config = SchemaConfig::load(&global.config)
        .map_err(|e| format!("Failed to load config '{}': {e}", global.config.display()))?;
    let registry = ConverterRegistry::with_builtins();
    let schema = config
        .build(&registry)
        .map_err(|e| format!("Invalid schema in '{}': {e}", global.config.display()))?;
    let conn = Connection::open(&global.db)
        .map_err(|e| format!("Failed to open database '{}': {e}", global.db.display()))?;

    let backup_dir = resolve_backup_dir(&global.config, &config.backup_dir);
    debug!(
        db = %global.db.display(),
        backup_dir = %backup_dir.display(),
        "opened database"
    );
    let codec = MigrationCodec::new(backup_dir, &config.database).with_suffix(&config.suffix);
    let manager = SchemaManager::new(conn, schema, codec)
        .map_err(|e| format!("Failed to initialize schema manager: {e}"))?;
    Ok(manager.with_strategy(config.strategy))
}

/// Relative backup directories are taken from the config file's directory.
fn resolve_backup_dir(config_path: &Path, backup_dir: &Path) -> PathBuf {
    if backup_dir.is_absolute() {
        return backup_dir.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) => parent.join(backup_dir),
        None => backup_dir.to_path_buf(),
    }
}

fn resolve_version(manager: &SchemaManager, requested: Option<u32>) -> Result<u32, String> {
    if let Some(version) = requested {
        return Ok(version);
    }
    let stored = manager
        .stored_version()
        .map_err(|e| format!("Failed to read stored version: {e}"))?;
    Ok(if stored == 0 {
        manager.schema().version()
    } else {
        stored
    })
}

fn print_reports(reports: &[TableReport]) {
    let mut out = io::stdout().lock();
    for report in reports {
        let _ = match (&report.error, report.exported, report.imported) {
            (Some(err), _, _) => writeln!(out, "  {}: FAILED: {err}", report.table),
            (None, Some(e), Some(i)) => {
                writeln!(out, "  {}: exported {e}, imported {i}", report.table)
            }
            (None, Some(e), None) => writeln!(out, "  {}: exported {e}", report.table),
            (None, None, Some(i)) => writeln!(out, "  {}: imported {i}", report.table),
            (None, None, None) => writeln!(out, "  {}: ok", report.table),
        };
    }
}

fn check_reports(reports: &[TableReport], action: &str) -> Result<(), String> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.table.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("Failed to {action} tables: {}", failed.join(", ")))
    }
}
