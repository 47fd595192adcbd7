//! Importaciones CLI - unify customs import exports into one report
//!
//! ```bash
//! importaciones unify                        # scan $IMPORTACIONES_DATA_DIR
//! importaciones unify a.xlsx b.csv -o out.xlsx
//! importaciones normalize detalle_CL_2024.xlsx
//! importaciones resolve detalle_pe_enero.csv
//! importaciones countries
//! importaciones rules > reglas.json
//! importaciones serve --port 3000
//! ```

use clap::{Parser, Subcommand};
use importaciones::api::logs::LOG_BROADCASTER;
use importaciones::{
    read_file, scan_folder, unify_files, write_report, Normalizer, PipelineError, RuleBook,
    Settings, UnifyOptions, DEFAULT_FILENAME_PREFIX, DEFAULT_REPORT_NAME,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "importaciones")]
#[command(about = "Unify per-country customs import files into one canonical report", long_about = None)]
struct Cli {
    /// Rule book JSON (overrides IMPORTACIONES_RULES)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Suppress progress logs
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unify input files into one report
    Unify {
        /// Input files (default: scan --dir)
        files: Vec<PathBuf>,

        /// Folder to scan for detalle_* files (overrides IMPORTACIONES_DATA_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output report, .xlsx or .csv
        #[arg(short, long, default_value = DEFAULT_REPORT_NAME)]
        output: PathBuf,
    },

    /// Normalize a single file and print its rows as JSON
    Normalize {
        /// Input file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the country a filename resolves to
    Resolve {
        filename: String,
    },

    /// List supported countries
    Countries,

    /// Print the effective rule book as JSON
    Rules,

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides IMPORTACIONES_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    if let Err(e) = run(cli).await {
        eprintln!("✗ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if let Some(path) = cli.rules {
        settings.rules_path = Some(path);
    }
    let rules = settings.load_rules()?;

    match cli.command {
        Commands::Unify { files, dir, output } => {
            let dir = dir.unwrap_or_else(|| settings.data_dir.clone());
            cmd_unify(files, &dir, &output, &rules)
        }
        Commands::Normalize { input, output } => cmd_normalize(&input, output.as_deref(), &rules),
        Commands::Resolve { filename } => cmd_resolve(&filename, &rules),
        Commands::Countries => cmd_countries(&rules),
        Commands::Rules => cmd_rules(&rules),
        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.port);
            importaciones::server::start_server(port, rules).await?;
            Ok(())
        }
    }
}

fn cmd_unify(
    files: Vec<PathBuf>,
    dir: &Path,
    output: &Path,
    rules: &RuleBook,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = if files.is_empty() {
        eprintln!("📂 Scanning {}", dir.display());
        scan_folder(dir, &UnifyOptions::default())?
    } else {
        files
    };
    eprintln!("   {} input files", files.len());

    let report = match unify_files(&files, rules) {
        Ok(report) => report,
        Err(PipelineError::EmptyBatchResult { skipped }) => {
            for file in &skipped {
                eprintln!("   ✗ {}: {}", file.filename, file.reason);
            }
            return Err(format!("no files processed ({} skipped)", skipped.len()).into());
        }
        Err(e) => return Err(e.into()),
    };

    write_report(&report, output)?;

    eprintln!("\n📊 SUMMARY");
    for file in &report.files {
        eprintln!("   ✓ {:<32} {:<10} {:>6} rows", file.filename, file.country.name, file.rows);
    }
    for file in &report.skipped {
        eprintln!("   ✗ {:<32} {}", file.filename, file.reason);
    }
    eprintln!("   Total rows:      {}", report.len());
    eprintln!("   Applicable (SI): {}", report.applicable_rows());
    eprintln!("💾 Report written to: {}", output.display());

    Ok(())
}

fn cmd_normalize(
    input: &Path,
    output: Option<&Path>,
    rules: &RuleBook,
) -> Result<(), Box<dyn std::error::Error>> {
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let country = rules
        .countries
        .resolve_filename(&filename, DEFAULT_FILENAME_PREFIX)?
        .clone();
    eprintln!("📄 {} → {}", filename, country);

    let table = read_file(input)?;
    eprintln!("   {} rows, {} columns", table.len(), table.headers.len());

    let normalized = Normalizer::new(rules).normalize(table, &country)?;
    let rows: Vec<Value> = normalized
        .rows
        .iter()
        .map(|r| Value::Object(r.to_object()))
        .collect();

    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)
}

fn cmd_resolve(filename: &str, rules: &RuleBook) -> Result<(), Box<dyn std::error::Error>> {
    let country = rules.countries.resolve_filename(filename, DEFAULT_FILENAME_PREFIX)?;
    println!("{}\t{}", country.code, country.name);
    Ok(())
}

fn cmd_countries(rules: &RuleBook) -> Result<(), Box<dyn std::error::Error>> {
    for country in rules.countries.iter() {
        let mapped = rules
            .cost_mappings
            .for_country(&country.name)
            .map(|m| m.len())
            .unwrap_or(0);
        println!("{}\t{:<10}\t{} cost columns", country.code, country.name, mapped);
    }
    Ok(())
}

fn cmd_rules(rules: &RuleBook) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", rules.to_json()?);
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
