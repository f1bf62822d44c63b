use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};

use bankrot_etl::{
    build_report, insert_messages, parse_messages, print_report, setup_database, verify_count,
    write_region_csv, AddressResolver, MarkerExtractor,
};

const DEFAULT_DB: &str = "messages.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let xml_path = args
                .get(2)
                .context("usage: bankrot-etl import <export.xml[.gz]> [db]")?;
            let db_path = args.get(3).map(String::as_str).unwrap_or(DEFAULT_DB);
            run_import(Path::new(xml_path), Path::new(db_path))
        }
        Some("report") => {
            let db_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_DB);
            let csv_path = csv_arg(&args);
            run_report(Path::new(db_path), csv_path.as_deref())
        }
        Some("resolve") => {
            let address = args.get(2).context("usage: bankrot-etl resolve <address>")?;
            run_resolve(address)
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn csv_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--csv")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn print_usage() {
    println!("bankrot-etl {}", bankrot_etl::VERSION);
    println!();
    println!("Usage:");
    println!("  bankrot-etl import <export.xml[.gz]> [db]");
    println!("  bankrot-etl report [db] [--csv <path>]");
    println!("  bankrot-etl resolve <address>");
}

fn run_import(xml_path: &Path, db_path: &Path) -> Result<()> {
    println!("📂 Parsing {}...", xml_path.display());
    let resolver = AddressResolver::new(MarkerExtractor::new());
    let messages = parse_messages(xml_path, &resolver)?;
    println!("✓ Parsed {} messages", messages.len());

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;

    let stats = insert_messages(&conn, &messages)?;
    println!("✓ Inserted: {} messages", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);

    let count = verify_count(&conn)?;
    println!("✓ Database contains {} messages", count);

    Ok(())
}

fn run_report(db_path: &Path, csv_path: Option<&Path>) -> Result<()> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {} (run `bankrot-etl import` first)",
            db_path.display()
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let report = build_report(&conn)?;
    print_report(&report);

    if let Some(path) = csv_path {
        write_region_csv(&report, path)?;
        println!();
        println!("✓ Region report written to {}", path.display());
    }

    Ok(())
}

fn run_resolve(address: &str) -> Result<()> {
    let resolver = AddressResolver::new(MarkerExtractor::new());
    let record = resolver.resolve(Some(address))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
