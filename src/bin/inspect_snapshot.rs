use anyhow::{Context, Result};
use obra_avance::{
    load_report, normalize_table, process::date_parser::parse_snapshot_date, Admission, ColumnSpec, Config,
    CoreError, WorkType,
};
use std::{env, fs, path::Path, process::exit};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <SNAPSHOT_FILE> [CONFIG_YAML]", args[0]);
        exit(1);
    }
    if let Err(e) = inspect(Path::new(&args[1]), args.get(2).map(Path::new)) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Print the header, row counts, and how each report would normalize.
fn inspect(path: &Path, config: Option<&Path>) -> Result<()> {
    let cfg = Config::load(config)?;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let table = load_report(&bytes)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    println!("=== Snapshot: {} ===", path.display());
    match parse_snapshot_date(&name) {
        Some(d) => println!("Date:        {}", d.format("%d-%m-%Y")),
        None => println!("Date:        <none, would be ignored by the catalog>"),
    }
    if !name.ends_with(&cfg.source.suffix) {
        println!("Suffix:      missing `{}`", cfg.source.suffix);
    }
    println!("Size:        {} bytes", bytes.len());
    println!("Data rows:   {}", table.rows.len());
    println!();

    println!("=== Columns ({}) ===", table.headers.len());
    for h in &table.headers {
        println!("- {}", h);
    }
    println!();

    println!("=== Normalization ===");
    for work in WorkType::ALL {
        let spec = ColumnSpec::new(&cfg.columns, &cfg.truthy, work);
        match normalize_table(&name, &table, &spec, Admission::Lenient) {
            Ok(records) => {
                let strict = records.iter().filter(|r| r.has_valid_quantity()).count();
                let done = records.iter().filter(|r| r.status_flag).count();
                let categorized = records.iter().filter(|r| r.status_category.is_some()).count();
                let tagged = records.iter().filter(|r| r.period_tag.is_some()).count();
                println!(
                    "{:<10} {:<12} records: {:>5} | valid qty: {:>5} | done: {:>5} | category: {:>5} | period: {:>5}",
                    work.to_string(),
                    spec.quantity,
                    records.len(),
                    strict,
                    done,
                    categorized,
                    tagged
                );
            }
            Err(CoreError::StructuralMismatch { missing, .. }) => {
                println!("{:<10} {:<12} missing columns: {}", work.to_string(), spec.quantity, missing.join(", "));
            }
            Err(e) => println!("{:<10} {}", work.to_string(), e),
        }
    }
    Ok(())
}
