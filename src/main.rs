use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use obra_avance::{
    present, AnySource, CachedSource, Config, LoadReport, Pipeline, PresentedTable, RecordFilter, Table,
    TwoPeriodComparison, ViewOutcome, WorkType,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "obra-avance", about = "Progress tables from dated *_AO_GENERAL.txt exports")]
struct Cli {
    /// YAML config file; AVANCE_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Work {
    Concrete,
    Formwork,
    Rebar,
}

impl From<Work> for WorkType {
    fn from(w: Work) -> Self {
        match w {
            Work::Concrete => WorkType::Concrete,
            Work::Formwork => WorkType::Formwork,
            Work::Rebar => WorkType::Rebar,
        }
    }
}

#[derive(Args)]
struct Filters {
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    element: Option<String>,
}

impl Filters {
    fn to_filter(&self) -> RecordFilter {
        RecordFilter {
            level: self.level.clone(),
            element: self.element.clone(),
            ..RecordFilter::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Quantity per status category for the latest (or named) snapshot.
    Status {
        #[arg(long, value_enum, default_value_t = Work::Concrete)]
        work: Work,
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Completed vs pending quantity for the latest (or named) snapshot.
    Split {
        #[arg(long, value_enum, default_value_t = Work::Concrete)]
        work: Work,
        #[arg(long)]
        snapshot: Option<String>,
        #[command(flatten)]
        filters: Filters,
    },
    /// Completed concrete per snapshot date with week-over-week differences.
    Series {
        /// Only the most recent N snapshots.
        #[arg(long)]
        last: Option<usize>,
        #[command(flatten)]
        filters: Filters,
    },
    /// Compare the two most recent snapshots.
    Compare {
        /// Sub-period to restrict to; defaults to the configured tag.
        #[arg(long, conflicts_with = "all_periods")]
        period: Option<String>,
        /// Do not restrict to a sub-period.
        #[arg(long)]
        all_periods: bool,
    },
    /// List dated snapshots in the collection.
    Catalog,
}

fn init_logging(default_level: &str) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &LoadReport) {
    for skipped in &report.skipped {
        warn!("{}", skipped);
    }
    eprintln!("{}", report.summary());
}

fn print_table(format: OutputFormat, table: &PresentedTable) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", table.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(table)?),
    }
    Ok(())
}

/// Print a view. An insufficient-data outcome is a warning, not a failure.
fn emit<T>(view: ViewOutcome<T>, show: impl FnOnce(T) -> Result<()>) -> Result<()> {
    print_report(&view.report);
    match view.outcome {
        Ok(value) => show(value),
        Err(e) if e.is_empty_result() => {
            warn!("{}", e);
            eprintln!("no data to show: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn table_printer(format: OutputFormat, title: String) -> impl FnOnce(Table) -> Result<()> {
    move |table| print_table(format, &present(title, &table))
}

#[derive(Serialize)]
struct ComparisonOutput<'a> {
    earlier: &'a str,
    later: &'a str,
    gains: f64,
    losses: f64,
    table: &'a PresentedTable,
}

fn print_comparison(format: OutputFormat, cmp: TwoPeriodComparison) -> Result<()> {
    let title = format!("Comparación Trisemanal ({} → {})", cmp.earlier.name, cmp.later.name);
    let table = present(title, &cmp.table);
    let gains = present::round2(cmp.gains);
    let losses = present::round2(cmp.losses);
    match format {
        OutputFormat::Text => {
            print!("{}", table.render_text());
            println!("gains: {:.2}  losses: {:.2}", gains, losses);
        }
        OutputFormat::Json => {
            let out = ComparisonOutput {
                earlier: &cmp.earlier.name,
                later: &cmp.later.name,
                gains,
                losses,
                table: &table,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;
    init_logging(&cfg.log_level);
    info!(source = ?cfg.source.kind, root = %cfg.source.root, collection = %cfg.source.collection, "startup");

    let source = CachedSource::new(
        AnySource::from_config(&cfg.source).context("configuring snapshot source")?,
        cfg.source.cache_ttl(),
    );
    let pipeline = Pipeline::new(source, &cfg);
    let format = cli.format;

    let result = match cli.command {
        Command::Status { work, snapshot } => {
            let work = WorkType::from(work);
            let view = pipeline.current_status(work, snapshot.as_deref()).await;
            emit(view, table_printer(format, work.title().to_string()))
        }
        Command::Split {
            work,
            snapshot,
            filters,
        } => {
            let work = WorkType::from(work);
            let view = pipeline
                .current_split(work, snapshot.as_deref(), &filters.to_filter())
                .await;
            emit(view, table_printer(format, format!("{} (Si/No)", work.title())))
        }
        Command::Series { last, filters } => {
            let last = last.or(cfg.compare.series_last);
            let view = pipeline.weekly_series(last, &filters.to_filter()).await;
            emit(view, table_printer(format, "Avance Semanal Hormigones".to_string()))
        }
        Command::Compare {
            period,
            all_periods,
        } => {
            let period = if all_periods {
                None
            } else {
                period.or_else(|| cfg.compare.period_tag.clone())
            };
            let view = pipeline.latest_comparison(period.as_deref()).await;
            emit(view, |cmp| print_comparison(format, cmp))
        }
        Command::Catalog => {
            let catalog = pipeline.catalog().await?;
            match format {
                OutputFormat::Text => {
                    for s in catalog.snapshots() {
                        println!("{}  {}", s.date.format("%d-%m-%Y"), s.name);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(catalog.snapshots())?);
                }
            }
            let stats = catalog.stats();
            eprintln!(
                "{} listed, {} candidates, {} dated, {} undated",
                stats.listed,
                stats.candidates,
                catalog.len(),
                stats.undated
            );
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
