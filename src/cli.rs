use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gurney::analysis::{AnalyzerKind, ProgressAggregator, RunContext};
use gurney::charts::PlottersRenderer;
use gurney::config::{self, AppSettings};
use gurney::dataset::LoadOptions;
use gurney::pipeline::{self, acquire_source, build_archive, deliver_archive, deliver_report, run_analysis};
use gurney::report::{self, GenpdfComposer, ReportRequest};
use gurney::schema::DIALECTS;
use gurney::store::{RecordKind, RecordStore, RecordSummary};
use gurney::utils::{CancelFlag, fmt_bytes};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gurney",
    version,
    about = "Hospital discharge analytics: analyze datasets, keep the archives, compose reports"
)]
pub struct Cli {
    /// SQLite database holding analyses and reports. Defaults to the configured path.
    #[arg(long, global = true, env = "GURNEY_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the analysis suite over a discharge dataset and store the archive
    Analyze {
        /// CSV or spreadsheet (.xlsx, .xls, .xlsm, .ods) to analyze
        file: PathBuf,

        /// Owner the stored analysis belongs to
        #[arg(long)]
        owner: i64,

        /// Name to store the analysis under. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        /// Analyzers to run, comma separated (e.g. clinico,produccion). Defaults to the configured set.
        #[arg(long, value_delimiter = ',')]
        only: Vec<AnalyzerKind>,

        /// Also write the archive to this path (.zip is appended when missing)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Zero-based row holding the column labels in spreadsheets
        #[arg(long)]
        header_row: Option<usize>,
    },
    /// List stored analyses of an owner, newest first
    List {
        #[arg(long)]
        owner: i64,
    },
    /// Write a stored analysis archive to a file
    Export {
        /// Analysis id
        id: i64,

        /// Destination (.zip is appended when missing)
        #[arg(long)]
        out: PathBuf,
    },
    /// Delete a stored analysis (or report, with --report)
    Delete {
        id: i64,

        #[arg(long)]
        report: bool,
    },
    /// Compose a PDF report from a stored analysis and store it
    Report {
        /// Analysis id
        id: i64,

        /// Owner the stored report belongs to
        #[arg(long)]
        owner: i64,

        /// Also write the PDF to this path (.pdf is appended when missing)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List stored reports of an owner, newest first
    Reports {
        #[arg(long)]
        owner: i64,
    },
    /// Show the column layouts gurney recognizes
    Dialects,
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let settings = config::load_app_config().settings;
    let db = cli.db.clone().unwrap_or_else(|| settings.database_path());

    match cli.command {
        Commands::Analyze {
            file,
            owner,
            name,
            only,
            out,
            header_row,
        } => handle_analyze(&settings, db, file, owner, name, only, out, header_row).await,
        Commands::List { owner } => handle_list(db, RecordKind::Analysis, owner),
        Commands::Export { id, out } => handle_export(db, id, out).await,
        Commands::Delete { id, report } => handle_delete(db, id, report),
        Commands::Report { id, owner, out } => handle_report(&settings, db, id, owner, out).await,
        Commands::Reports { owner } => handle_list(db, RecordKind::Report, owner),
        Commands::Dialects => {
            print_dialects();
            Ok(())
        }
    }
}

#[expect(clippy::too_many_arguments)]
async fn handle_analyze(
    settings: &AppSettings,
    db: PathBuf,
    file: PathBuf,
    owner: i64,
    name: Option<String>,
    only: Vec<AnalyzerKind>,
    out: Option<PathBuf>,
    header_row: Option<usize>,
) -> Result<()> {
    let options = LoadOptions {
        header_row: header_row.unwrap_or(settings.spreadsheet_header_row),
        ..LoadOptions::default()
    };
    println!("Loading {}...", file.display());
    let dataset = acquire_source(file.clone(), options)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let kinds = if only.is_empty() {
        settings.analyzers.clone()
    } else {
        only
    };

    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.trigger();
        }
    });

    let theme = &settings.chart_theme;
    let renderer = PlottersRenderer::new(theme);
    let ctx = RunContext {
        renderer: &renderer,
        theme,
    };
    let mut progress = ProgressAggregator::new().with_observer(|snapshot| {
        if !snapshot.label.is_empty() {
            println!(
                "[{:>3.0}%] {}/{} {}",
                snapshot.fraction * 100.0,
                snapshot.current,
                snapshot.total,
                snapshot.label
            );
        }
    });

    let run = run_analysis(&dataset, &kinds, ctx, &mut progress, &cancel)?;
    for warning in &run.report.coercions {
        println!(
            "  {} unreadable value(s) in '{}' were left empty",
            warning.count, warning.column
        );
    }
    for outcome in run.report.outcomes.iter().filter(|o| !o.succeeded()) {
        println!(
            "  {} failed: {}",
            outcome.kind,
            outcome.error.as_deref().unwrap_or_default()
        );
    }

    let blob = build_archive(&run)?;
    let name = name.unwrap_or_else(|| dataset.name().to_owned());
    let mut store = RecordStore::open(&db)?;
    let id = pipeline::store_run(&mut store, owner, &name, &blob)?;
    config::log_event("Analysis", &format!("Stored '{name}' as #{id} for owner {owner}"));

    println!("{}", run.report.summary());
    println!("Stored as analysis #{id} ({})", fmt_bytes(blob.len() as u64));

    if let Some(out) = out {
        let written = deliver_archive(&blob, &out).await?;
        println!("Archive written to {}", written.display());
    }
    Ok(())
}

fn handle_list(db: PathBuf, kind: RecordKind, owner: i64) -> Result<()> {
    let store = RecordStore::open(&db)?;
    let records = store.list_for_owner(kind, owner)?;
    if records.is_empty() {
        println!("No stored {kind} records for owner {owner}.");
        return Ok(());
    }
    print_records(&records);
    Ok(())
}

fn print_records(records: &[RecordSummary]) {
    let width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    println!("{:>6}  {:<width$}  {:<19}  {:>10}", "ID", "NAME", "DATE", "SIZE");
    for record in records {
        println!(
            "{:>6}  {:<width$}  {:<19}  {:>10}",
            record.id,
            record.name,
            record.date,
            fmt_bytes(record.size_bytes)
        );
    }
}

async fn handle_export(db: PathBuf, id: i64, out: PathBuf) -> Result<()> {
    let store = RecordStore::open(&db)?;
    let blob = store.fetch(RecordKind::Analysis, id)?;
    let written = deliver_archive(&blob, &out).await?;
    println!("Analysis #{id} written to {}", written.display());
    Ok(())
}

fn handle_delete(db: PathBuf, id: i64, report: bool) -> Result<()> {
    let kind = if report {
        RecordKind::Report
    } else {
        RecordKind::Analysis
    };
    let mut store = RecordStore::open(&db)?;
    store.delete(kind, id)?;
    config::log_event("Delete", &format!("Deleted {kind} #{id}"));
    println!("Deleted {kind} #{id}.");
    Ok(())
}

async fn handle_report(
    settings: &AppSettings,
    db: PathBuf,
    id: i64,
    owner: i64,
    out: Option<PathBuf>,
) -> Result<()> {
    let theme = &settings.chart_theme;
    let composer = GenpdfComposer::locate(theme.fonts_dir.as_deref(), theme.font_family.as_deref())
        .context(
            "No font family for PDF reports; set chart_theme.fonts_dir and chart_theme.font_family in config.json",
        )?;
    let renderer = PlottersRenderer::new(theme);
    let scratch_dir = settings.scratch_dir();

    let mut store = RecordStore::open(&db)?;
    let report_id = report::compose_report(
        &mut store,
        ReportRequest {
            record_id: id,
            owner_id: owner,
            scratch_dir: &scratch_dir,
            title_prefix: &settings.report_title,
        },
        RunContext {
            renderer: &renderer,
            theme,
        },
        &composer,
    )?;
    config::log_event("Report", &format!("Report #{report_id} from analysis #{id}"));
    println!("Stored as report #{report_id}");

    if let Some(out) = out {
        let pdf = store.fetch(RecordKind::Report, report_id)?;
        let written = deliver_report(&pdf, &out).await?;
        println!("Report written to {}", written.display());
    }
    Ok(())
}

fn print_dialects() {
    for dialect in DIALECTS {
        println!("{} (priority {})", dialect.name, dialect.priority);
        println!("  required:");
        for (field, label) in dialect.required {
            println!("    {label:<36} {field:?}");
        }
        println!("  optional:");
        for (field, label) in dialect.optional {
            println!("    {label:<36} {field:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_parses_analyzer_list() {
        let cli = Cli::try_parse_from([
            "gurney",
            "analyze",
            "egresos.xlsx",
            "--owner",
            "3",
            "--only",
            "clinico,produccion",
            "--db",
            "/tmp/g.db",
        ])
        .expect("valid arguments");
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/g.db")));
        let Commands::Analyze { only, owner, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(owner, 3);
        assert_eq!(only, vec![AnalyzerKind::Clinical, AnalyzerKind::Production]);
    }

    #[test]
    fn test_unknown_analyzer_rejected() {
        assert!(
            Cli::try_parse_from(["gurney", "analyze", "x.csv", "--owner", "1", "--only", "radiologia"])
                .is_err()
        );
    }
}
