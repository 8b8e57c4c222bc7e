use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use typeahead_core::config::{expand_path, Config, MatchMode, Settings};
use typeahead_core::traits::IndexSink;
use typeahead_core::types::{BuildContext, LookupRequest};
use typeahead_ingest::{BulkIngestionCoordinator, CompletionSink, IngestReport, JsonLineBuilder, LineSource};
use typeahead_text::{SuggesterRegistry, SuggestionResolver};

#[derive(Parser)]
#[command(name = "typeahead", about = "Weighted autocomplete suggester with bulk ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a JSON-lines file or directory and report the tally.
    Ingest(IngestArgs),
    /// Ingest, commit, then answer one lookup as JSON.
    Suggest {
        #[command(flatten)]
        ingest: IngestArgs,
        #[arg(long)]
        text: String,
        /// 0 selects the default of 5.
        #[arg(long, default_value_t = 0)]
        count: i32,
        #[arg(long = "context")]
        contexts: Vec<String>,
        #[arg(long)]
        all_terms: bool,
        #[arg(long)]
        highlight: bool,
    },
}

#[derive(Args)]
struct IngestArgs {
    #[arg(long)]
    input: String,
    /// Suggester name; defaults to `suggest.default_index`.
    #[arg(long)]
    index: Option<String>,
    #[arg(long, env = "TYPEAHEAD_WORKERS")]
    workers: Option<usize>,
    /// `infix` or `prefix`; defaults to `suggest.mode`.
    #[arg(long)]
    mode: Option<MatchMode>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_report(report: &IngestReport) {
    println!("📊 Processed {} records in {:.2?}", report.processed, report.elapsed);
    println!("   ✅ succeeded: {}", report.succeeded);
    println!("   ❌ failed:    {}", report.failed);
    if report.skipped > 0 { println!("   ⏭️  skipped:   {}", report.skipped); }
    if report.cancelled > 0 { println!("   ⚠️  cancelled: {}", report.cancelled); }
    if report.stopped_early { println!("   ⚠️  stopped before the end of the input"); }
    for (id, cause) in &report.failures { println!("   record {id}: {cause}"); }
}

async fn ingest(args: &IngestArgs, settings: &Settings, registry: &Arc<SuggesterRegistry>) -> anyhow::Result<String> {
    let name = args.index.clone().unwrap_or_else(|| settings.suggest.default_index.clone());
    let mode = args.mode.unwrap_or(settings.suggest.mode);
    let workers = args.workers.unwrap_or_else(|| settings.ingest.worker_count());
    let input: PathBuf = expand_path(&args.input);

    let source = Arc::new(LineSource::new(&input));
    let sink = Arc::new(
        CompletionSink::new(name.clone(), mode, Arc::clone(registry)).with_max_key_len(settings.ingest.max_key_len),
    );
    let coordinator = BulkIngestionCoordinator::new(workers);
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⚠️  Interrupt received, finishing in-flight records...");
            cancel.cancel();
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} records {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    let ctx = BuildContext { index_name: name.clone() };
    let report = coordinator
        .ingest_observed(source, Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx, |_, _| pb.inc(1))
        .await
        .with_context(|| format!("ingesting {}", input.display()))?;
    pb.finish_with_message("done");
    print_report(&report);

    let generation = sink.commit().await.context("committing suggester")?;
    println!("✅ Suggester '{name}' committed at generation {generation}");
    Ok(name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    tracing::debug!(?settings, "loaded settings");
    let registry = Arc::new(SuggesterRegistry::new());

    match Cli::parse().command {
        Command::Ingest(args) => {
            ingest(&args, &settings, &registry).await?;
        }
        Command::Suggest { ingest: args, text, count, contexts, all_terms, highlight } => {
            let name = ingest(&args, &settings, &registry).await?;
            let request = LookupRequest { suggest_name: name, text, count, contexts, all_terms_required: all_terms, highlight };
            let results = SuggestionResolver::new(&registry).handle(request)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}
