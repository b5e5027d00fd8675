//! CLI command definitions, routing, and tracing setup.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use newswatch_core::classifier::OpenRouterClassifier;
use newswatch_core::pipeline::{Outcome, Pipeline, PipelineSettings, ProgressReporter, RunReport};
use newswatch_core::topics::TopicSet;
use newswatch_core::triage::{
    BackgroundWriter, SkipFilter, TriageQueue, WriteEvent, WriteOp, prepare_queue,
};
use newswatch_extract::HttpExtractor;
use newswatch_filters::{DateFormat, SimilarityRule, TitleNormalizer};
use newswatch_shared::{
    AppConfig, CandidateArticle, Relevance, api_key, init_config, load_config, load_config_from,
};
use newswatch_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Longest accepted `ingest --every` interval: one week.
const MAX_EVERY_MINUTES: u64 = 7 * 24 * 60;

/// Newswatch — keep only the news that matters, once.
#[derive(Parser)]
#[command(
    name = "newswatch",
    version,
    about = "Deduplicate, filter, and triage news articles from many sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.newswatch/newswatch.toml).
    #[arg(long, global = true, env = "NEWSWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `defaults.database_path`.
    #[arg(long, global = true, env = "NEWSWATCH_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run candidates through the filters and store the important ones.
    Ingest {
        /// JSON-lines file of candidates, or `-` for stdin.
        #[arg(short, long)]
        input: String,

        /// How the source encodes publication dates.
        #[arg(long, default_value = "rfc3339")]
        date_format: DateFormat,

        /// Name of the ingestion source, stored with each article.
        #[arg(long)]
        origin: Option<String>,

        /// Re-read the input and run again every N minutes (at most a week).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_EVERY_MINUTES))]
        every: Option<u64>,
    },

    /// Show the unprocessed backlog in triage order.
    Queue {
        /// Maximum number of records to load.
        #[arg(short, long)]
        limit: Option<u32>,

        /// Mark filtered-out records as processed.
        #[arg(long)]
        apply: bool,
    },

    /// Toggle a record's processed flag, or set its relevance.
    Mark {
        /// Source ID.
        id: i64,

        /// Record a relevance verdict (yes, no, maybe) instead of toggling.
        #[arg(short, long)]
        relevance: Option<Relevance>,
    },

    /// Mark every unprocessed record whose title contains KEYWORD as processed.
    Filter {
        /// Case-insensitive literal keyword.
        keyword: String,
    },

    /// Show database counts (read-only).
    Stats,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newswatch=info",
        1 => "newswatch=debug",
        _ => "newswatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        };
    }

    let config = resolve_config(cli.config.as_deref())?;
    let db_path = match cli.db {
        Some(path) => path,
        None => config.database_path()?,
    };

    match cli.command {
        Command::Ingest {
            input,
            date_format,
            origin,
            every,
        } => cmd_ingest(&config, &db_path, &input, date_format, origin, every).await,
        Command::Queue { limit, apply } => cmd_queue(&config, &db_path, limit, apply).await,
        Command::Mark { id, relevance } => cmd_mark(&db_path, id, relevance).await,
        Command::Filter { keyword } => cmd_filter(&db_path, &keyword).await,
        Command::Stats => cmd_stats(&db_path).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    config: &AppConfig,
    db_path: &Path,
    input: &str,
    date_format: DateFormat,
    origin: Option<String>,
    every: Option<u64>,
) -> Result<()> {
    if input == "-" && every.is_some() {
        return Err(eyre!("--every needs a file input; stdin can only be read once"));
    }

    // Validate API key before doing anything
    let key = api_key(config)?;

    let storage = Arc::new(Storage::open(db_path).await?);
    let extractor = Arc::new(HttpExtractor::new(&config.extraction)?);
    let classifier = Arc::new(OpenRouterClassifier::new(&config.openrouter, key)?);
    let settings = PipelineSettings::from_config(config, date_format, origin);
    let mut pipeline = Pipeline::new(storage, settings, extractor, classifier);

    loop {
        let candidates = read_candidates(input)?;
        info!(input, candidates = candidates.len(), %date_format, "ingesting candidates");

        let reporter = CliProgress::new();
        let report = pipeline.run_batch(candidates, &reporter).await;
        print_report(&report);

        let Some(minutes) = every else {
            return Ok(());
        };
        info!(minutes, "waiting for next run");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(minutes.saturating_mul(60))) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

/// Read candidates from a JSON-lines file, or stdin for `-`.
fn read_candidates(input: &str) -> Result<Vec<CandidateArticle>> {
    if input == "-" {
        let stdin = std::io::stdin();
        return Ok(parse_candidates(stdin.lock()));
    }

    let file = std::fs::File::open(input).map_err(|e| eyre!("cannot open '{input}': {e}"))?;
    Ok(parse_candidates(std::io::BufReader::new(file)))
}

/// Parse one candidate per line. Blank lines are ignored; malformed lines are
/// logged and skipped.
fn parse_candidates(reader: impl BufRead) -> Vec<CandidateArticle> {
    let mut candidates = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(line = n + 1, error = %e, "unreadable input line");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CandidateArticle>(&line) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(line = n + 1, error = %e, "skipping malformed candidate"),
        }
    }
    candidates
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Run {} finished in {:.1}s", report.run_id, report.elapsed.as_secs_f64());
    println!("  Candidates: {}", report.total);
    for (outcome, count) in &report.counts {
        println!("  {:<18} {count}", format!("{outcome}:"));
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn candidate_started(&self, link: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Checking [{current}/{total}] {link}"));
    }

    fn candidate_finished(&self, link: &str, outcome: Outcome) {
        if outcome == Outcome::Saved {
            self.spinner.println(format!("  saved  {link}"));
        }
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Triage commands
// ---------------------------------------------------------------------------

async fn cmd_queue(config: &AppConfig, db_path: &Path, limit: Option<u32>, apply: bool) -> Result<()> {
    let skip = SkipFilter::compile(&config.triage.skip_patterns)?;
    let topics = TopicSet::compile(&config.topics)?;
    let rule = SimilarityRule::from_config(&config.similarity);
    let normalizer = TitleNormalizer::from_config(&config.filters);

    let storage = Arc::new(Storage::open(db_path).await?);
    let records = storage.list_unprocessed(limit).await?;
    let loaded = records.len();
    let prepared = prepare_queue(records, &skip, &topics, &rule, &normalizer);

    for record in &prepared.queue {
        let topic = topics.topic_of(&record.title).unwrap_or("-");
        println!(
            "{:>6}  {:<10} {}  {}",
            record.id,
            topic,
            record.date.format("%Y-%m-%d"),
            record.title
        );
        println!("        {}", record.link);
    }
    println!();
    println!(
        "  {} shown, {} filtered out of {loaded}",
        prepared.queue.len(),
        prepared.skipped.len()
    );

    if apply && !prepared.skipped.is_empty() {
        let ops = prepared.skipped.iter().map(|&id| WriteOp::Processed {
            id,
            processed: true,
            previous: false,
        });
        let failed = write_all(storage, ops, None).await;
        println!("  marked {} processed", prepared.skipped.len() - failed);
        if failed > 0 {
            return Err(eyre!("{failed} records could not be marked processed"));
        }
    }
    Ok(())
}

async fn cmd_mark(db_path: &Path, id: i64, relevance: Option<Relevance>) -> Result<()> {
    let storage = Arc::new(Storage::open(db_path).await?);
    let record = storage
        .get_source(id)
        .await?
        .ok_or_else(|| eyre!("no source with id {id}"))?;

    let mut queue = TriageQueue::new(vec![record], SkipFilter::default());
    let ops = match relevance {
        Some(relevance) => queue.set_relevance(0, relevance).into_iter().collect(),
        None => queue.toggle_processed(0),
    };

    let failed = write_all(storage, ops, Some(&mut queue)).await;
    if failed > 0 {
        return Err(eyre!("update of source {id} failed and was reverted"));
    }

    if let Some(item) = queue.get(0) {
        println!(
            "  {}  processed={}  relevance={}  {}",
            item.id, item.processed, item.relevance, item.title
        );
    }
    Ok(())
}

async fn cmd_filter(db_path: &Path, keyword: &str) -> Result<()> {
    let storage = Arc::new(Storage::open(db_path).await?);
    let records = storage.list_unprocessed(None).await?;

    let mut queue = TriageQueue::new(records, SkipFilter::default());
    let ops = queue.add_filter(keyword)?;
    let matched = ops.len();

    let failed = write_all(storage, ops, Some(&mut queue)).await;
    println!("  {} of {matched} matching records marked processed", matched - failed);
    if failed > 0 {
        return Err(eyre!("{failed} records could not be marked processed"));
    }
    Ok(())
}

/// Push every op through a [`BackgroundWriter`], wait for all of them, and
/// return how many failed. Results are applied to `queue` when given.
async fn write_all(
    storage: Arc<Storage>,
    ops: impl IntoIterator<Item = WriteOp>,
    mut queue: Option<&mut TriageQueue>,
) -> usize {
    let (mut writer, mut events) = BackgroundWriter::new(storage);
    for op in ops {
        writer.submit(op);
    }
    writer.shutdown().await;

    let mut failed = 0;
    while let Some(event) = events.recv().await {
        if let WriteEvent::Failed { op, error } = &event {
            warn!(id = op.id(), %error, "write failed");
            failed += 1;
        }
        if let Some(queue) = queue.as_deref_mut() {
            queue.apply(&event, Instant::now());
        }
    }
    failed
}

// ---------------------------------------------------------------------------
// stats / config
// ---------------------------------------------------------------------------

async fn cmd_stats(db_path: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let stats = storage.stats().await?;

    println!();
    println!("  Database:     {}", db_path.display());
    println!("  Sources:      {}", stats.sources);
    println!("  Unprocessed:  {}", stats.unprocessed);
    println!("  Important:    {}", stats.important);
    println!("  Relevant:     {}", stats.relevant);
    println!("  Titles seen:  {}", stats.remembered_titles);
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "newswatch",
            "ingest",
            "--input",
            "feed.jsonl",
            "--date-format",
            "compact",
            "--origin",
            "events",
            "--every",
            "15",
        ])
        .unwrap();
        match cli.command {
            Command::Ingest {
                input,
                date_format,
                origin,
                every,
            } => {
                assert_eq!(input, "feed.jsonl");
                assert_eq!(date_format, DateFormat::Compact);
                assert_eq!(origin.as_deref(), Some("events"));
                assert_eq!(every, Some(15));
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn every_interval_is_bounded() {
        let parse = |every: &str| {
            Cli::try_parse_from(["newswatch", "ingest", "-i", "feed.jsonl", "--every", every])
        };
        assert!(parse("0").is_err());
        assert!(parse("18446744073709551615").is_err());
        assert!(parse("10081").is_err());
        assert!(parse("10080").is_ok());
    }

    #[test]
    fn parses_mark_relevance() {
        let cli = Cli::try_parse_from(["newswatch", "mark", "42", "--relevance", "yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Mark {
                id: 42,
                relevance: Some(Relevance::Yes)
            }
        ));
        assert!(Cli::try_parse_from(["newswatch", "mark", "1", "-r", "perhaps"]).is_err());
        assert!(Cli::try_parse_from(["newswatch", "ingest", "-i", "x", "--date-format", "iso"]).is_err());
    }

    #[test]
    fn jsonl_parsing_skips_bad_lines() {
        let input = r#"{"title":"Quake hits coast","link":"https://a.com/1","date":"2025-02-10T08:00:00Z"}

not json
{"link":"https://a.com/2"}
{"title":"missing link"}
"#;
        let candidates = parse_candidates(input.as_bytes());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].published.as_deref(), Some("2025-02-10T08:00:00Z"));
        assert_eq!(candidates[1].link, "https://a.com/2");
    }
}
