//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use repowiki_core::diagnostics::run_diagnostics;
use repowiki_core::pipeline::{
    GenerateSummary, IndexOptions, IndexSummary, ProgressReporter, run_generate, run_index,
};
use repowiki_engine::{LightRagClient, ModelBindings, require_model};
use repowiki_shared::{Config, ConfigOverrides, IngestOptions, Settings};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// repowiki: turn a source repository into a generated wiki.
#[derive(Parser)]
#[command(
    name = "repowiki",
    version,
    about = "Index a repository into a knowledge graph and generate a hierarchical wiki from it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.repowiki/repowiki.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Index the repository into the knowledge engine.
    Index {
        /// Repository root.
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Working directory for engine storage and run reports.
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Return as soon as documents are submitted.
        #[arg(long)]
        no_wait: bool,
    },

    /// Generate the wiki from an indexed repository.
    Generate {
        /// Working directory for engine storage and run reports.
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Output directory for the wiki.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include the extended categories.
        #[arg(long)]
        extended: bool,

        /// Completion model the engine must be serving. Pages are written
        /// by the engine's own model; the run stops if it reports another.
        #[arg(long)]
        model: Option<String>,
    },

    /// Index, then generate.
    All {
        /// Repository root.
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Include the extended categories.
        #[arg(long)]
        extended: bool,

        /// Completion model the engine must be serving. Pages are written
        /// by the engine's own model; the run stops if it reports another.
        #[arg(long)]
        model: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Check the environment before a run.
    Test {
        /// Repository root.
        #[arg(long)]
        repo: Option<PathBuf>,
    },

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
        0 => "repowiki=info",
        1 => "repowiki=debug",
        _ => "repowiki=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.as_deref();
    match cli.command {
        Command::Index {
            repo,
            working_dir,
            no_wait,
        } => {
            let overrides = ConfigOverrides {
                repo_path: repo,
                working_dir,
                ..Default::default()
            };
            cmd_index(config_file, &overrides, !no_wait).await
        }
        Command::Generate {
            working_dir,
            output,
            extended,
            model,
        } => {
            let overrides = ConfigOverrides {
                working_dir,
                output_dir: output,
                llm_model: model,
                ..Default::default()
            };
            cmd_generate(config_file, &overrides, extended).await
        }
        Command::All {
            repo,
            extended,
            model,
            yes,
        } => {
            let overrides = ConfigOverrides {
                repo_path: repo,
                llm_model: model,
                ..Default::default()
            };
            cmd_all(config_file, &overrides, extended, yes).await
        }
        Command::Test { repo } => {
            let overrides = ConfigOverrides {
                repo_path: repo,
                ..Default::default()
            };
            cmd_test(config_file, &overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(config_file),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn resolve_settings(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Settings> {
    let settings = Config::resolve(config_file, overrides)?.validate()?;
    info!(
        repo = %settings.repo_path.display(),
        repo_name = %settings.repo_name,
        workspace = %settings.workspace,
        "configuration resolved"
    );
    Ok(settings)
}

/// Build the engine client with its model bindings.
fn engine_client(settings: &Settings) -> Result<LightRagClient> {
    let bindings = ModelBindings::from_settings(settings)?;
    Ok(LightRagClient::new(settings)?.with_bindings(bindings))
}

/// Build the client and fail fast when the engine is unreachable, or when
/// it serves a different completion model than the one asked for.
async fn connect(settings: &Settings, expected_model: Option<&str>) -> Result<LightRagClient> {
    let client = engine_client(settings)?;
    let health = client.verify(&IngestOptions::from(settings)).await?;
    if let Some(model) = expected_model {
        require_model(&health, model)?;
    }
    Ok(client)
}

async fn cmd_index(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
    wait_for_idle: bool,
) -> Result<()> {
    let settings = resolve_settings(config_file, overrides)?;
    let engine = connect(&settings, None).await?;

    let summary = index(&settings, &engine, wait_for_idle).await?;
    print_index_summary(&summary);
    Ok(())
}

async fn cmd_generate(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
    extended: bool,
) -> Result<()> {
    let settings = resolve_settings(config_file, overrides)?;
    let engine = connect(&settings, overrides.llm_model.as_deref()).await?;

    let summary = generate(&settings, &engine, extended).await?;
    print_generate_summary(&summary);
    Ok(())
}

async fn cmd_all(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
    extended: bool,
    yes: bool,
) -> Result<()> {
    let settings = resolve_settings(config_file, overrides)?;

    println!();
    println!("  This will:");
    println!(
        "    1. Index {} into workspace '{}'",
        settings.repo_path.display(),
        settings.workspace
    );
    println!(
        "    2. Generate the {} wiki into {}",
        if extended { "extended" } else { "base" },
        settings.output_dir.display()
    );
    println!("  Model: {}", settings.llm_model);
    println!();

    if !yes && !confirm("  Continue? [yes/no]: ").await? {
        println!("Cancelled");
        return Ok(());
    }

    let engine = connect(&settings, overrides.llm_model.as_deref()).await?;

    let indexed = index(&settings, &engine, true).await?;
    print_index_summary(&indexed);
    indexed.ensure_indexed()?;

    let generated = generate(&settings, &engine, extended).await?;
    print_generate_summary(&generated);
    Ok(())
}

async fn cmd_test(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<()> {
    let settings = resolve_settings(config_file, overrides)?;
    let engine = engine_client(&settings)?;

    println!("{}", "=".repeat(60));
    println!("TESTING SETUP");
    println!("{}", "=".repeat(60));

    let report = run_diagnostics(&settings, &engine, engine.bindings()).await;
    print!("{}", report.render());

    let errors = report.errors().count();
    if errors > 0 {
        return Err(eyre!("setup check found {errors} error(s)"));
    }
    Ok(())
}

fn cmd_config_show(config_file: Option<&Path>) -> Result<()> {
    let mut config = Config::resolve(config_file, &ConfigOverrides::default())?;
    config.api_key = redact(&config.api_key);
    config.engine_api_key = config.engine_api_key.as_deref().map(redact);

    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

async fn index(
    settings: &Settings,
    engine: &LightRagClient,
    wait_for_idle: bool,
) -> Result<IndexSummary> {
    let options = IndexOptions {
        wait_for_idle,
        ..Default::default()
    };
    let reporter = CliProgress::new();
    let result = run_index(settings, engine, &options, &reporter).await;
    reporter.finish();
    Ok(result?)
}

async fn generate(
    settings: &Settings,
    engine: &LightRagClient,
    extended: bool,
) -> Result<GenerateSummary> {
    let reporter = CliProgress::new();
    let result = run_generate(settings, engine, extended, &reporter).await;
    reporter.finish();
    Ok(result?)
}

/// Ask a yes/no question on stdin. Only `yes` and `y` confirm.
async fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write as _;

    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "yes" | "y"))
}

fn redact(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        return "****".into();
    }
    let tail: String = secret.chars().skip(len - 4).collect();
    format!("****{tail}")
}

fn print_index_summary(summary: &IndexSummary) {
    let report = &summary.ingest;
    println!();
    println!("  Indexing complete!");
    println!("  Candidates: {}", summary.candidates);
    println!("  Indexed:    {}", report.indexed);
    println!("  Skipped:    {}", report.skipped);
    println!("  Errors:     {}", report.errors);
    if report.used_fallback {
        println!("  (batch submission failed; documents were submitted one by one)");
    }
    for (path, reason) in report.failures.iter().take(10) {
        println!("    - {path}: {reason}");
    }
    if report.failures.len() > 10 {
        println!("    ... and {} more", report.failures.len() - 10);
    }
    println!("  Report:     {}", summary.report_path.display());
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn print_generate_summary(summary: &GenerateSummary) {
    println!();
    println!("  Wiki generated!");
    println!("  Pages:  {}", summary.generated);
    println!("  Failed: {}", summary.failed);
    for failure in &summary.failures {
        println!("    - {}: {}", failure.path, failure.reason);
    }
    println!("  Output: {}", summary.output_dir.display());
    println!("  Report: {}", summary.report_path.display());
    println!("  Time:   {:.1}s", summary.elapsed.as_secs_f64());
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn advance(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_all_with_flags() {
        let cli = Cli::try_parse_from([
            "repowiki", "-vv", "all", "--repo", "/tmp/r", "--extended", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::All {
                repo,
                extended,
                yes,
                model,
            } => {
                assert_eq!(repo, Some(PathBuf::from("/tmp/r")));
                assert!(extended && yes);
                assert!(model.is_none());
            }
            _ => panic!("expected all"),
        }
    }

    #[test]
    fn cli_parses_generate_output_and_model() {
        let cli = Cli::try_parse_from([
            "repowiki", "generate", "-o", "docs", "--model", "gpt-4o-mini",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Generate { output: Some(ref o), model: Some(ref m), extended: false, .. }
                if o == &PathBuf::from("docs") && m == "gpt-4o-mini"
        ));
    }

    #[test]
    fn redact_keeps_only_tail() {
        assert_eq!(redact("sk-abcdef1234"), "****1234");
        assert_eq!(redact("abc"), "****");
    }
}
