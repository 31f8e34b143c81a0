//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use citegraph_core::pipeline;
use citegraph_core::report::{ProgressReporter, SyncReport};
use citegraph_shared::{
    AppConfig, CONFIG_FILE_NAME, RefreshPolicy, SyncConfig, WritePolicy, init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// citegraph: incremental milestone graph builder.
#[derive(Parser)]
#[command(
    name = "citegraph",
    version,
    about = "Build the milestone graph artifact from Markdown documents and keep citation counts fresh.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the config file (defaults to ./citegraph.toml when present).
    #[arg(long, global = true, env = "CITEGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Re-parse changed documents, refresh missing citations, rebuild the artifact.
    Sync {
        /// Look up citations for every node with a DOI, not only missing ones.
        #[arg(long)]
        force_citations: bool,

        /// Write the artifact even when nothing changed.
        #[arg(long)]
        always_write: bool,

        /// Documents directory.
        #[arg(long, value_name = "DIR")]
        documents: Option<PathBuf>,

        /// Change cache file.
        #[arg(long, value_name = "FILE")]
        cache: Option<PathBuf>,

        #[command(flatten)]
        paths: ArtifactPaths,
    },

    /// Refresh citation counts of the existing artifact without scanning documents.
    Refresh {
        /// Only look up nodes with no citation count yet.
        #[arg(long)]
        only_missing: bool,

        #[command(flatten)]
        paths: ArtifactPaths,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Path overrides shared by `sync` and `refresh`.
#[derive(Args, Debug, Default)]
pub(crate) struct ArtifactPaths {
    /// Graph artifact file.
    #[arg(long, value_name = "FILE")]
    pub artifact: Option<PathBuf>,

    /// BibTeX file mapping node ids to DOIs.
    #[arg(long, value_name = "FILE")]
    pub bibliography: Option<PathBuf>,
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
        0 => "citegraph=info",
        1 => "citegraph=debug",
        _ => "citegraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Sync {
            force_citations,
            always_write,
            documents,
            cache,
            paths,
        } => {
            let mut config = sync_config(config_path, &paths)?;
            if let Some(dir) = documents {
                config.documents_dir = dir;
            }
            if let Some(file) = cache {
                config.cache_file = file;
            }
            if force_citations {
                config.refresh = RefreshPolicy::All;
            }
            if always_write {
                config.write = WritePolicy::Always;
            }
            cmd_sync(&config).await
        }
        Command::Refresh {
            only_missing,
            paths,
        } => {
            let mut config = sync_config(config_path, &paths)?;
            config.refresh = if only_missing {
                RefreshPolicy::Missing
            } else {
                RefreshPolicy::All
            };
            config.write = WritePolicy::Always;
            cmd_refresh(&config).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Resolve the runtime config from the config file plus path overrides.
fn sync_config(config_path: Option<&Path>, paths: &ArtifactPaths) -> Result<SyncConfig> {
    let app = load_config(config_path)?;
    let mut config = SyncConfig::from(&app);

    if let Some(file) = &paths.artifact {
        config.artifact_file = file.clone();
    }
    if let Some(file) = &paths.bibliography {
        config.bibliography_file = file.clone();
    }

    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(config: &SyncConfig) -> Result<()> {
    info!(
        documents = %config.documents_dir.display(),
        artifact = %config.artifact_file.display(),
        refresh = ?config.refresh,
        write = ?config.write,
        "syncing milestone graph"
    );

    let reporter = CliProgress::new();
    let report = pipeline::sync(config, &reporter).await?;

    print_summary("Sync", &report);
    Ok(())
}

async fn cmd_refresh(config: &SyncConfig) -> Result<()> {
    if !config.artifact_file.exists() {
        return Err(eyre!(
            "no artifact found at '{}'. Run `citegraph sync` first.",
            config.artifact_file.display()
        ));
    }

    info!(
        artifact = %config.artifact_file.display(),
        refresh = ?config.refresh,
        "refreshing citation counts"
    );

    let reporter = CliProgress::new();
    let report = pipeline::refresh(config, &reporter).await?;

    print_summary("Refresh", &report);
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE_NAME));
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(label: &str, report: &SyncReport) {
    println!();
    match report.written() {
        Some(meta) => {
            println!("  {label} complete, artifact written.");
            println!("  Path:      {}", meta.path.display());
            println!("  SHA-256:   {}", meta.sha256);
        }
        None => println!("  {label} complete, nothing changed."),
    }
    println!("  Nodes:     {}", report.node_count);
    println!("  Links:     {}", report.link_count);
    if report.documents_scanned > 0 {
        println!(
            "  Documents: {} scanned, {} merged, {} unchanged",
            report.documents_scanned, report.documents_merged, report.documents_unchanged
        );
    }
    println!(
        "  Citations: {} fetched, {} updated, {} unknown, {} failed",
        report.citations_fetched,
        report.citations_updated,
        report.citations_unknown,
        report.citation_failures.len()
    );

    for item in &report.skipped {
        println!("  Skipped:   {} ({})", item.item, item.reason);
    }
    for item in &report.citation_failures {
        println!("  No count:  {} ({})", item.item, item.reason);
    }
    for dangling in &report.dangling {
        println!(
            "  Dangling:  {} -> missing parent '{}'",
            dangling.node, dangling.parent
        );
    }

    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
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
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_parsed(&self, filename: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Parsing [{current}/{total}] {filename}"));
    }

    fn citation_fetched(&self, id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Citations [{current}/{total}] {id}"));
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_flags_parse() {
        let cli = Cli::parse_from([
            "citegraph",
            "-vv",
            "sync",
            "--force-citations",
            "--artifact",
            "out.json",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Sync {
                force_citations,
                always_write,
                paths,
                ..
            } => {
                assert!(force_citations);
                assert!(!always_write);
                assert_eq!(paths.artifact, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn path_overrides_replace_config_values() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("citegraph.toml");
        std::fs::write(&config_file, "[paths]\nartifact_file = \"from-file.json\"\n").unwrap();

        let paths = ArtifactPaths {
            artifact: None,
            bibliography: Some(PathBuf::from("refs.bib")),
        };
        let config = sync_config(Some(&config_file), &paths).unwrap();
        assert_eq!(config.artifact_file, PathBuf::from("from-file.json"));
        assert_eq!(config.bibliography_file, PathBuf::from("refs.bib"));
    }
}
