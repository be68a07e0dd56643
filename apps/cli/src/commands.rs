//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use catalogbuilder_core::pipeline::{ProgressReporter, RunConfig, export_flat_text, run_catalog};
use catalogbuilder_core::resolver::ConfigPool;
use catalogbuilder_shared::{
    AppConfig, RunReport, WorkDirs, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// catalogbuilder: supplier price lists in, catalog workbooks out.
#[derive(Parser)]
#[command(
    name = "catalogbuilder",
    version,
    about = "Reconcile supplier cost and sale price lists into catalog workbooks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.catalogbuilder/catalogbuilder.toml.
    #[arg(long, global = true, env = "CATALOGBUILDER_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run the full pipeline over every workbook in the sheets directory.
    Run {
        /// Working directory the configured paths are relative to
        /// (defaults to the current directory).
        #[arg(short, long)]
        workdir: Option<PathBuf>,
    },

    /// Show which Config and role a workbook file name resolves to.
    Resolve {
        /// Workbook file name or path.
        file: String,

        /// Working directory holding the configs directory.
        #[arg(short, long)]
        workdir: Option<PathBuf>,
    },

    /// Write the flat-text records of every sheet of one workbook.
    Extract {
        /// Workbook to extract.
        workbook: PathBuf,

        /// Output directory (defaults to the configured flat-text directory).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Working directory holding the configs directory.
        #[arg(short, long)]
        workdir: Option<PathBuf>,
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
        0 => "catalogbuilder=info",
        1 => "catalogbuilder=debug",
        _ => "catalogbuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run { workdir } => cmd_run(config_path.as_deref(), workdir.as_deref()),
        Command::Resolve { file, workdir } => {
            cmd_resolve(config_path.as_deref(), &file, workdir.as_deref())
        }
        Command::Extract {
            workbook,
            out,
            workdir,
        } => cmd_extract(
            config_path.as_deref(),
            &workbook,
            out.as_deref(),
            workdir.as_deref(),
        ),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

/// App config from `--config`, or the default location.
fn app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Working directories resolved against `--workdir` or the current directory.
fn work_dirs(config: &AppConfig, workdir: Option<&Path>) -> Result<WorkDirs> {
    let root = match workdir {
        Some(dir) => {
            if !dir.is_dir() {
                return Err(eyre!("working directory '{}' does not exist", dir.display()));
            }
            dir.to_path_buf()
        }
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?,
    };
    Ok(WorkDirs::resolve(&config.paths, &root))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_run(config_path: Option<&Path>, workdir: Option<&Path>) -> Result<()> {
    let config = app_config(config_path)?;
    let dirs = work_dirs(&config, workdir)?;

    let run_config = RunConfig {
        dirs,
        pipeline: config.pipeline.clone(),
        output: config.output.clone(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(sheets = %run_config.dirs.sheets.display(), "running catalog pipeline");

    let reporter = CliProgress::new();
    let report = run_catalog(&run_config, &reporter)?;

    let elapsed = report.finished_at - report.started_at;
    println!();
    println!("  Catalog run finished");
    println!("  Run:        {}", report.id);
    println!("  Sheets:     {}", report.sheets.len());
    for group in &report.groups {
        println!(
            "  {:<11} {} merged, {} written ({} cost / {} sale unmatched)",
            format!("{}:", group.config),
            group.merged,
            group.rows_written,
            group.unmatched_cost,
            group.unmatched_sale,
        );
        if let Some(output) = &group.output {
            println!("              -> {output}");
        }
    }
    println!("  New NCM:    {}", report.new_fiscal_codes);
    println!("  Next code:  {:06}", report.next_product_code);
    if !report.failures.is_empty() {
        println!("  Skipped:");
        for failure in &report.failures {
            println!("    - {failure}");
        }
    }
    println!(
        "  Time:       {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!();

    Ok(())
}

fn cmd_resolve(config_path: Option<&Path>, file: &str, workdir: Option<&Path>) -> Result<()> {
    let config = app_config(config_path)?;
    let dirs = work_dirs(&config, workdir)?;
    let pool = ConfigPool::load(&dirs.configs)?;

    let file_name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("'{file}' has no file name"))?;

    let resolution = pool
        .resolve(&file_name)
        .ok_or_else(|| eyre!("no configs loaded from {}", dirs.configs.display()))?;
    let named = pool
        .get(resolution.index)
        .ok_or_else(|| eyre!("resolved config {} missing", resolution.index))?;

    println!("  File:     {file_name}");
    println!("  Config:   {} ({})", named.name, named.path.display());
    println!(
        "  Role:     {}",
        resolution.role.map(|r| r.as_str()).unwrap_or("unknown")
    );
    println!("  Score:    {:.2}", resolution.score);
    if resolution.fallback {
        println!("  (no config matched; using the first one)");
    }

    Ok(())
}

fn cmd_extract(
    config_path: Option<&Path>,
    workbook: &Path,
    out: Option<&Path>,
    workdir: Option<&Path>,
) -> Result<()> {
    if !workbook.is_file() {
        return Err(eyre!("workbook '{}' not found", workbook.display()));
    }
    let config = app_config(config_path)?;
    let dirs = work_dirs(&config, workdir)?;
    let pool = ConfigPool::load(&dirs.configs)?;

    let out_dir = out.map(Path::to_path_buf).unwrap_or(dirs.flat);
    let written = export_flat_text(workbook, &pool, &out_dir)?;

    for path in &written {
        println!("{}", path.display());
    }
    info!(files = written.len(), "extraction complete");
    Ok(())
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

    fn item_done(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {name}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
