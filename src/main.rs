use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use kpi_dashboard_lib::config::DashboardConfig;
use kpi_dashboard_lib::dashboard::{watch, Dashboard};
use kpi_dashboard_lib::render::{JsonSurface, JsonTarget};
use kpi_dashboard_lib::source::{CachedSource, MemorySource, MetricSource, SqliteSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Personal KPI dashboard views")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose every metric group once and write the views
    Render {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        output: OutputArgs,
        /// Date the dashboard is computed for (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Re-render on a fixed interval
    Watch {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Check the configuration, and the database schema when one is given
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the effective configuration as YAML
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Dashboard YAML file (defaults to the built-in groups)
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database holding the metric tables
    #[arg(long)]
    database: Option<PathBuf>,
    /// JSON array of observations, used instead of a database
    #[arg(long, conflicts_with = "database")]
    observations: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    compact: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render { source, output, as_of } => {
            let dashboard = build_dashboard(&source, &output)?;
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            dashboard.refresh(as_of)?;
        }
        Command::Watch { source, output, interval_secs } => {
            let dashboard = Arc::new(build_dashboard(&source, &output)?);
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(watch(dashboard, Duration::from_secs(interval_secs)));
        }
        Command::Validate { source } => {
            let config = load_config(source.config.as_ref())?;
            init_logging(&config)?;
            if let Some(path) = source.database.as_ref().or(config.source.database.as_ref()) {
                let source = SqliteSource::open(path, &config.groups)?;
                println!("schema OK ({})", source.path().display());
            }
            println!("configuration OK ({} groups)", config.groups.len());
        }
        Command::PrintConfig { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_yaml()?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DashboardConfig> {
    match path {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(DashboardConfig::builtin()),
    }
}

fn init_logging(config: &DashboardConfig) -> anyhow::Result<()> {
    kpi_dashboard_lib::init_tracing(config.log_dir.as_deref()).map_err(|error| anyhow!(error))
}

fn build_dashboard(source: &SourceArgs, output: &OutputArgs) -> anyhow::Result<Dashboard> {
    let config = load_config(source.config.as_ref())?;
    init_logging(&config)?;

    let inner: Box<dyn MetricSource> = if let Some(path) = source.observations.as_ref() {
        Box::new(MemorySource::from_json_file(path)?)
    } else {
        let path = source
            .database
            .as_ref()
            .or(config.source.database.as_ref())
            .ok_or_else(|| anyhow!("no metric source: pass --database or --observations"))?;
        Box::new(SqliteSource::open(path, &config.groups)?)
    };
    let cached = CachedSource::new(inner, Duration::from_secs(config.source.cache_ttl_seconds));

    let target = match output.output.clone() {
        Some(path) => JsonTarget::File(path),
        None => JsonTarget::Stdout,
    };
    let surface = if output.compact {
        JsonSurface::new(target).compact()
    } else {
        JsonSurface::new(target)
    };

    Ok(Dashboard::new(Arc::new(config), Arc::new(cached), Arc::new(surface)))
}
