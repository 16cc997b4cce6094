use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use phet_harvester::app::{NullSink, Pipeline, RunSummary};
use phet_harvester::config::{ConfigLoader, HarvestConfig, resolve_include_list};
use phet_harvester::error::HarvestError;
use phet_harvester::fetch::HttpFetcher;
use phet_harvester::progress::TerminalProgress;
use phet_harvester::source::PhetSource;

#[derive(Parser)]
#[command(name = "phet-harvest")]
#[command(about = "Harvest PhET simulations into portable offline archives")]
#[command(version, author)]
struct Cli {
    /// Languages to include (comma-separated locale slugs)
    #[arg(long, value_delimiter = ',')]
    include_languages: Option<Vec<String>>,

    /// Languages to exclude (comma-separated locale slugs)
    #[arg(long, value_delimiter = ',')]
    exclude_languages: Option<Vec<String>>,

    /// Keep one locale per base language; `en_CA` and friends are dropped
    /// in favor of the better-stocked variant
    #[arg(long)]
    without_language_variants: bool,

    /// Skip archives for individual languages
    #[arg(long)]
    mul_only: bool,

    /// Skip the all-languages archive
    #[arg(long, conflicts_with = "mul_only")]
    no_mul: bool,

    /// Root subject categories to harvest (comma-separated)
    #[arg(long, value_delimiter = ',')]
    subjects: Option<Vec<String>>,

    /// Output archives into a specific directory
    #[arg(long)]
    output: Option<String>,

    /// Path to harvest.json
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    /// Outbound requests per second
    #[arg(long)]
    rps: Option<u32>,

    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    image_resolution: Option<u32>,

    /// Abort the download phase after this many failed simulations
    #[arg(long)]
    failure_threshold: Option<usize>,

    #[arg(long)]
    verbose_errors: bool,

    /// Emit a JSON summary instead of drawing progress bars
    #[arg(long)]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        if let Some(harvest) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(harvest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidLocale(_)
        | HarvestError::UnmappedLanguage(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_) => 2,
        HarvestError::Fetch(_) | HarvestError::TooManyFailures { .. } => 3,
        _ => 1,
    }
}

async fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let fetcher =
        Arc::new(HttpFetcher::new(config.rps, config.retries).into_diagnostic()?);
    let source = PhetSource::with_base_url(fetcher.clone(), &config.base_url);
    let pipeline = Pipeline::new(config, source, fetcher);

    let summary = if cli.non_interactive {
        pipeline.run(&NullSink).await?
    } else {
        let progress = TerminalProgress::new();
        pipeline.run(&progress).await?
    };

    if cli.non_interactive {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).into_diagnostic()?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn build_config(cli: &Cli) -> miette::Result<HarvestConfig> {
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;

    if let Some(include) = &cli.include_languages {
        config.include_languages = Some(resolve_include_list(include.clone())?);
    }
    if let Some(exclude) = &cli.exclude_languages {
        config.exclude_languages = exclude
            .iter()
            .map(|slug| slug.parse())
            .collect::<Result<Vec<_>, HarvestError>>()?;
    }
    if cli.without_language_variants {
        config.without_language_variants = true;
    }
    if cli.mul_only {
        config.mul_only = true;
    }
    if cli.no_mul {
        config.create_mul = false;
    }
    if let Some(subjects) = &cli.subjects {
        config.subjects = subjects.clone();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone().into();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(rps) = cli.rps {
        config.rps = rps;
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    if let Some(resolution) = cli.image_resolution {
        config.image_resolution = resolution;
    }
    if let Some(threshold) = cli.failure_threshold {
        config.failure_threshold = threshold;
    }
    if cli.verbose_errors {
        config.verbose_errors = true;
    }
    Ok(config)
}

fn print_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}harvest summary{reset}");
    println!("{green}  languages:    {}{reset}", summary.languages);
    println!("{green}  simulations:  {}{reset}", summary.simulations);
    if summary.failed_downloads > 0 {
        println!(
            "{yellow}  failed downloads (evicted): {}{reset}",
            summary.failed_downloads
        );
    }
    if !summary.fallback_languages.is_empty() {
        println!(
            "{yellow}  english-fallback taxonomy: {}{reset}",
            summary.fallback_languages.join(", ")
        );
    }
    for archive in &summary.archives {
        println!("{cyan}  + {archive}{reset}");
    }
}
