use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use derephit::app::{Pipeline, RunOptions};
use derephit::cluster::SkderEngine;
use derephit::config::{ConfigLoader, Overrides};
use derephit::error::DerepError;
use derephit::ncbi::NcbiDatasetsClient;
use derephit::report::print_summary;
use derephit::resolver::AccessionRule;
use derephit::store::Workspace;

#[derive(Parser)]
#[command(name = "derephit")]
#[command(about = "Dereplicate gene-cluster search hits by genome assembly similarity")]
#[command(version, author)]
struct Cli {
    /// The hit table produced by the upstream search tool.
    input: PathBuf,

    /// JSON config file (default: derephit.json in the current directory).
    #[arg(long)]
    config: Option<String>,

    /// Percent-identity cutoff for genome clustering, in (0, 100].
    #[arg(long)]
    cutoff: Option<f64>,

    /// Accessions acquired per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Working directory for per-accession scratch space.
    #[arg(long)]
    work_dir: Option<String>,

    /// Directory the cleaned table and reports are written to.
    #[arg(long)]
    output_dir: Option<String>,

    /// Shared genome cache directory (default: the user cache dir).
    #[arg(long)]
    cache_dir: Option<String>,

    /// Regex that extracts the genome accession from a subject identifier.
    #[arg(long)]
    accession_pattern: Option<String>,

    /// Re-fetch genomes even when they are cached.
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<DerepError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DerepError) -> u8 {
    match error {
        DerepError::InputNotFound(_)
        | DerepError::MalformedTable(_)
        | DerepError::ConfigRead(_)
        | DerepError::ConfigParse(_)
        | DerepError::InvalidCutoff(_)
        | DerepError::InvalidBatchSize
        | DerepError::InvalidAccessionPattern(_) => 2,
        DerepError::NcbiHttp(_)
        | DerepError::NcbiStatus { .. }
        | DerepError::MissingTool(_)
        | DerepError::ClusteringFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = ConfigLoader::resolve(
        cli.config.as_deref(),
        Overrides {
            identity_cutoff: cli.cutoff,
            batch_size: cli.batch_size,
            work_dir: cli.work_dir,
            output_dir: cli.output_dir,
            cache_dir: cli.cache_dir,
            accession_pattern: cli.accession_pattern,
        },
    )?;

    let workspace = match &settings.cache_dir {
        Some(cache_dir) => Workspace::with_roots(
            settings.work_dir.clone(),
            cache_dir.clone(),
            settings.output_dir.clone(),
        ),
        None => Workspace::new(settings.work_dir.clone(), settings.output_dir.clone())
            .into_diagnostic()?,
    };

    let source = NcbiDatasetsClient::new().into_diagnostic()?;
    let engine = SkderEngine::new();
    let rule = AccessionRule::new(&settings.accession_pattern).into_diagnostic()?;

    let pipeline = Pipeline::new(workspace, source, engine, rule);
    let outcome = pipeline.run(
        &cli.input,
        &RunOptions {
            identity_cutoff: settings.identity_cutoff,
            batch_size: settings.batch_size,
            force: cli.force,
            cancel: None,
        },
    )?;

    print_summary(&outcome.result.summary).into_diagnostic()?;
    Ok(())
}
