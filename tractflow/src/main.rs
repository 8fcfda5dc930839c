use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use tractflow::cancellation::CancellationToken;
use tractflow::checkpoint::RunManifest;
use tractflow::config::{AtlasReference, RunConfiguration, Settings};
use tractflow::core::{CaseId, RegistrationMode, StageId};
use tractflow::errors::TractflowError;
use tractflow::observability::{init_logging, LogFormat};
use tractflow::paths::{detect_platform, PathPlanner};
use tractflow::pipeline::{
    clean_output, inspect_output, CleanupPolicy, PipelineBuilder, RunReport, StagePlanner,
    ValidationPolicy,
};
use tractflow::tools::ToolchainLocator;
use tractflow::utils::format_duration;

const EXIT_FAILED: u8 = 1;
const EXIT_ERROR: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

/// Resumable white-matter tract parcellation
#[derive(Parser)]
#[command(name = "tractflow", version)]
#[command(about = "Run the tract parcellation tool chain with checkpoints", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for thread ids)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a JSON settings file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Log line format (overrides the settings file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the pipeline for one tractography file
    Run {
        /// Input tractography (.vtk or .vtp)
        input: PathBuf,
        /// Output directory
        output: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        /// Continue past stages whose outputs do not verify
        #[arg(long)]
        keep_going: bool,
    },
    /// Show recorded and on-disk state of an output directory
    Status {
        /// Output directory
        output: PathBuf,
        #[command(flatten)]
        case: CaseArgs,
    },
    /// Print the output layout and the commands each stage would run
    Plan {
        /// Input tractography (.vtk or .vtp)
        input: PathBuf,
        /// Output directory
        output: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Remove intermediates from a finished output directory
    Clean {
        /// Output directory
        output: PathBuf,
        #[command(flatten)]
        case: CaseArgs,
        /// Remove registration outputs and every cluster folder's contents too
        #[arg(long)]
        discard_intermediates: bool,
        /// List what would be removed without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Registration mode: affine or affine+nonlinear
    #[arg(short, long, default_value = "affine")]
    mode: RegistrationMode,
    /// Worker threads (defaults to the settings file)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Remove registration outputs and every cluster folder's contents after measuring
    #[arg(long)]
    discard_intermediates: bool,
    /// Atlas bundle, or a folder containing one
    #[arg(long)]
    atlas: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CaseArgs {
    /// Case name, when the directory has no manifest
    #[arg(long)]
    case: Option<String>,
    /// Registration mode, when the directory has no manifest
    #[arg(short, long)]
    mode: Option<RegistrationMode>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let format = cli.log_format.unwrap_or(settings.log.format);
    init_logging(&settings.log.level, cli.verbose, format);

    debug!("tractflow started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            run,
            keep_going,
        } => run_pipeline(&settings, input, output, run, keep_going).await,
        Commands::Status { output, case } => show_status(&output, &case).map(|()| ExitCode::SUCCESS),
        Commands::Plan { input, output, run } => {
            show_plan(&settings, input, output, &run).map(|()| ExitCode::SUCCESS)
        }
        Commands::Clean {
            output,
            case,
            discard_intermediates,
            dry_run,
        } => clean(&output, &case, discard_intermediates, dry_run).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            if let Some(TractflowError::Cancelled(reason)) = e.downcast_ref::<TractflowError>() {
                warn!(%reason, "Run cancelled");
                eprintln!("Cancelled: {reason}");
                return ExitCode::from(EXIT_CANCELLED);
            }
            error!("Fatal error: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    Ok(settings.with_env_overrides()?)
}

fn configure(settings: &Settings, input: PathBuf, output: PathBuf, run: &RunArgs) -> anyhow::Result<RunConfiguration> {
    let threads = run.threads.unwrap_or(settings.threads);
    let config = RunConfiguration::new(input, output, run.mode, threads, !run.discard_intermediates)?
        .with_validation_policy(settings.validation_policy)
        .with_tool_timeout(settings.tool_timeout());
    Ok(config)
}

fn resolve_atlas(settings: &Settings, run: &RunArgs) -> anyhow::Result<AtlasReference> {
    let dir = match run.atlas.clone().or_else(|| settings.atlas_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the working directory")?,
    };
    AtlasReference::discover(&dir).with_context(|| format!("No usable atlas under {}", dir.display()))
}

async fn run_pipeline(
    settings: &Settings,
    input: PathBuf,
    output: PathBuf,
    run: RunArgs,
    keep_going: bool,
) -> anyhow::Result<ExitCode> {
    let mut config = configure(settings, input, output, &run)?;
    if keep_going {
        config = config.with_validation_policy(ValidationPolicy::WarnAndContinue);
    }
    let atlas = resolve_atlas(settings, &run)?;
    let locator = ToolchainLocator::resolve(settings, &detect_platform())?;

    let cancel = Arc::new(CancellationToken::new());
    let on_signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel("interrupted by user");
        }
    });

    let executor = PipelineBuilder::new(config, atlas, locator)
        .cancellation(cancel)
        .build()?;
    let report = executor.run().await?;
    print_report(&report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

fn print_report(report: &RunReport) {
    println!("Run {} for {} ({})", report.run_id, report.case, report.mode);
    for outcome in &report.stages {
        let mut line = format!(
            "  {:<28} {:<10} {:?}",
            outcome.stage.name(),
            outcome.status.to_string(),
            outcome.disposition
        );
        if outcome.executed() {
            line.push_str(&format!(
                "  {} invocation(s) in {}",
                outcome.invocations,
                format_duration(outcome.duration)
            ));
        }
        if let Some(error) = &outcome.error {
            line.push_str(&format!("  {error}"));
        }
        println!("{line}");
    }
    if let Some(cleanup) = &report.cleanup {
        println!("Removed {} intermediate path(s)", cleanup.removed.len());
    }
    println!("Anatomical tracts: {}", report.anatomical_tracts.len());
    for tract in &report.anatomical_tracts {
        println!("  {}", tract.display());
    }
    info!(
        duration = %format_duration(report.duration),
        success = report.is_success(),
        "Run finished"
    );
}

/// Planner for an existing output directory, from its manifest or the flags.
fn existing_planner(output: &Path, args: &CaseArgs) -> anyhow::Result<(PathPlanner, Option<RunManifest>)> {
    let manifest_path = output.join(tractflow::paths::MANIFEST_FILE_NAME);
    let manifest = RunManifest::load(&manifest_path)?;
    let (case, mode) = match (&manifest, &args.case) {
        (Some(m), _) => (m.case.clone(), m.mode),
        (None, Some(case)) => (CaseId::new(case.as_str())?, args.mode.unwrap_or_default()),
        (None, None) => bail!("{} has no manifest; pass --case", output.display()),
    };
    Ok((PathPlanner::new(output, case, mode), manifest))
}

fn show_status(output: &Path, args: &CaseArgs) -> anyhow::Result<()> {
    let (planner, _) = existing_planner(output, args)?;
    let (manifest, states) = inspect_output(&planner)?;

    match &manifest {
        Some(m) => println!(
            "Case {} ({}), run {}, {}, updated {}",
            m.case,
            m.mode,
            m.run_id,
            if m.is_finished() { "finished" } else { "in progress" },
            m.updated_at
        ),
        None => println!("Case {} ({}), no manifest", planner.case(), planner.mode()),
    }
    for state in states {
        let observed = if state.stage == StageId::Cleanup {
            "-".to_string()
        } else if state.checkpoint.is_complete() {
            "verified".to_string()
        } else {
            state.checkpoint.to_validation_error().actual
        };
        println!("  {:<28} {:<10} {observed}", state.stage.name(), state.recorded.to_string());
    }
    Ok(())
}

fn show_plan(settings: &Settings, input: PathBuf, output: PathBuf, run: &RunArgs) -> anyhow::Result<()> {
    let config = configure(settings, input, output, run)?;
    let atlas = resolve_atlas(settings, run)?;
    let locator = ToolchainLocator::resolve(settings, &detect_platform())?;
    let plans = StagePlanner::new(&config, atlas, Arc::new(locator));
    let paths = plans.paths();

    println!("Case {} ({})", paths.case(), paths.mode());
    for stage in StageId::ALL {
        println!("{} -> {}", stage.name(), paths.derive_path(stage).display());
        match plans.steps(stage) {
            Ok(steps) => {
                for step in steps {
                    println!("  {step}");
                }
            }
            Err(e) => println!("  unavailable: {e}"),
        }
    }
    Ok(())
}

fn clean(output: &Path, args: &CaseArgs, discard_intermediates: bool, dry_run: bool) -> anyhow::Result<()> {
    let (planner, manifest) = existing_planner(output, args)?;
    let policy = CleanupPolicy::new(!discard_intermediates);
    if dry_run {
        for path in policy.preview(&planner) {
            println!("would remove {}", path.display());
        }
        return Ok(());
    }

    let Some(mut manifest) = manifest else {
        bail!("{} has no manifest; nothing to clean", output.display());
    };
    match clean_output(&planner, &mut manifest, policy) {
        Some(report) => {
            manifest.save(&planner.manifest_path())?;
            for path in &report.removed {
                println!("removed {}", path.display());
            }
            for error in &report.errors {
                eprintln!("failed {error}");
            }
        }
        None => bail!("Measurements in {} are incomplete; refusing to clean", output.display()),
    }
    Ok(())
}
