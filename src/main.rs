//! kube-ensure CLI entrypoint.
//!
//! This is the main entrypoint for the kube-ensure command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use kube_ensure::cli::{Cli, Commands, OutputFormatter};
use kube_ensure::config::{find_config_file, ConfigParser, ConfigValidator, EnsureConfig};
use kube_ensure::error::Result;
use kube_ensure::kubectl::KubectlClient;
use kube_ensure::reconciler::Reconciler;
use kube_ensure::watch::{ConditionWatcher, WaitReport};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let cancel = shutdown_token();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Render { name } => cmd_render(cli.config.as_ref(), name.as_deref(), &formatter),
        Commands::Diff { name, exit_code } => {
            cmd_diff(cli.config.as_ref(), name.as_deref(), exit_code, &formatter, &cancel).await
        }
        Commands::Apply {
            name,
            yes,
            continue_on_error,
        } => {
            cmd_apply(
                cli.config.as_ref(),
                name.as_deref(),
                yes,
                continue_on_error,
                &formatter,
                &cancel,
            )
            .await
        }
        Commands::Await { name } => {
            cmd_await(cli.config.as_ref(), name.as_deref(), &formatter, &cancel).await
        }
    }
}

/// Returns a token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, stopping running commands");
                trigger.cancel();
            }
            Err(e) => debug!("Cannot listen for Ctrl-C: {e}"),
        }
    });
    token
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;

    emit(&formatter.format_validation(&config, &result, show_warnings))
}

/// Print rendered manifests.
fn cmd_render(
    config_path: Option<&PathBuf>,
    name: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, client) = load_config(config_path)?;

    let manifests = config
        .select_resources(name)?
        .iter()
        .map(|descriptor| {
            client
                .materializer()
                .render(descriptor)
                .map(|manifest| (descriptor.describe(), manifest))
        })
        .collect::<Result<Vec<_>>>()?;

    emit(&formatter.format_manifests(&manifests))
}

/// Check for drift.
async fn cmd_diff(
    config_path: Option<&PathBuf>,
    name: Option<&str>,
    fail_on_drift: bool,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let (config, client) = load_config(config_path)?;
    let resources = config.select_resources(name)?;

    let report = Reconciler::new(&client).check_drift(&resources, cancel).await?;
    emit(&formatter.format_drift(&report))?;

    if fail_on_drift {
        report.ensure_converged()?;
    }
    Ok(())
}

/// Converge drifted resources.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    name: Option<&str>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let (config, client) = load_config(config_path)?;
    let resources = config.select_resources(name)?;
    let reconciler = Reconciler::new(&client).with_continue_on_error(continue_on_error);

    if !auto_approve {
        let report = reconciler.check_drift(&resources, cancel).await?;
        if report.is_converged() {
            eprintln!("No changes to apply.");
            return Ok(());
        }

        eprintln!("{}", formatter.format_drift(&report));
        eprint!("Do you want to converge these resources? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
    }

    let result = reconciler.reconcile(&resources, cancel).await?;
    emit(&formatter.format_reconciliation(&result))
}

/// Wait for configured conditions.
async fn cmd_await(
    config_path: Option<&PathBuf>,
    name: Option<&str>,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let (config, client) = load_config(config_path)?;
    let waits = config.select_waits(name)?;
    let watcher = ConditionWatcher::new(&client);

    let mut reports = Vec::with_capacity(waits.len());
    let mut failure = None;
    for wait in &waits {
        let outcome = watcher.watch(wait, cancel).await?;
        reports.push(WaitReport::new(wait, outcome));
        if let Err(e) = outcome.into_result(wait) {
            failure = Some(e);
            break;
        }
    }

    emit(&formatter.format_waits(&reports))?;
    failure.map_or(Ok(()), Err)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Returns the directory relative paths in the configuration resolve against.
fn config_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Loads and validates configuration, and builds the tool client.
fn load_config(config_path: Option<&PathBuf>) -> Result<(EnsureConfig, KubectlClient)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    let client = KubectlClient::from_config(&config.tool, base);
    Ok((config, client))
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
