//! OncoVision - command-line shell for the OncoVision clinical API.
//!
//! Signs in against the API, keeps the session alive and exposes the
//! patient, clinical case, imaging and report calls as subcommands.

mod commands;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use oncovision_core::api::OncoVisionApi;
use oncovision_core::config::ENV_API_URL;
use oncovision_core::{ApiError, Config, SessionController};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{auth, cases, patients, Context};

/// Log file name used when `--log-file` points at a directory
const DEFAULT_LOG_FILE: &str = "oncovision.log";

/// OncoVision clinical case client
#[derive(Parser)]
#[command(name = "oncovision")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (default: from config, http://127.0.0.1:8080)
    #[arg(long, global = true, env = ENV_API_URL)]
    pub api_url: Option<String>,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login(auth::LoginArgs),

    /// Discard the stored session
    Logout,

    /// Show who is signed in and where the session is stored
    Status,

    /// Hold the session open, renewing the access token until Ctrl-C
    Keepalive,

    /// List patients
    Patients(patients::PatientsArgs),

    /// Show a patient and their clinical cases
    Patient(patients::PatientArgs),

    /// Register a patient
    AddPatient(patients::AddPatientArgs),

    /// List clinical cases
    Cases(cases::CasesArgs),

    /// Open a clinical case for a patient
    AddCase(cases::AddCaseArgs),

    /// Show a clinical case with its images and nodules
    Case(cases::CaseArgs),

    /// Upload tomography images to a case
    Upload(cases::UploadArgs),

    /// Move images to `ready` or `processing`
    SetState(cases::SetStateArgs),

    /// Delete images
    DeleteImages(cases::DeleteImagesArgs),

    /// Download the PDF report of a case
    Report(cases::ReportArgs),
}

/// Initialize the tracing subscriber for logging.
///
/// Console output goes to stderr so it never mixes with `--json` output.
/// The returned guard must live until exit or buffered file lines are lost.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if verbose {
        "oncovision=debug,oncovision_core=debug,warn"
    } else {
        "warn"
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter()))
        .with(file_layer)
        .init();

    guard
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    if path.is_dir() {
        return (path.to_path_buf(), PathBuf::from(DEFAULT_LOG_FILE));
    }
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    (dir, name)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    info!(api = %config.api_base_url, backend = ?config.credential_backend, "OncoVision starting");

    let store = config.credential_store()?;
    let session = SessionController::new(config.auth_settings()?, store)
        .context("Failed to set up the API session")?;
    let api = OncoVisionApi::new(session.client());

    let mut ctx = Context {
        config,
        session,
        api,
        json_output: cli.json,
    };
    let mut events = ctx.session.subscribe();

    let result = match cli.command {
        Commands::Login(args) => auth::login(args, &mut ctx).await,
        Commands::Logout => auth::logout(&ctx),
        Commands::Status => auth::status(&ctx),
        Commands::Keepalive => auth::keepalive(&ctx).await,
        Commands::Patients(args) => patients::list(args, &ctx).await,
        Commands::Patient(args) => patients::show(args, &ctx).await,
        Commands::AddPatient(args) => patients::add(args, &ctx).await,
        Commands::Cases(args) => cases::list(args, &ctx).await,
        Commands::AddCase(args) => cases::add(args, &ctx).await,
        Commands::Case(args) => cases::show(args, &ctx).await,
        Commands::Upload(args) => cases::upload(args, &ctx).await,
        Commands::SetState(args) => cases::set_state(args, &ctx).await,
        Commands::DeleteImages(args) => cases::delete_images(args, &ctx).await,
        Commands::Report(args) => cases::report(args, &ctx).await,
    };

    if let Some(reason) = commands::login_required(&mut events) {
        eprintln!("{}", commands::login_required_message(reason));
    }
    debug!("OncoVision shutting down");
    result
}

fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
    let bad_credentials = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ApiError>())
        .any(|e| matches!(e, ApiError::CredentialsRejected { .. }));
    if bad_credentials {
        eprintln!("Check the username and password and try again.");
    }
}
