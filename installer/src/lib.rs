// Platform Setup installation wizard
// Main library entry point

pub mod api;
pub mod checkers;
pub mod config;
pub mod i18n;
pub mod installation;
pub mod models;
pub mod persistence;
pub mod security;
pub mod tui;
pub mod utils;
pub mod wizard;

use crate::api::routes::Router;
use crate::api::{Request, Response};
use crate::checkers::database::ConnectionDatabaseChecker;
use crate::checkers::mailing::SmtpMailingChecker;
use crate::checkers::requirements::SettingChecker;
use crate::checkers::DatabaseChecker;
use crate::config::InstallerConfig;
use crate::installation::procedure::ProcedureInstaller;
use crate::installation::status::InstallStatusReporter;
use crate::persistence::session_store::FileSessionStore;
use crate::persistence::writer::TomlParametersWriter;
use crate::security::secret_protector::{default_key_path, SecretProtector};
use crate::wizard::controller::{Collaborators, StepController};
use anyhow::Context;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(log_dir: &Path, with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("installer-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("installer-{}.txt", timestamp));

    // stdout stays off in terminal mode so the UI is not corrupted.
    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Wire the default collaborators described by `config` into a router.
pub async fn build_router(config: &InstallerConfig) -> anyhow::Result<Arc<Router>> {
    let app_dir = config.app_dir()?;
    let logs_dir = config.logs_dir()?;
    let parameters_path = config.parameters_path()?;
    let session_path = config.session_path()?;
    let config_dir = parameters_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| app_dir.join("config"));

    info!(
        "[PHASE: initialization] [STEP: wiring] app_dir={:?}, logs_dir={:?}, parameters={:?}, session={:?}",
        app_dir, logs_dir, parameters_path, session_path
    );

    let protector = Arc::new(SecretProtector::new(default_key_path(&parameters_path)));
    let database_checker: Arc<dyn DatabaseChecker> = Arc::new(ConnectionDatabaseChecker::new());
    let installer = ProcedureInstaller::new(
        logs_dir.clone(),
        parameters_path.clone(),
        app_dir.clone(),
        database_checker.clone(),
    )
    .with_commands(
        config.post_install_commands.clone(),
        config.command_timeout(),
    )
    .with_database_timeout(config.database_check_timeout());
    let store = Arc::new(FileSessionStore::new(session_path, protector.clone()));

    let collaborators = Collaborators {
        requirement_checker: Arc::new(SettingChecker::new(
            app_dir,
            logs_dir.clone(),
            config_dir,
        )),
        database_checker,
        mailing_checker: Arc::new(SmtpMailingChecker::default()),
        installer: Arc::new(installer),
        parameters_writer: Arc::new(TomlParametersWriter::new(parameters_path, protector)),
        transport_session: store.clone(),
    };
    let controller = StepController::new(collaborators, InstallStatusReporter::new(logs_dir))
        .with_timeouts(
            config.database_check_timeout(),
            config.mailing_check_timeout(),
        )
        .with_defaults(&config.default_language, &config.default_country);

    let router = Router::open(controller, store, &config.base_path, &config.success_path).await;
    Ok(Arc::new(router))
}

/// Load configuration and start logging; exits the process when either is unusable.
fn bootstrap(with_stdout: bool) -> (InstallerConfig, tokio::runtime::Runtime) {
    let config = match InstallerConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Installer configuration error: {}", e);
            std::process::exit(2);
        }
    };

    match config.logs_dir() {
        Ok(dir) => {
            if let Err(e) = init_logging(&dir, with_stdout) {
                eprintln!("Failed to initialize logging: {}", e);
            }
        }
        Err(e) => eprintln!("Failed to resolve log folder: {}", e),
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    (config, runtime)
}

fn open_router(config: &InstallerConfig, runtime: &tokio::runtime::Runtime) -> Arc<Router> {
    match runtime
        .block_on(build_router(config))
        .context("Failed to prepare the installer")
    {
        Ok(router) => router,
        Err(e) => {
            error!("[PHASE: initialization] [STEP: fatal] {:#}", e);
            eprintln!("Installer error: {:#}", e);
            std::process::exit(1);
        }
    }
}

pub fn run_tui() {
    let (config, runtime) = bootstrap(false);
    info!(
        "[PHASE: initialization] Headless TUI installer starting at {}",
        chrono::Utc::now()
    );

    let router = open_router(&config, &runtime);
    if let Err(e) = tui::run(router, runtime.handle().clone()) {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("Installer error: {}", e);
        std::process::exit(1);
    }
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame of a route and exits.
pub fn run_tui_smoke(target: Option<String>) {
    let (config, runtime) = bootstrap(false);
    info!(
        "[PHASE: initialization] Headless TUI smoke starting at {}",
        chrono::Utc::now()
    );

    let router = open_router(&config, &runtime);
    let target = target.as_deref().unwrap_or("welcome");
    if let Err(e) = tui::smoke(router, runtime.handle().clone(), target) {
        error!(
            "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
            e
        );
        eprintln!("Installer error: {}", e);
        std::process::exit(1);
    }
}

/// Print the install status JSON (latest log, or the given timestamp).
/// Exit code 0 on success, 1 otherwise.
pub fn run_install_status(timestamp: Option<String>) {
    let (config, runtime) = bootstrap(false);
    let router = open_router(&config, &runtime);

    let route = match &timestamp {
        Some(ts) => format!("/install/status/{}", ts),
        None => "/install/status".to_string(),
    };
    let response = runtime.block_on(router.handle(Request::get(router.url(&route))));
    match response {
        Response::Json { status, body } => {
            println!("{}", body);
            if status != 200 {
                std::process::exit(1);
            }
        }
        other => {
            eprintln!("Unexpected response: {:?}", other);
            std::process::exit(1);
        }
    }
}
