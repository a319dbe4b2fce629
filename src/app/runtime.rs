use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use drive_core::config::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use drive_core::remote::DEFAULT_BASE_URL;
use drive_core::{
    CancelFlag, DownloadListener, DownloadOrchestrator, DownloadRequest, DriveClient, RunOutcome,
    parse_link,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{config_runtime, credentials, exit_handler, progress_display, terminal};
use crate::app_config;

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();

    let loaded = app_config::load_default_file_config()?;
    let file_config = loaded.config.as_ref();
    let args = config_runtime::apply_config_defaults(cli, &cli_sources, file_config)?;

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    if let Some(path) = loaded.path.as_deref() {
        debug!(path = %path.display(), loaded = file_config.is_some(), "Config file");
    }
    info!("Downloader starting");

    let cancel = CancelFlag::new();
    let mut request =
        DownloadRequest::new(args.link.clone(), args.name.clone().unwrap_or_default())
            .with_excluded_extensions(args.exclude.iter())
            .with_cancel_flag(cancel.clone());
    if let Some(user_id) = args.user_id.clone() {
        request = request.with_user_id(user_id);
    }
    let request = Arc::new(request);
    let parsed = parse_link(request.link())
        .with_context(|| format!("Invalid link '{}'", request.link()))?;
    debug!(object_id = %parsed.object_id, hint = ?parsed.auth_hint, "Link parsed");

    let service_accounts = match args.service_account_dir.as_deref() {
        Some(dir) => credentials::load_service_accounts(dir)?,
        None => Vec::new(),
    };
    let primary = credentials::resolve_primary(
        args.token.as_deref(),
        parsed.auth_hint,
        args.user_token_dir.as_deref(),
        request.user_id(),
    )?;
    let pool = credentials::build_pool(
        primary,
        service_accounts,
        parsed.auth_hint,
        args.use_service_accounts,
        args.max_rotations,
    )?;

    let base_url = args.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let client = DriveClient::with_timeouts(base_url, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
        .context("Failed to build HTTP client")?;
    let engine_config = config_runtime::build_engine_config(&args, file_config);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current chunk");
            cancel.cancel();
        }
    });

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let listener = Arc::new(progress_display::CliListener::new(use_spinner));

    let destination = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut orchestrator = DownloadOrchestrator::new(
        Arc::new(client),
        pool,
        engine_config,
        Arc::clone(&request),
        Arc::clone(&listener) as Arc<dyn DownloadListener>,
    );
    let outcome = orchestrator.run(&parsed.object_id, &destination).await;
    listener.finish();

    match &outcome {
        RunOutcome::Completed => {
            if !args.quiet {
                println!("{}", destination.join(request.name()).display());
            }
        }
        RunOutcome::Cancelled => eprintln!("Download cancelled"),
        RunOutcome::Failed { message, .. } => eprintln!("error: {message}"),
    }
    Ok(exit_handler::determine_exit_outcome(&outcome))
}
