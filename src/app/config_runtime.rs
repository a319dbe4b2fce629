use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use drive_core::{EngineConfig, RetryPolicy};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::Args;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) chunk_size_mib: bool,
    pub(crate) service_account_dir: bool,
    pub(crate) use_service_accounts: bool,
    pub(crate) max_rotations: bool,
    pub(crate) exclude: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let command = Args::command();
    let matches = command.get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = sources_from_matches(&matches);
    (args, sources)
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        output_dir: is_commandline_value(matches, "output_dir"),
        chunk_size_mib: is_commandline_value(matches, "chunk_size_mib"),
        service_account_dir: is_commandline_value(matches, "service_account_dir"),
        use_service_accounts: is_commandline_value(matches, "use_service_accounts"),
        max_rotations: is_commandline_value(matches, "max_rotations"),
        exclude: is_commandline_value(matches, "exclude"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills values the user did not pass on the command line from the config file.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<Args> {
    if let Some(file_config) = file_config {
        if !cli_sources.output_dir
            && args.output_dir.is_none()
            && let Some(output_dir) = &file_config.output_dir
        {
            args.output_dir = Some(output_dir.clone());
        }

        if !cli_sources.chunk_size_mib
            && let Some(chunk_size_mib) = file_config.chunk_size_mib
        {
            args.chunk_size_mib = chunk_size_mib;
        }

        if !cli_sources.service_account_dir
            && args.service_account_dir.is_none()
            && let Some(dir) = &file_config.service_account_dir
        {
            args.service_account_dir = Some(dir.clone());
        }

        if !cli_sources.use_service_accounts
            && let Some(use_service_accounts) = file_config.use_service_accounts
        {
            args.use_service_accounts = use_service_accounts;
        }

        if !cli_sources.max_rotations
            && args.max_rotations.is_none()
            && let Some(max_rotations) = file_config.max_rotations
        {
            args.max_rotations = Some(max_rotations);
        }

        if !cli_sources.exclude
            && args.exclude.is_empty()
            && let Some(extensions) = &file_config.excluded_extensions
        {
            args.exclude.clone_from(extensions);
        }

        if !cli_sources.verbose
            && !cli_sources.quiet
            && let Some(verbosity) = file_config.verbosity
        {
            apply_config_verbosity(&mut args, verbosity);
        }
    }

    if !(1..=1024).contains(&args.chunk_size_mib) {
        bail!(
            "Invalid effective chunk_size_mib value: {}. Expected range: 1..=1024",
            args.chunk_size_mib
        );
    }

    Ok(args)
}

fn apply_config_verbosity(args: &mut Args, verbosity: VerbositySetting) {
    match verbosity {
        VerbositySetting::Default => {
            args.quiet = false;
            args.verbose = 0;
        }
        VerbositySetting::Verbose => {
            args.quiet = false;
            args.verbose = 1;
        }
        VerbositySetting::Quiet => {
            args.quiet = true;
            args.verbose = 0;
        }
        VerbositySetting::Debug => {
            args.quiet = false;
            args.verbose = 2;
        }
    }
}

/// Builds the engine configuration from effective arguments and file-only settings.
pub(crate) fn build_engine_config(args: &Args, file_config: Option<&FileConfig>) -> EngineConfig {
    let mut config = EngineConfig::default().with_chunk_size(args.chunk_size_mib * 1024 * 1024);
    let Some(file_config) = file_config else {
        return config;
    };
    if let Some(retries) = file_config.transient_retries {
        config = config.with_transient_retry_limit(retries);
    }
    if let Some(max_attempts) = file_config.max_attempts {
        config = config.with_retry_policy(RetryPolicy::with_max_attempts(max_attempts));
    }
    if let Some(interval_ms) = file_config.progress_interval_ms {
        config = config.with_progress_interval(Duration::from_millis(interval_ms));
    }
    config
}

pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}
