//! Pterodactyl panel provisioner - Main entry point

use anyhow::Context;
use clap::Parser;
use panel_provisioner::cli::{Cli, Commands, InstallArgs, OnFailure};
use panel_provisioner::{
    process_guard, sanity, summary, CommandRunner, FailurePolicy, FixedPolicy, InstallOptions,
    Installer, PromptPolicy, RecordingRunner, SystemRunner,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize the logger; `RUST_LOG` overrides the verbosity flag.
fn init_logger(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 0)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    tracing::debug!("Panel provisioner {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Check { root } => {
            let report = sanity::verify_environment(&root);
            print!("{}", report.render_text());
            Ok(if report.is_ok() { 0 } else { 1 })
        }
        Commands::Install(args) => install(&args, cli.dry_run),
    }
}

fn failure_policy(args: &InstallArgs) -> Box<dyn FailurePolicy> {
    match args.on_failure {
        OnFailure::Prompt => Box::new(PromptPolicy::stdio(args.default_answer.into())),
        OnFailure::Continue => Box::new(FixedPolicy::always_continue()),
        OnFailure::Abort => Box::new(FixedPolicy::always_abort()),
    }
}

fn install(args: &InstallArgs, dry_run: bool) -> anyhow::Result<u8> {
    let input = args.config_input().context("failed to load configuration")?;

    let runner: Box<dyn CommandRunner> = if dry_run {
        Box::new(RecordingRunner::new())
    } else {
        Box::new(SystemRunner)
    };
    let options = InstallOptions {
        root: args.root.clone(),
        dry_run,
        skip_root_check: args.skip_root_check,
    };

    let installation = Installer::new(runner.as_ref(), options)
        .run(input, failure_policy(args))
        .context("installation did not start")?;

    if let Some(path) = &args.summary_file {
        summary::write_credentials(path, &installation.config, &installation.platform, &installation.report)
            .with_context(|| format!("failed to write credentials summary {}", path.display()))?;
    }
    if let Some(path) = &args.report_json {
        summary::write_report_json(path, &installation.config, &installation.platform, &installation.report)
            .with_context(|| format!("failed to write run report {}", path.display()))?;
    }

    println!();
    print!("{}", installation.report.render_text());
    if installation.report.exit_code() == 0 {
        println!("Panel available at {}", installation.config.app_url());
    }
    Ok(installation.report.exit_code())
}
