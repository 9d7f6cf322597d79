use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use spg_core::InstallerConfig;
use spg_installer::cli::Cli;
use spg_installer::logging;
use spg_installer::orchestrator::{InstallOptions, InstallReport, Orchestrator};
use spg_installer::prompt::{AutoAnswer, ConsolePrompt, Prompt};
use spg_platform::{InstallPaths, SystemDesktop};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match InstallerConfig::load(path) {
            Ok(config) => config,
            Err(failure) => {
                logging::init_logging(None, cli.verbose);
                error!("{failure}");
                return ExitCode::FAILURE;
            }
        },
        None => InstallerConfig::default(),
    };
    if cli.token.is_some() {
        config.token.clone_from(&cli.token);
    }

    let paths = match resolve_paths(&cli, &config) {
        Ok(paths) => paths,
        Err(message) => {
            logging::init_logging(None, cli.verbose);
            error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let log_file = paths.log_file();
    let log_path = paths.ensure_install_dir().ok().map(|_| log_file.as_path());
    logging::init_logging(log_path, cli.verbose);

    let options = InstallOptions {
        mode: cli.mode,
        release_type: cli.release_type.into(),
        verification: cli.verification(),
        source_dir: cli.source.clone().unwrap_or_else(installer_dir),
        zip: cli.zip.clone(),
    };

    let prompt: Box<dyn Prompt> = if cli.yes {
        Box::new(AutoAnswer(true))
    } else {
        Box::new(ConsolePrompt)
    };
    let desktop = SystemDesktop;

    let report = Orchestrator::new(&config, &paths, &desktop, prompt.as_ref())
        .run(&options)
        .await;
    print_summary(&report);

    ExitCode::from(report.exit_code())
}

fn resolve_paths(cli: &Cli, config: &InstallerConfig) -> Result<InstallPaths, String> {
    let mut paths = InstallPaths::new(&config.app_slug).map_err(|error| error.to_string())?;
    if let Some(install_dir) = &cli.install_dir {
        paths.install_dir.clone_from(install_dir);
    }
    Ok(paths)
}

fn installer_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_summary(report: &InstallReport) {
    info!("---- Installation summary ----");
    if report.mode == report.requested_mode {
        info!("Mode:          {}", report.mode);
    } else {
        info!("Mode:          {} (requested {})", report.mode, report.requested_mode);
    }
    if let Some(tag) = &report.release_tag {
        info!("Release:       {tag}");
    }
    if let Some(status) = report.hash_status {
        info!("Verification:  {status}");
    }
    info!("Install dir:   {}", report.install_dir.display());
    info!("Files placed:  {}", report.placed.len());
    for warning in &report.warnings {
        info!("Warning:       {warning}");
    }
    match &report.error {
        None => info!("Result:        installed"),
        Some(failure) => info!("Result:        failed ({})", failure.kind()),
    }
}
