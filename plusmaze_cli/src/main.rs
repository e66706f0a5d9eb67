#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `plusmaze`: operator front end for the plus-maze rig.

mod cli;
mod error_fmt;
mod session;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use plusmaze_config::{Config, Logging, load_config, load_gate_calibration_csv};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console layer on stderr (stdout is kept for results), plus an optional
/// JSON file layer from the profile's `[logging]` section.
fn init_tracing(cli: &Cli, logging: Option<&Logging>) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console: BoxedLayer = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(logging) = logging
        && let Some(file) = logging.file.as_deref()
    {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name().unwrap_or(path.as_os_str());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = logging.level.as_deref().unwrap_or("info");
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(level))
                .boxed(),
        );
    }

    let _ = Registry::default().with(layers).try_init();
}

fn load(cli: &Cli) -> eyre::Result<Config> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(csv) = &cli.gate_calibration {
        let rows = load_gate_calibration_csv(csv)?;
        cfg.apply_gate_calibration(&rows);
        cfg.validate().wrap_err("config after gate calibration")?;
    }
    Ok(cfg)
}

fn install_shutdown_flag() -> eyre::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .wrap_err("install Ctrl-C handler")?;
    Ok(flag)
}

fn run(cli: &Cli, cfg: &Config) -> eyre::Result<session::Summary> {
    match &cli.cmd {
        Commands::Trials {
            file,
            output,
            block,
            auto,
        } => {
            let shutdown = install_shutdown_flag()?;
            session::run_trials(cfg, file, output, *block, *auto, &shutdown)
        }
        Commands::Train {
            turn,
            trials,
            from,
            output,
            auto,
        } => {
            let shutdown = install_shutdown_flag()?;
            session::run_training(cfg, *turn, *trials, *from, output, *auto, &shutdown)
        }
        Commands::Monitor {
            autoreward,
            maintain_t_maze,
            duration_ms,
        } => {
            let shutdown = install_shutdown_flag()?;
            session::run_monitor(
                cfg,
                *autoreward,
                *maintain_t_maze,
                duration_ms.map(Duration::from_millis),
                &shutdown,
            )
        }
        Commands::Gate { arm, closed, .. } => session::run_gate(cfg, *arm, *closed),
        Commands::Dose { arm } => session::run_dose(cfg, *arm),
        Commands::Rotate { command } => session::run_rotate(cfg, *command),
        Commands::SelfCheck => session::run_self_check(cfg),
    }
}

fn report(err: &eyre::Report) -> ! {
    if JSON_MODE.get().copied().unwrap_or(false) {
        println!("{}", format_error_json(err));
    } else {
        eprintln!("{}", humanize(err));
    }
    tracing::debug!(error = ?err, "command failed");
    std::process::exit(exit_code_for_error(err));
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg = load(&cli);
    init_tracing(&cli, cfg.as_ref().ok().map(|c| &c.logging));
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(e) => report(&e),
    };

    match run(&cli, &cfg) {
        Ok(summary) => {
            if cli.json {
                println!("{}", summary.json);
            } else {
                println!("{}", summary.human);
            }
        }
        Err(e) => report(&e),
    }
}
