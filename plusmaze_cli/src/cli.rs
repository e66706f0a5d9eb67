//! CLI argument definitions and shared statics.

use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use plusmaze_core::monitor::AutoReward;
use plusmaze_core::{DoseTarget, RotationCommand, Turn};
use plusmaze_traits::Arm;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "plusmaze", version, about = "Plus-maze rig controller")]
pub struct Cli {
    /// Path to the device profile TOML
    #[arg(long, value_name = "FILE", default_value = "etc/plusmaze.toml")]
    pub config: PathBuf,

    /// Optional gate calibration CSV (strict header: arm,closed,open)
    #[arg(long, value_name = "FILE")]
    pub gate_calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a session of operator-paced trials from a trial file
    Trials {
        /// Trial definitions, one `<start> <goal>` per line
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Result file; licks go next to it as `<stem>-lick<ext>`
        #[arg(long, value_name = "FILE")]
        output: PathBuf,
        /// Arm the center block currently faces
        #[arg(long, value_name = "ARM", default_value = "west")]
        block: Arm,
        /// Issue start/open/finish automatically instead of reading stdin
        #[arg(long, action = ArgAction::SetTrue)]
        auto: bool,
    },
    /// Continuous egocentric training
    Train {
        /// Turn that earns a reward
        #[arg(long, value_name = "left|right")]
        turn: Turn,
        /// Number of arm entries to run
        #[arg(long, value_name = "N")]
        trials: usize,
        /// Arm the animal starts in
        #[arg(long, value_name = "ARM", default_value = "west")]
        from: Arm,
        /// Result file
        #[arg(long, value_name = "FILE")]
        output: PathBuf,
        /// Start without waiting for the operator
        #[arg(long, action = ArgAction::SetTrue)]
        auto: bool,
    },
    /// Follow the animal between sessions
    Monitor {
        /// Which entries are rewarded (off, every-arm, right, left)
        #[arg(long, value_name = "POLICY", default_value = "off")]
        autoreward: AutoReward,
        /// Rotate the block back into a T after every turn
        #[arg(long, action = ArgAction::SetTrue)]
        maintain_t_maze: bool,
        /// Stop after this long; runs until `stop` otherwise
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Open or close one gate
    #[command(group(ArgGroup::new("position").required(true).args(["closed", "open"])))]
    Gate {
        #[arg(long, value_name = "ARM")]
        arm: Arm,
        #[arg(long, action = ArgAction::SetTrue)]
        closed: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        open: bool,
    },
    /// Fire one dose at an arm, or at all of them
    Dose {
        #[arg(long, value_name = "ARM|all")]
        arm: DoseTarget,
    },
    /// Fire one rotation pulse (center-cw, center-ccw, maze-cw, maze-ccw)
    Rotate {
        #[arg(value_name = "CMD")]
        command: RotationCommand,
    },
    /// Quick health check (profile valid, board answering)
    SelfCheck,
}
