//! Reference scheduler: ticks a sequencer at its poll period and feeds it
//! operator commands.
//!
//! Commands arrive over a crossbeam channel from a reader thread that never
//! touches the driver. A rejected command (wrong state, animal not at the
//! start arm) is logged and the session continues; a device error ends it.

use crate::error::{MazeError, Result};
use crate::status::SessionStatus;
use crossbeam_channel::{Receiver, TryRecvError};
use plusmaze_traits::Clock;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    Open,
    Rewind,
    Finish,
    Pause,
    Resume,
    Stop,
}

impl OperatorCommand {
    pub const fn name(self) -> &'static str {
        match self {
            OperatorCommand::Start => "start",
            OperatorCommand::Open => "open",
            OperatorCommand::Rewind => "rewind",
            OperatorCommand::Finish => "finish",
            OperatorCommand::Pause => "pause",
            OperatorCommand::Resume => "resume",
            OperatorCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(OperatorCommand::Start),
            "open" | "o" => Ok(OperatorCommand::Open),
            "rewind" | "r" => Ok(OperatorCommand::Rewind),
            "finish" | "f" => Ok(OperatorCommand::Finish),
            "pause" | "p" => Ok(OperatorCommand::Pause),
            "resume" => Ok(OperatorCommand::Resume),
            "stop" | "quit" | "q" => Ok(OperatorCommand::Stop),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// A state machine advanced by an external scheduler.
pub trait Sequencer {
    fn tick(&mut self) -> Result<SessionStatus>;

    /// Apply one operator command. `Stop` is handled by the runner.
    fn apply(&mut self, cmd: OperatorCommand) -> Result<()>;

    /// Period until the next tick; depends on the current state.
    fn poll_period(&self) -> Duration;

    fn is_finished(&self) -> bool;

    /// Command an operator would issue next, for unattended runs.
    fn auto_command(&self) -> Option<OperatorCommand> {
        None
    }
}

/// Why `drive` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    /// Operator sent `stop`.
    Stopped,
    /// Shutdown flag raised (Ctrl-C).
    Interrupted,
}

fn is_device_error(e: &eyre::Report) -> bool {
    matches!(e.downcast_ref::<MazeError>(), Some(MazeError::Device(_)))
}

fn apply_logged<S: Sequencer + ?Sized>(seq: &mut S, cmd: OperatorCommand) -> Result<()> {
    match seq.apply(cmd) {
        Ok(()) => {
            tracing::debug!(%cmd, "command applied");
            Ok(())
        }
        Err(e) if is_device_error(&e) => Err(e),
        Err(e) => {
            tracing::warn!(%cmd, error = %e, "command rejected");
            Ok(())
        }
    }
}

/// Run `seq` until it finishes, the operator stops it, or `shutdown` is set.
///
/// With `auto`, the sequencer's next expected command is issued each tick.
pub fn drive<S: Sequencer + ?Sized>(
    seq: &mut S,
    clock: &dyn Clock,
    commands: &Receiver<OperatorCommand>,
    shutdown: &AtomicBool,
    auto: bool,
) -> Result<RunOutcome> {
    let mut last_status = None;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!("shutdown requested");
            return Ok(RunOutcome::Interrupted);
        }

        loop {
            match commands.try_recv() {
                Ok(OperatorCommand::Stop) => {
                    tracing::info!("stopped by operator");
                    return Ok(RunOutcome::Stopped);
                }
                Ok(cmd) => apply_logged(seq, cmd)?,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if auto && let Some(cmd) = seq.auto_command() {
            apply_logged(seq, cmd)?;
        }

        let status = seq.tick()?;
        if last_status != Some(status) {
            tracing::debug!(?status, "session status");
            last_status = Some(status);
        }
        if seq.is_finished() {
            return Ok(RunOutcome::Finished);
        }
        clock.sleep(seq.poll_period());
    }
}
