//! Continuous egocentric training.
//!
//! The animal runs freely through a T formed by the center block. Every arm
//! entry is one trial: the turn is classified, rewarded when it matches the
//! target, and compensated by rotating the block so the next entry sees a
//! fresh T. A missed detection pauses the session until the operator puts
//! the animal back.

use crate::classifier::classify;
use crate::driver::MazeDriver;
use crate::error::{MazeError, Result};
use crate::log::{TrainingLog, TrainingRecord, TrainingStats};
use crate::runner::{OperatorCommand, Sequencer};
use crate::status::SessionStatus;
use crate::types::{DoseTarget, Turn};
use plusmaze_traits::Arm;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingConfig {
    /// Turn that earns a reward.
    pub target: Turn,
    pub trials: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    Running,
    /// Waiting for the animal to be put back at `replace_at`.
    Paused { replace_at: Arm },
    Finished,
}

fn rejected(cmd: &str, state: TrainingState) -> eyre::Report {
    eyre::Report::new(MazeError::State(format!("cannot {cmd} while {state:?}")))
}

#[derive(Debug)]
pub struct ContinuousTrainingSequencer {
    driver: MazeDriver,
    config: TrainingConfig,
    state: TrainingState,
    // Last confirmed arm
    position: Arm,
    trial_index: usize,
    trial_origin: Option<Instant>,
    log: TrainingLog,
}

impl ContinuousTrainingSequencer {
    /// Closes the gate at `initial` so the animal waits there until `start`.
    pub fn new(mut driver: MazeDriver, config: TrainingConfig, initial: Arm) -> Result<Self> {
        if config.trials == 0 {
            return Err(eyre::Report::new(MazeError::Config(
                "training needs at least one trial".into(),
            )));
        }
        driver.actuate_gate(initial, true)?;
        Ok(Self {
            driver,
            config,
            state: TrainingState::Idle,
            position: initial,
            trial_index: 0,
            trial_origin: None,
            log: TrainingLog::default(),
        })
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn position(&self) -> Arm {
        self.position
    }

    pub fn stats(&self) -> TrainingStats {
        self.log.stats()
    }

    pub fn log(&self) -> &TrainingLog {
        &self.log
    }

    pub fn into_driver(self) -> MazeDriver {
        self.driver
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != TrainingState::Idle {
            return Err(rejected("start", self.state));
        }
        self.driver.actuate_gate(self.position, false)?;
        self.trial_index = 1;
        self.log.set_trial_index(1);
        self.trial_origin = Some(self.driver.now());
        self.state = TrainingState::Running;
        tracing::info!(
            target_turn = %self.config.target,
            trials = self.config.trials,
            from = %self.position,
            "training started"
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != TrainingState::Running {
            return Err(rejected("pause", self.state));
        }
        self.state = TrainingState::Paused {
            replace_at: self.position,
        };
        tracing::info!("training paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let TrainingState::Paused { replace_at } = self.state else {
            return Err(rejected("resume", self.state));
        };
        self.state = TrainingState::Running;
        tracing::info!(from = %replace_at, "training resumed");
        Ok(())
    }

    pub fn tick(&mut self) -> Result<SessionStatus> {
        match self.state {
            TrainingState::Idle => return Ok(SessionStatus::AwaitingOperator),
            TrainingState::Paused { .. } => return Ok(SessionStatus::Paused),
            TrainingState::Finished => return Ok(SessionStatus::Complete),
            TrainingState::Running => {}
        }

        let arm = self.driver.last_detected_arm()?;
        if arm == self.position {
            return Ok(SessionStatus::Running);
        }
        tracing::info!(
            trial = self.trial_index,
            of = self.config.trials,
            %arm,
            "animal detected"
        );

        let turn = match classify(self.position, arm) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    replace_at = %self.position,
                    "did the animal jump over the block? pausing; put it back before resuming"
                );
                self.state = TrainingState::Paused {
                    replace_at: self.position,
                };
                return Ok(SessionStatus::Paused);
            }
        };

        tracing::info!(%turn, "turn executed");
        if turn == self.config.target {
            tracing::info!(%turn, "reward");
            self.driver.dose(DoseTarget::Arm(arm))?;
        }
        self.driver.compensate_turn(turn)?;

        let now = self.driver.now();
        let elapsed = self
            .trial_origin
            .map_or(Duration::ZERO, |t0| now.saturating_duration_since(t0));
        self.log.push(TrainingRecord {
            from: self.position,
            to: arm,
            turn,
            elapsed,
        });
        let stats = self.log.stats();
        tracing::info!(
            left = stats.left,
            right = stats.right,
            total = stats.total,
            "training stats"
        );

        if self.trial_index >= self.config.trials {
            self.driver.actuate_gate(arm, true)?;
            self.state = TrainingState::Finished;
            tracing::info!("training complete");
        } else {
            self.trial_index += 1;
            self.log.set_trial_index(self.trial_index);
        }
        self.position = arm;
        self.trial_origin = Some(now);

        Ok(if self.state == TrainingState::Finished {
            SessionStatus::Complete
        } else {
            SessionStatus::Running
        })
    }

    /// Write one `from to turn time` line per trial.
    pub fn persist(&self, path: &Path) -> Result<()> {
        self.log.save(path)
    }
}

impl Sequencer for ContinuousTrainingSequencer {
    fn tick(&mut self) -> Result<SessionStatus> {
        ContinuousTrainingSequencer::tick(self)
    }

    fn apply(&mut self, cmd: OperatorCommand) -> Result<()> {
        match cmd {
            OperatorCommand::Start => self.start(),
            OperatorCommand::Pause => self.pause(),
            OperatorCommand::Resume => self.resume(),
            other => Err(eyre::Report::new(MazeError::State(format!(
                "'{other}' is not a training command"
            )))),
        }
    }

    fn poll_period(&self) -> Duration {
        self.driver.profile().timing.poll
    }

    fn is_finished(&self) -> bool {
        self.state == TrainingState::Finished
    }

    fn auto_command(&self) -> Option<OperatorCommand> {
        (self.state == TrainingState::Idle).then_some(OperatorCommand::Start)
    }
}
