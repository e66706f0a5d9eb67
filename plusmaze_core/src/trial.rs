//! Semi-automatic trial sequencing.
//!
//! Each trial walks
//! `AwaitingStart -> HoldingAtStart -> Running -> HoldingAtFinish -> ReadyForNext`.
//! The operator issues `start`, `open`, `finish` (and `rewind` to redo a
//! trial); holds and arm detection advance on `tick()`.

use crate::driver::MazeDriver;
use crate::error::{MazeError, Result};
use crate::log::{ExperimentLog, TrialRecord, lick_path, score_line};
use crate::reposition::BlockRepositioner;
use crate::runner::{OperatorCommand, Sequencer};
use crate::status::SessionStatus;
use crate::types::DoseTarget;
use crate::util::{fmt_elapsed, remaining};
use eyre::WrapErr;
use plusmaze_config::TrialDefinition;
use plusmaze_traits::Arm;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Idle,
    AwaitingStart,
    HoldingAtStart { since: Instant },
    Running,
    HoldingAtFinish { since: Instant },
    ReadyForNext,
    Complete,
}

impl TrialState {
    pub const fn name(&self) -> &'static str {
        match self {
            TrialState::Idle => "idle",
            TrialState::AwaitingStart => "awaiting start",
            TrialState::HoldingAtStart { .. } => "holding at start",
            TrialState::Running => "running",
            TrialState::HoldingAtFinish { .. } => "holding at finish",
            TrialState::ReadyForNext => "ready for next",
            TrialState::Complete => "complete",
        }
    }
}

fn rejected(cmd: &str, state: TrialState) -> eyre::Report {
    eyre::Report::new(MazeError::State(format!(
        "cannot {cmd} while {}",
        state.name()
    )))
}

#[derive(Debug)]
pub struct TrialSequencer {
    driver: MazeDriver,
    block: BlockRepositioner,
    log: ExperimentLog,
    index: usize,
    state: TrialState,
    current: TrialRecord,
    trial_origin: Option<Instant>,
    start_hold_reported: bool,
}

impl TrialSequencer {
    /// `block_position` is the arm the center block faces right now.
    pub fn new(
        driver: MazeDriver,
        trials: &[TrialDefinition],
        block_position: Arm,
    ) -> Result<Self> {
        let Some(first) = trials.first() else {
            return Err(eyre::Report::new(MazeError::Config(
                "trial list is empty".into(),
            )));
        };
        Ok(Self {
            driver,
            block: BlockRepositioner::new(block_position),
            log: ExperimentLog::new(trials),
            index: 0,
            state: TrialState::Idle,
            current: TrialRecord::from(*first),
            trial_origin: None,
            start_hold_reported: false,
        })
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// 0-based index of the trial in progress.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Working record of the trial in progress.
    pub fn current(&self) -> &TrialRecord {
        &self.current
    }

    pub fn log(&self) -> &ExperimentLog {
        &self.log
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.log.accuracy()
    }

    pub fn block_position(&self) -> Arm {
        self.block.position()
    }

    pub fn driver(&self) -> &MazeDriver {
        &self.driver
    }

    /// Time since `start` of the current trial.
    pub fn elapsed(&self) -> Option<Duration> {
        self.trial_origin
            .map(|t0| self.driver.now().saturating_duration_since(t0))
    }

    pub fn into_driver(self) -> MazeDriver {
        self.driver
    }

    /// Zero the frame counter and set up the first trial.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != TrialState::Idle {
            return Err(rejected("begin", self.state));
        }
        self.driver.reset_recording_counter()?;
        tracing::info!(trials = self.log.len(), "session begins");
        self.setup_trial()
    }

    /// Close the start gate, open the others, face the block to the start arm.
    fn setup_trial(&mut self) -> Result<()> {
        let TrialRecord { start, goal, .. } = *self
            .log
            .get(self.index)
            .ok_or_else(|| rejected("set up past the last trial", self.state))?;
        tracing::info!(trial = self.index + 1, %start, %goal, "initializing trial");

        self.current = TrialRecord::new(start, goal);
        self.trial_origin = None;
        self.start_hold_reported = false;

        self.driver.actuate_gate(start, true)?;
        for arm in Arm::ALL.into_iter().filter(|a| *a != start) {
            self.driver.actuate_gate(arm, false)?;
        }
        self.block
            .align(&mut self.driver, start)
            .wrap_err("align block to start arm")?;
        self.state = TrialState::AwaitingStart;
        Ok(())
    }

    /// Begin the start hold. The animal must be in the start arm.
    pub fn start(&mut self) -> Result<()> {
        if self.state != TrialState::AwaitingStart {
            return Err(rejected("start", self.state));
        }
        let detected = self.driver.last_detected_arm()?;
        if detected != self.current.start {
            return Err(eyre::Report::new(MazeError::PreconditionFailed {
                expected: self.current.start,
                detected,
            }));
        }
        let now = self.driver.now();
        self.trial_origin = Some(now);
        self.state = TrialState::HoldingAtStart { since: now };
        tracing::info!(
            trial = self.index + 1,
            hold_s = self.driver.profile().timing.start_hold.as_secs_f64(),
            "holding at start"
        );
        Ok(())
    }

    fn hold_elapsed(&self, since: Instant) -> Duration {
        self.driver.now().saturating_duration_since(since)
    }

    /// Open the start gate once the start hold has run out.
    pub fn open(&mut self) -> Result<()> {
        let TrialState::HoldingAtStart { since } = self.state else {
            return Err(rejected("open", self.state));
        };
        let hold = self.driver.profile().timing.start_hold;
        let left = remaining(hold, self.hold_elapsed(since));
        if !left.is_zero() {
            return Err(eyre::Report::new(MazeError::State(format!(
                "start hold has {:.1}s left",
                left.as_secs_f64()
            ))));
        }

        self.current.start_frame = Some(self.driver.frame_count()?);
        self.driver.start_recording()?;
        self.driver.actuate_gate(self.current.start, false)?;
        self.current.open_frame = Some(self.driver.frame_count()?);
        self.state = TrialState::Running;
        tracing::info!(trial = self.index + 1, "start gate open");
        Ok(())
    }

    /// Watch for the animal leaving the start arm.
    fn tick_running(&mut self) -> Result<SessionStatus> {
        let arm = self.driver.last_detected_arm()?;
        if arm == self.current.start {
            if let Some(e) = self.elapsed() {
                tracing::trace!(elapsed = %fmt_elapsed(e), "trial running");
            }
            return Ok(SessionStatus::Running);
        }

        tracing::info!(%arm, "animal detected");
        // Gate closes before the entry is judged.
        self.driver.actuate_gate(arm, true)?;
        self.current.close_frame = Some(self.driver.frame_count()?);
        self.current.result = Some(arm);
        if arm == self.current.goal {
            self.driver.dose(DoseTarget::Arm(arm))?;
            tracing::info!(trial = self.index + 1, "correct");
        } else {
            tracing::info!(trial = self.index + 1, goal = %self.current.goal, "incorrect");
        }
        self.state = TrialState::HoldingAtFinish {
            since: self.driver.now(),
        };
        tracing::info!(
            hold_s = self.driver.profile().timing.finish_hold.as_secs_f64(),
            "holding at finish"
        );
        Ok(SessionStatus::Running)
    }

    pub fn tick(&mut self) -> Result<SessionStatus> {
        match self.state {
            TrialState::Idle | TrialState::AwaitingStart | TrialState::ReadyForNext => {
                Ok(SessionStatus::AwaitingOperator)
            }
            TrialState::HoldingAtStart { since } => {
                let hold = self.driver.profile().timing.start_hold;
                if self.hold_elapsed(since) >= hold {
                    if !self.start_hold_reported {
                        tracing::info!(trial = self.index + 1, "start hold over; ready to open");
                        self.start_hold_reported = true;
                    }
                    Ok(SessionStatus::AwaitingOperator)
                } else {
                    Ok(SessionStatus::Running)
                }
            }
            TrialState::Running => self.tick_running(),
            TrialState::HoldingAtFinish { since } => {
                let hold = self.driver.profile().timing.finish_hold;
                if self.hold_elapsed(since) < hold {
                    return Ok(SessionStatus::Running);
                }
                self.driver.stop_recording()?;
                self.current.end_frame = Some(self.driver.frame_count()?);
                self.current.elapsed = self.elapsed();
                self.state = TrialState::ReadyForNext;
                tracing::info!(
                    trial = self.index + 1,
                    elapsed = %self.current.elapsed.map(fmt_elapsed).unwrap_or_default(),
                    "finish hold over; ready to finish"
                );
                Ok(SessionStatus::AwaitingOperator)
            }
            TrialState::Complete => Ok(SessionStatus::Complete),
        }
    }

    /// Abandon the trial in progress and set it up again.
    pub fn rewind(&mut self) -> Result<()> {
        match self.state {
            TrialState::AwaitingStart
            | TrialState::HoldingAtStart { .. }
            | TrialState::Running
            | TrialState::HoldingAtFinish { .. } => {}
            other => return Err(rejected("rewind", other)),
        }
        self.driver.stop_recording()?;
        tracing::info!(trial = self.index + 1, "rewinding trial");
        self.setup_trial()
    }

    /// Commit the trial to the log and move on.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != TrialState::ReadyForNext {
            return Err(rejected("finish", self.state));
        }
        self.log.replace_at(self.index, self.current)?;
        tracing::info!(
            trial = self.index + 1,
            score = %score_line(self.log.correct(), self.log.completed()),
            "trial finished"
        );
        self.index += 1;
        if self.index < self.log.len() {
            self.setup_trial()
        } else {
            let frames = self.driver.frame_count()?;
            tracing::info!(frames, "all trials done");
            self.state = TrialState::Complete;
            Ok(())
        }
    }

    /// Write the result file and its lick file. A trial still recording is
    /// stopped first so the scope is released before the buffer is read.
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        if matches!(
            self.state,
            TrialState::Running | TrialState::HoldingAtFinish { .. }
        ) {
            self.driver.stop_recording()?;
        }
        self.log.save(path)?;
        let frames = self.driver.frame_count()?;
        let licks = self.driver.drain_lick_buffer()?;
        ExperimentLog::save_licks(&lick_path(path), &licks, frames)
    }

    /// Best-effort save on an unplanned exit; unfinished trials keep `-` fields.
    pub fn autosave(&mut self, path: &Path) -> Result<()> {
        if let Err(e) = self.driver.stop_recording() {
            tracing::warn!(error = %e, "could not stop recording during autosave");
        }
        self.log.save(path).wrap_err("autosave")?;
        let licks = self
            .driver
            .frame_count()
            .and_then(|frames| Ok((frames, self.driver.drain_lick_buffer()?)));
        match licks {
            Ok((frames, licks)) => {
                if let Err(e) = ExperimentLog::save_licks(&lick_path(path), &licks, frames) {
                    tracing::warn!(error = %e, "lick autosave failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "lick buffer unavailable during autosave"),
        }
        Ok(())
    }
}

impl Sequencer for TrialSequencer {
    fn tick(&mut self) -> Result<SessionStatus> {
        TrialSequencer::tick(self)
    }

    fn apply(&mut self, cmd: OperatorCommand) -> Result<()> {
        match cmd {
            OperatorCommand::Start => self.start(),
            OperatorCommand::Open => self.open(),
            OperatorCommand::Rewind => self.rewind(),
            OperatorCommand::Finish => self.finish(),
            other => Err(eyre::Report::new(MazeError::State(format!(
                "'{other}' is not a trial command"
            )))),
        }
    }

    fn poll_period(&self) -> Duration {
        let timing = self.driver.profile().timing;
        match self.state {
            TrialState::HoldingAtStart { .. } | TrialState::HoldingAtFinish { .. } => {
                timing.hold_poll
            }
            _ => timing.poll,
        }
    }

    fn is_finished(&self) -> bool {
        self.state == TrialState::Complete
    }

    fn auto_command(&self) -> Option<OperatorCommand> {
        match self.state {
            TrialState::AwaitingStart => Some(OperatorCommand::Start),
            TrialState::HoldingAtStart { since }
                if self.hold_elapsed(since) >= self.driver.profile().timing.start_hold =>
            {
                Some(OperatorCommand::Open)
            }
            TrialState::ReadyForNext => Some(OperatorCommand::Finish),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sim_driver;
    use plusmaze_config::parse_trials;
    use plusmaze_hardware::{PortOp, SimulatedMaze};
    use plusmaze_traits::ManualClock;

    const WEST: u32 = 0;
    const SOUTH: u32 = 1;
    const NORTH: u32 = 2;

    fn sequencer(trials: &str, block: Arm) -> (SimulatedMaze, TrialSequencer, ManualClock) {
        let (sim, driver, clock) = sim_driver();
        let defs = parse_trials(trials).unwrap();
        let seq = TrialSequencer::new(driver, &defs, block).unwrap();
        (sim, seq, clock)
    }

    fn run_hold(seq: &mut TrialSequencer, clock: &ManualClock) {
        clock.advance(Duration::from_secs(10));
        seq.tick().unwrap();
    }

    #[test]
    fn empty_trial_list_is_rejected() {
        let (_sim, driver, _clock) = sim_driver();
        assert!(TrialSequencer::new(driver, &[], Arm::West).is_err());
    }

    #[test]
    fn setup_closes_start_gate_first_and_aligns_block() {
        let (sim, mut seq, _clock) = sequencer("north east\n", Arm::South);
        sim.clear_journal();
        seq.begin().unwrap();
        assert_eq!(seq.state(), TrialState::AwaitingStart);
        let gate_writes: Vec<(u8, u32)> = sim
            .journal()
            .into_iter()
            .filter_map(|op| match op {
                PortOp::Write { addr, value } => Some((addr, value)),
                _ => None,
            })
            .collect();
        // north closed, then west, south, east opened
        assert_eq!(
            gate_writes,
            vec![(0x02, 555), (0x01, 1200), (0x00, 1200), (0x03, 1200)]
        );
        assert_eq!(sim.triggers_on(0x40), vec![9, 6, 6]);
        assert_eq!(seq.block_position(), Arm::North);
    }

    #[test]
    fn start_requires_animal_in_start_arm() {
        let (sim, mut seq, _clock) = sequencer("west north\n", Arm::West);
        seq.begin().unwrap();
        sim.set_register(0x20, SOUTH);
        let err = seq.start().unwrap_err();
        assert_eq!(
            err.downcast_ref::<MazeError>(),
            Some(&MazeError::PreconditionFailed {
                expected: Arm::West,
                detected: Arm::South
            })
        );
        assert_eq!(seq.state(), TrialState::AwaitingStart);
    }

    #[test]
    fn open_is_rejected_during_start_hold() {
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        sim.set_register(0x20, WEST);
        seq.begin().unwrap();
        seq.start().unwrap();
        clock.advance(Duration::from_secs(9));
        assert!(seq.open().is_err());
        assert!(matches!(seq.state(), TrialState::HoldingAtStart { .. }));
        clock.advance(Duration::from_secs(1));
        seq.open().unwrap();
        assert_eq!(seq.state(), TrialState::Running);
        assert!(sim.is_recording());
    }

    #[test]
    fn correct_entry_doses_once_after_closing_the_gate() {
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        sim.clear_journal();
        sim.script_reads(0x20, [WEST, WEST, NORTH]);
        seq.begin().unwrap();

        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        assert_eq!(seq.tick().unwrap(), SessionStatus::Running);
        assert_eq!(seq.state(), TrialState::Running);
        seq.tick().unwrap();
        assert!(matches!(seq.state(), TrialState::HoldingAtFinish { .. }));

        let journal = sim.journal();
        let doses: Vec<&PortOp> = journal
            .iter()
            .filter(|op| {
                matches!(op, PortOp::Trigger { channel: 0x40, bit } if (1..=4).contains(bit))
            })
            .collect();
        assert_eq!(doses, vec![&PortOp::Trigger { channel: 0x40, bit: 3 }]);

        let close = journal
            .iter()
            .position(|op| *op == PortOp::Write { addr: 0x02, value: 555 })
            .unwrap();
        let dose = journal
            .iter()
            .position(|op| *op == PortOp::Trigger { channel: 0x40, bit: 3 })
            .unwrap();
        assert!(close < dose);

        // the west (start) gate closes before any other gate moves
        let first_gate = journal.iter().find_map(|op| match op {
            PortOp::Write { addr, value } => Some((*addr, *value)),
            _ => None,
        });
        assert_eq!(first_gate, Some((0x01, 565)));

        assert_eq!(seq.current().result, Some(Arm::North));
        assert!(seq.current().is_correct());
    }

    #[test]
    fn wrong_arm_is_recorded_without_dose() {
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        seq.begin().unwrap();
        sim.script_reads(0x20, [WEST, SOUTH]);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        sim.clear_journal();
        seq.tick().unwrap();
        assert_eq!(seq.current().result, Some(Arm::South));
        assert!(!seq.current().is_correct());
        assert!(sim.triggers_on(0x40).is_empty());
        assert_eq!(sim.writes_to(0x00), vec![580]);
    }

    #[test]
    fn full_session_fills_every_field() {
        let (sim, mut seq, clock) = sequencer("west north\nnorth east\n", Arm::West);
        seq.begin().unwrap();
        sim.script_reads(0x20, [WEST, NORTH]);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        seq.tick().unwrap();
        run_hold(&mut seq, &clock);
        assert_eq!(seq.state(), TrialState::ReadyForNext);
        assert!(!sim.is_recording());
        seq.finish().unwrap();
        assert_eq!(seq.index(), 1);
        assert_eq!(seq.state(), TrialState::AwaitingStart);
        assert_eq!(seq.block_position(), Arm::North);

        let rec = seq.log().get(0).unwrap();
        assert_eq!(rec.result, Some(Arm::North));
        assert_eq!(rec.elapsed, Some(Duration::from_secs(20)));
        let (sf, of, cf, ef) = (
            rec.start_frame.unwrap(),
            rec.open_frame.unwrap(),
            rec.close_frame.unwrap(),
            rec.end_frame.unwrap(),
        );
        assert!(sf <= of && of <= cf && cf <= ef);
        assert_eq!(seq.accuracy(), Some(1.0));

        // second trial: animal goes west instead of east
        sim.script_reads(0x20, [NORTH, WEST]);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        seq.tick().unwrap();
        run_hold(&mut seq, &clock);
        seq.finish().unwrap();
        assert_eq!(seq.state(), TrialState::Complete);
        assert_eq!(seq.tick().unwrap(), SessionStatus::Complete);
        assert_eq!(seq.accuracy(), Some(0.5));
    }

    #[test]
    fn rewind_discards_progress() {
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        seq.begin().unwrap();
        sim.set_register(0x20, WEST);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        seq.rewind().unwrap();
        assert_eq!(seq.state(), TrialState::AwaitingStart);
        assert_eq!(seq.index(), 0);
        assert_eq!(seq.current().start_frame, None);
        assert!(!sim.is_recording());
        assert!(seq.finish().is_err());
    }

    #[test]
    fn persist_mid_trial_stops_the_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        seq.begin().unwrap();
        sim.set_register(0x20, WEST);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        assert!(sim.is_recording());

        let out = dir.path().join("run.txt");
        seq.persist(&out).unwrap();
        assert!(!sim.is_recording());
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "west north - - - - - -\n"
        );
        assert!(lick_path(&out).exists());
    }

    #[test]
    fn finish_only_when_ready() {
        let (_sim, mut seq, _clock) = sequencer("west north\n", Arm::West);
        assert!(seq.finish().is_err());
        assert!(seq.rewind().is_err());
        seq.begin().unwrap();
        assert!(seq.begin().is_err());
    }

    #[test]
    fn device_error_propagates_from_tick() {
        let (sim, mut seq, clock) = sequencer("west north\n", Arm::West);
        seq.begin().unwrap();
        sim.set_register(0x20, WEST);
        seq.start().unwrap();
        run_hold(&mut seq, &clock);
        seq.open().unwrap();
        sim.disconnect();
        let err = seq.tick().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MazeError>(),
            Some(MazeError::Device(_))
        ));
    }
}
