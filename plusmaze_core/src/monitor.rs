//! Idle-time maze polling between sessions.
//!
//! Follows the animal from arm to arm, optionally rewarding entries and
//! keeping the center block in T configuration. Invalid transitions are
//! only reported; nothing pauses.

use crate::classifier::classify;
use crate::driver::MazeDriver;
use crate::error::{MazeError, Result};
use crate::runner::{OperatorCommand, Sequencer};
use crate::status::SessionStatus;
use crate::types::{DoseTarget, Turn};
use plusmaze_traits::Arm;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which arm entries earn a dose while monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoReward {
    #[default]
    Off,
    EveryArm,
    RightTurns,
    LeftTurns,
}

impl AutoReward {
    fn rewards(self, turn: Turn) -> bool {
        match self {
            AutoReward::Off => false,
            AutoReward::EveryArm => true,
            AutoReward::RightTurns => turn == Turn::Right,
            AutoReward::LeftTurns => turn == Turn::Left,
        }
    }
}

impl fmt::Display for AutoReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutoReward::Off => "off",
            AutoReward::EveryArm => "every-arm",
            AutoReward::RightTurns => "right",
            AutoReward::LeftTurns => "left",
        })
    }
}

impl FromStr for AutoReward {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(AutoReward::Off),
            "every-arm" | "every" | "all" => Ok(AutoReward::EveryArm),
            "right" | "right-turns" => Ok(AutoReward::RightTurns),
            "left" | "left-turns" => Ok(AutoReward::LeftTurns),
            _ => Err(format!(
                "unknown autoreward '{s}' (expected off, every-arm, right or left)"
            )),
        }
    }
}

#[derive(Debug)]
pub struct MazeMonitor {
    driver: MazeDriver,
    reward: AutoReward,
    maintain_t_maze: bool,
    position: Arm,
    deadline: Option<Instant>,
}

impl MazeMonitor {
    /// Samples the current position; on a fresh board it may be stale.
    pub fn new(mut driver: MazeDriver, reward: AutoReward, maintain_t_maze: bool) -> Result<Self> {
        let position = driver.last_detected_arm()?;
        tracing::info!(%position, %reward, maintain_t_maze, "maze monitor started");
        Ok(Self {
            driver,
            reward,
            maintain_t_maze,
            position,
            deadline: None,
        })
    }

    /// Stop monitoring after `d` on the driver's clock.
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.deadline = Some(self.driver.now() + d);
        self
    }

    pub fn position(&self) -> Arm {
        self.position
    }

    pub fn into_driver(self) -> MazeDriver {
        self.driver
    }

    /// One poll; returns the new arm if the animal moved.
    pub fn poll(&mut self) -> Result<Option<Arm>> {
        let arm = self.driver.last_detected_arm()?;
        if arm == self.position {
            return Ok(None);
        }
        tracing::info!(%arm, "animal detected");
        match classify(self.position, arm) {
            Ok(turn) => {
                tracing::info!(%turn, "turn executed");
                if self.reward.rewards(turn) {
                    tracing::info!(reward = %self.reward, "autoreward");
                    self.driver.dose(DoseTarget::Arm(arm))?;
                }
                if self.maintain_t_maze {
                    self.driver.compensate_turn(turn)?;
                }
            }
            Err(e) => tracing::warn!(error = %e, "did the animal jump over the block?"),
        }
        self.position = arm;
        Ok(Some(arm))
    }
}

impl Sequencer for MazeMonitor {
    fn tick(&mut self) -> Result<SessionStatus> {
        self.poll()?;
        Ok(if self.is_finished() {
            SessionStatus::Complete
        } else {
            SessionStatus::Running
        })
    }

    fn apply(&mut self, cmd: OperatorCommand) -> Result<()> {
        Err(eyre::Report::new(MazeError::State(format!(
            "'{cmd}' is not a monitor command (use stop)"
        ))))
    }

    fn poll_period(&self) -> Duration {
        self.driver.profile().timing.poll
    }

    fn is_finished(&self) -> bool {
        self.deadline.is_some_and(|d| self.driver.now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunOutcome, drive};
    use crate::test_support::sim_driver;
    use crossbeam_channel::unbounded;
    use rstest::rstest;
    use std::sync::atomic::AtomicBool;

    const WEST: u32 = 0;
    const SOUTH: u32 = 1;
    const NORTH: u32 = 2;
    const EAST: u32 = 3;

    #[rstest]
    #[case(AutoReward::Off, NORTH, vec![])]
    #[case(AutoReward::EveryArm, NORTH, vec![3])]
    #[case(AutoReward::EveryArm, EAST, vec![4])]
    #[case(AutoReward::RightTurns, NORTH, vec![3])]
    #[case(AutoReward::RightTurns, EAST, vec![])]
    #[case(AutoReward::LeftTurns, EAST, vec![4])]
    fn autoreward_policy(#[case] reward: AutoReward, #[case] next: u32, #[case] doses: Vec<u8>) {
        let (sim, driver, _clock) = sim_driver();
        sim.set_register(0x20, WEST);
        let mut mon = MazeMonitor::new(driver, reward, false).unwrap();
        sim.clear_journal();
        sim.set_register(0x20, next);
        assert!(mon.poll().unwrap().is_some());
        assert_eq!(sim.triggers_on(0x40), doses);
    }

    #[test]
    fn maintain_t_maze_compensates() {
        let (sim, driver, _clock) = sim_driver();
        sim.set_register(0x20, WEST);
        let mut mon = MazeMonitor::new(driver, AutoReward::Off, true).unwrap();
        sim.set_register(0x20, NORTH);
        mon.poll().unwrap();
        assert_eq!(sim.triggers_on(0x40), vec![5]);
    }

    #[test]
    fn jump_only_warns_and_tracks_position() {
        let (sim, driver, _clock) = sim_driver();
        sim.set_register(0x20, WEST);
        let mut mon = MazeMonitor::new(driver, AutoReward::EveryArm, true).unwrap();
        sim.set_register(0x20, SOUTH);
        assert_eq!(mon.poll().unwrap(), Some(Arm::South));
        assert!(sim.triggers_on(0x40).is_empty());
        assert_eq!(mon.position(), Arm::South);
        assert_eq!(mon.poll().unwrap(), None);
    }

    #[test]
    fn duration_bounds_the_run() {
        let (sim, driver, clock) = sim_driver();
        sim.set_register(0x20, WEST);
        let mut mon = MazeMonitor::new(driver, AutoReward::Off, false)
            .unwrap()
            .with_duration(Duration::from_secs(1));
        let (_tx, rx) = unbounded();
        let out = drive(&mut mon, &clock, &rx, &AtomicBool::new(false), false).unwrap();
        assert_eq!(out, RunOutcome::Finished);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("every-arm".parse::<AutoReward>(), Ok(AutoReward::EveryArm));
        assert_eq!("RIGHT".parse::<AutoReward>(), Ok(AutoReward::RightTurns));
        assert!("sometimes".parse::<AutoReward>().is_err());
    }
}
