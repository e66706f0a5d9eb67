//! Center block alignment.
//!
//! The block must face the trial's start arm before a trial begins. A
//! quarter turn is one rotation pulse; a half turn is two clockwise pulses.

use crate::driver::MazeDriver;
use crate::error::Result;
use crate::types::RotationCommand;
use plusmaze_traits::Arm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPlan {
    pub command: RotationCommand,
    pub steps: u8,
}

/// Rotation that brings the block from `from` to `to`; `None` if already there.
pub fn plan_rotation(from: Arm, to: Arm) -> Option<RotationPlan> {
    use Arm::{East, North, South, West};
    use RotationCommand::{CenterCcw as Ccw, CenterCw as Cw};

    let (command, steps) = match (from, to) {
        (South, West) => (Cw, 1),
        (South, North) => (Cw, 2),
        (South, East) => (Ccw, 1),
        (West, North) => (Cw, 1),
        (West, East) => (Cw, 2),
        (West, South) => (Ccw, 1),
        (North, East) => (Cw, 1),
        (North, South) => (Cw, 2),
        (North, West) => (Ccw, 1),
        (East, South) => (Cw, 1),
        (East, West) => (Cw, 2),
        (East, North) => (Ccw, 1),
        _ => return None,
    };
    Some(RotationPlan { command, steps })
}

/// Tracks which arm the center block currently faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRepositioner {
    position: Arm,
}

impl BlockRepositioner {
    pub fn new(position: Arm) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Arm {
        self.position
    }

    /// Pulse once per step with the settle delay after each pulse. The
    /// position moves to `to` only after every step went out.
    pub fn execute(&mut self, driver: &mut MazeDriver, plan: RotationPlan, to: Arm) -> Result<()> {
        let settle = driver.profile().timing.rotation_settle;
        for step in 1..=plan.steps {
            driver.rotate(plan.command)?;
            tracing::debug!(step, steps = plan.steps, "block rotation step");
            driver.settle(settle);
        }
        tracing::info!(from = %self.position, %to, "block repositioned");
        self.position = to;
        Ok(())
    }

    pub fn align(&mut self, driver: &mut MazeDriver, to: Arm) -> Result<()> {
        match plan_rotation(self.position, to) {
            Some(plan) => self.execute(driver, plan, to),
            None => Ok(()),
        }
    }
}
