//! Runtime device profile injected into `MazeDriver`.
//!
//! Built from a validated `plusmaze_config::Config` (see `conversions`).
//! Per-arm tables are indexed by `Arm::index()`.

use crate::types::RotationCommand;
use plusmaze_traits::Arm;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateCalibration {
    pub addr: u8,
    pub closed: u32,
    pub open: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoseCalibration {
    pub trigger_bit: u8,
    pub addr: u8,
    pub volume: u32,
    pub reps: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosingMap {
    pub trigger_channel: u8,
    pub reps_addr: u8,
    pub broadcast_bit: u8,
    pub arms: [DoseCalibration; 4],
}

impl DosingMap {
    pub fn arm(&self, arm: Arm) -> &DoseCalibration {
        &self.arms[arm.index()]
    }

    /// Repetition word: 4 bits per arm, slot chosen by `trigger_bit - 1`.
    pub fn packed_reps(&self) -> u32 {
        self.arms.iter().fold(0u32, |acc, d| {
            let shift = 4 * u32::from(d.trigger_bit.saturating_sub(1));
            acc | (u32::from(d.reps & 0xF) << shift)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationMap {
    pub trigger_channel: u8,
    pub center_cw: u8,
    pub center_ccw: u8,
    pub maze_cw: u8,
    pub maze_ccw: u8,
}

impl RotationMap {
    pub const fn bit(&self, cmd: RotationCommand) -> u8 {
        match cmd {
            RotationCommand::CenterCw => self.center_cw,
            RotationCommand::CenterCcw => self.center_ccw,
            RotationCommand::MazeCw => self.maze_cw,
            RotationCommand::MazeCcw => self.maze_ccw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityMap {
    pub addr: u8,
    pub mask: u32,
    /// Arm for each detector id, indexed by id.
    pub ids: Vec<Arm>,
}

impl ProximityMap {
    pub fn lookup(&self, raw: u32) -> Option<Arm> {
        let id = usize::try_from(raw & self.mask).ok()?;
        self.ids.get(id).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMap {
    pub trigger_channel: u8,
    pub start_bit: u8,
    pub stop_bit: u8,
    pub reset_bit: u8,
    pub frame_lo_addr: u8,
    pub frame_hi_addr: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LickMap {
    pub status_addr: u8,
    pub status_bit: u8,
    pub trigger_channel: u8,
    pub reset_bit: u8,
    pub pipe_addr: u8,
    pub buffer_bytes: usize,
}

/// Poll periods, holds and settle delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll: Duration,
    pub hold_poll: Duration,
    pub start_hold: Duration,
    pub finish_hold: Duration,
    pub rotation_settle: Duration,
    pub counter_settle: Duration,
    pub buffer_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(250),
            hold_poll: Duration::from_millis(1000),
            start_hold: Duration::from_millis(10_000),
            finish_hold: Duration::from_millis(10_000),
            rotation_settle: Duration::from_millis(1500),
            counter_settle: Duration::from_millis(50),
            buffer_settle: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub gates: [GateCalibration; 4],
    pub dosing: DosingMap,
    pub rotation: RotationMap,
    pub proximity: ProximityMap,
    pub scope: ScopeMap,
    pub lick: LickMap,
    pub timing: Timing,
}

impl DeviceProfile {
    pub fn gate(&self, arm: Arm) -> &GateCalibration {
        &self.gates[arm.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dose(trigger_bit: u8, reps: u8) -> DoseCalibration {
        DoseCalibration {
            trigger_bit,
            addr: 0,
            volume: 1,
            reps,
        }
    }

    #[test]
    fn packs_reps_by_trigger_bit() {
        // west=2, north=3, south=1, east=4
        let map = DosingMap {
            trigger_channel: 0x40,
            reps_addr: 0x08,
            broadcast_bit: 0,
            arms: [dose(2, 3), dose(3, 7), dose(1, 2), dose(4, 2)],
        };
        assert_eq!(map.packed_reps(), 0x2732);
    }

    #[test]
    fn proximity_lookup_masks_raw_value() {
        let map = ProximityMap {
            addr: 0x20,
            mask: 0x3,
            ids: vec![Arm::West, Arm::South, Arm::North, Arm::East],
        };
        assert_eq!(map.lookup(0), Some(Arm::West));
        assert_eq!(map.lookup(0xFF), Some(Arm::East));
        assert_eq!(map.lookup(6), Some(Arm::North));
    }
}
