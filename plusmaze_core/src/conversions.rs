//! `From` implementations bridging `plusmaze_config` types to `plusmaze_core` types.
//!
//! The CLI loads and validates a `Config`, then converts it once into a
//! `DeviceProfile` for the driver.

use crate::profile::{
    DeviceProfile, DoseCalibration, DosingMap, GateCalibration, LickMap, ProximityMap, RotationMap,
    ScopeMap, Timing,
};
use plusmaze_traits::Arm;
use std::time::Duration;

// ── Gates ────────────────────────────────────────────────────────────────────

impl From<&plusmaze_config::GateCfg> for GateCalibration {
    fn from(c: &plusmaze_config::GateCfg) -> Self {
        Self {
            addr: c.addr,
            closed: c.closed,
            open: c.open,
        }
    }
}

// ── Dosing ───────────────────────────────────────────────────────────────────

impl From<&plusmaze_config::DoseArmCfg> for DoseCalibration {
    fn from(c: &plusmaze_config::DoseArmCfg) -> Self {
        Self {
            trigger_bit: c.trigger_bit,
            addr: c.addr,
            volume: c.volume,
            reps: c.reps,
        }
    }
}

impl From<&plusmaze_config::DosingCfg> for DosingMap {
    fn from(c: &plusmaze_config::DosingCfg) -> Self {
        Self {
            trigger_channel: c.trigger_channel,
            reps_addr: c.reps_addr,
            broadcast_bit: c.broadcast_bit,
            arms: Arm::ALL.map(|a| DoseCalibration::from(c.arms.get(a))),
        }
    }
}

// ── Rotation ─────────────────────────────────────────────────────────────────

impl From<&plusmaze_config::RotationCfg> for RotationMap {
    fn from(c: &plusmaze_config::RotationCfg) -> Self {
        Self {
            trigger_channel: c.trigger_channel,
            center_cw: c.center_cw,
            center_ccw: c.center_ccw,
            maze_cw: c.maze_cw,
            maze_ccw: c.maze_ccw,
        }
    }
}

// ── Sensors ──────────────────────────────────────────────────────────────────

impl From<&plusmaze_config::ProximityCfg> for ProximityMap {
    fn from(c: &plusmaze_config::ProximityCfg) -> Self {
        Self {
            addr: c.addr,
            mask: c.mask,
            ids: c.ids.clone(),
        }
    }
}

impl From<&plusmaze_config::ScopeCfg> for ScopeMap {
    fn from(c: &plusmaze_config::ScopeCfg) -> Self {
        Self {
            trigger_channel: c.trigger_channel,
            start_bit: c.start_bit,
            stop_bit: c.stop_bit,
            reset_bit: c.reset_bit,
            frame_lo_addr: c.frame_lo_addr,
            frame_hi_addr: c.frame_hi_addr,
        }
    }
}

impl From<&plusmaze_config::LickCfg> for LickMap {
    fn from(c: &plusmaze_config::LickCfg) -> Self {
        Self {
            status_addr: c.status_addr,
            status_bit: c.status_bit,
            trigger_channel: c.trigger_channel,
            reset_bit: c.reset_bit,
            pipe_addr: c.pipe_addr,
            buffer_bytes: c.buffer_bytes,
        }
    }
}

// ── Timing ───────────────────────────────────────────────────────────────────

impl From<&plusmaze_config::TimingCfg> for Timing {
    fn from(c: &plusmaze_config::TimingCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
            hold_poll: Duration::from_millis(c.hold_poll_ms),
            start_hold: Duration::from_millis(c.start_hold_ms),
            finish_hold: Duration::from_millis(c.finish_hold_ms),
            rotation_settle: Duration::from_millis(c.rotation_settle_ms),
            counter_settle: Duration::from_millis(c.counter_settle_ms),
            buffer_settle: Duration::from_millis(c.buffer_settle_ms),
        }
    }
}

// ── DeviceProfile ────────────────────────────────────────────────────────────

impl From<&plusmaze_config::Config> for DeviceProfile {
    fn from(c: &plusmaze_config::Config) -> Self {
        Self {
            gates: Arm::ALL.map(|a| GateCalibration::from(c.gates.get(a))),
            dosing: DosingMap::from(&c.dosing),
            rotation: RotationMap::from(&c.rotation),
            proximity: ProximityMap::from(&c.proximity),
            scope: ScopeMap::from(&c.scope),
            lick: LickMap::from(&c.lick),
            timing: Timing::from(&c.timing),
        }
    }
}
