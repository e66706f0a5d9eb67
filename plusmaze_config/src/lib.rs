#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Device profile schema, trial definitions and gate calibration parsing.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every register address, trigger bit and calibration value of a
//!   physical maze unit lives here; nothing is compiled in.
//! - Trial definition files are parsed by `trials`.
//! - Gate calibration CSV overrides the gate positions of the profile.
pub mod trials;

pub use trials::{TrialDefinition, load_trial_file, parse_trials};

use plusmaze_traits::Arm;
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::HashSet;
use std::path::Path;

/// One value per maze arm, keyed by compass name in TOML.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PerArm<T> {
    pub west: T,
    pub north: T,
    pub south: T,
    pub east: T,
}

impl<T> PerArm<T> {
    pub fn get(&self, arm: Arm) -> &T {
        match arm {
            Arm::West => &self.west,
            Arm::North => &self.north,
            Arm::South => &self.south,
            Arm::East => &self.east,
        }
    }

    pub fn get_mut(&mut self, arm: Arm) -> &mut T {
        match arm {
            Arm::West => &mut self.west,
            Arm::North => &mut self.north,
            Arm::South => &mut self.south,
            Arm::East => &mut self.east,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Arm, &T)> {
        Arm::ALL.into_iter().map(move |a| (a, self.get(a)))
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GateCfg {
    /// Wire-in address of the gate servo
    pub addr: u8,
    /// Servo value for the closed position
    pub closed: u32,
    /// Servo value for the open position
    pub open: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DoseArmCfg {
    /// Bit on the dosing trigger channel; also selects the 4-bit slot in the
    /// packed repetition word at `4 * (trigger_bit - 1)`.
    pub trigger_bit: u8,
    /// Wire-in address of the volume register
    pub addr: u8,
    pub volume: u32,
    /// Pulses per dose (0..=15)
    pub reps: u8,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DosingCfg {
    pub trigger_channel: u8,
    /// Wire-in address of the packed repetition word
    pub reps_addr: u8,
    /// Trigger bit that doses every arm at once
    #[serde(default)]
    pub broadcast_bit: u8,
    #[serde(flatten)]
    pub arms: PerArm<DoseArmCfg>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RotationCfg {
    pub trigger_channel: u8,
    pub center_cw: u8,
    pub center_ccw: u8,
    /// Maze-wide rotation is not wired on current boards; the bit is a placeholder.
    pub maze_cw: u8,
    pub maze_ccw: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProximityCfg {
    /// Wire-out address of the last-detected-arm register
    pub addr: u8,
    /// Mask applied to the raw register before lookup
    pub mask: u32,
    /// Arm for each detector id, indexed by id. Differs between maze units.
    #[serde(deserialize_with = "de_arm_names")]
    pub ids: Vec<Arm>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScopeCfg {
    pub trigger_channel: u8,
    pub start_bit: u8,
    pub stop_bit: u8,
    pub reset_bit: u8,
    pub frame_lo_addr: u8,
    pub frame_hi_addr: u8,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LickCfg {
    pub status_addr: u8,
    pub status_bit: u8,
    pub trigger_channel: u8,
    /// Resets the buffer read address before a drain
    pub reset_bit: u8,
    pub pipe_addr: u8,
    /// Fixed pipe transfer length; one bit per frame
    pub buffer_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimingCfg {
    /// Poll period while monitoring an active trial or training session
    pub poll_ms: u64,
    /// Poll period during timed holds
    pub hold_poll_ms: u64,
    pub start_hold_ms: u64,
    pub finish_hold_ms: u64,
    /// Pause after each center rotation pulse before the next may fire
    pub rotation_settle_ms: u64,
    pub counter_settle_ms: u64,
    pub buffer_settle_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            poll_ms: 250,
            hold_poll_ms: 1000,
            start_hold_ms: 10_000,
            finish_hold_ms: 10_000,
            rotation_settle_ms: 1500,
            counter_settle_ms: 50,
            buffer_settle_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub gates: PerArm<GateCfg>,
    pub dosing: DosingCfg,
    pub rotation: RotationCfg,
    pub proximity: ProximityCfg,
    pub scope: ScopeCfg,
    pub lick: LickCfg,
    #[serde(default)]
    pub timing: TimingCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a device profile.
pub fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn de_arm_names<'de, D>(deserializer: D) -> Result<Vec<Arm>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Vec<String> = Vec::deserialize(deserializer)?;
    names
        .iter()
        .map(|n| n.parse::<Arm>().map_err(serde::de::Error::custom))
        .collect()
}

fn de_arm<'de, D>(deserializer: D) -> Result<Arm, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse::<Arm>().map_err(serde::de::Error::custom)
}

/// Gate calibration CSV schema.
///
/// Expected headers:
/// arm,closed,open
///
/// Example:
/// arm,closed,open
/// north,555,1200
/// west,565,1200
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct GateCalibrationRow {
    #[serde(deserialize_with = "de_arm")]
    pub arm: Arm,
    pub closed: u32,
    pub open: u32,
}

pub fn load_gate_calibration_csv(path: &Path) -> eyre::Result<Vec<GateCalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open gate calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["arm", "closed", "open"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "gate calibration CSV must have headers 'arm,closed,open', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for (idx, rec) in rdr.deserialize::<GateCalibrationRow>().enumerate() {
        match rec {
            Ok(row) => {
                if !seen.insert(row.arm) {
                    eyre::bail!("gate calibration CSV lists {} twice (row {})", row.arm, idx + 2);
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

impl Config {
    /// Replace gate positions with measured values; addresses are kept.
    pub fn apply_gate_calibration(&mut self, rows: &[GateCalibrationRow]) {
        for row in rows {
            let gate = self.gates.get_mut(row.arm);
            gate.closed = row.closed;
            gate.open = row.open;
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Gates
        let mut gate_addrs = HashSet::new();
        for (arm, gate) in self.gates.iter() {
            if gate.closed == gate.open {
                eyre::bail!("gates.{arm}: closed and open values must differ");
            }
            if !gate_addrs.insert(gate.addr) {
                eyre::bail!("gates.{arm}.addr 0x{:02X} is shared with another gate", gate.addr);
            }
        }

        // Dosing
        let mut dose_addrs = HashSet::from([self.dosing.reps_addr]);
        for (arm, dose) in self.dosing.arms.iter() {
            if !(1..=8).contains(&dose.trigger_bit) {
                eyre::bail!("dosing.{arm}.trigger_bit must be in 1..=8");
            }
            if dose.trigger_bit == self.dosing.broadcast_bit {
                eyre::bail!("dosing.{arm}.trigger_bit collides with dosing.broadcast_bit");
            }
            if dose.reps > 15 {
                eyre::bail!("dosing.{arm}.reps must be <= 15 (4-bit field)");
            }
            if dose.volume == 0 {
                eyre::bail!("dosing.{arm}.volume must be > 0");
            }
            if !dose_addrs.insert(dose.addr) {
                eyre::bail!("dosing.{arm}.addr 0x{:02X} is already in use", dose.addr);
            }
            if gate_addrs.contains(&dose.addr) {
                eyre::bail!("dosing.{arm}.addr 0x{:02X} overlaps a gate register", dose.addr);
            }
        }

        // Trigger bits must be unique per channel. The maze-wide rotation bits
        // are placeholders and may share a bit with each other.
        let dose = self.dosing.trigger_channel;
        let arms = &self.dosing.arms;
        let triggers = [
            (dose, self.dosing.broadcast_bit, "dosing.broadcast_bit"),
            (dose, arms.west.trigger_bit, "dosing.west.trigger_bit"),
            (dose, arms.north.trigger_bit, "dosing.north.trigger_bit"),
            (dose, arms.south.trigger_bit, "dosing.south.trigger_bit"),
            (dose, arms.east.trigger_bit, "dosing.east.trigger_bit"),
            (self.rotation.trigger_channel, self.rotation.center_cw, "rotation.center_cw"),
            (self.rotation.trigger_channel, self.rotation.center_ccw, "rotation.center_ccw"),
            (self.scope.trigger_channel, self.scope.start_bit, "scope.start_bit"),
            (self.scope.trigger_channel, self.scope.stop_bit, "scope.stop_bit"),
            (self.scope.trigger_channel, self.scope.reset_bit, "scope.reset_bit"),
            (self.lick.trigger_channel, self.lick.reset_bit, "lick.reset_bit"),
        ];
        let mut used = HashSet::new();
        for (channel, bit, name) in triggers {
            if bit >= 32 {
                eyre::bail!("{name} must be < 32");
            }
            if !used.insert((channel, bit)) {
                eyre::bail!("{name} reuses trigger bit {bit} on channel 0x{channel:02X}");
            }
        }
        for (bit, name) in [
            (self.rotation.maze_cw, "rotation.maze_cw"),
            (self.rotation.maze_ccw, "rotation.maze_ccw"),
        ] {
            if bit >= 32 {
                eyre::bail!("{name} must be < 32");
            }
        }

        // Proximity
        if self.proximity.mask == 0 {
            eyre::bail!("proximity.mask must be > 0");
        }
        if (self.proximity.ids.len() as u64) <= u64::from(self.proximity.mask) {
            eyre::bail!(
                "proximity.ids must map every id up to mask 0x{:X} ({} entries given)",
                self.proximity.mask,
                self.proximity.ids.len()
            );
        }
        for arm in Arm::ALL {
            if !self.proximity.ids.contains(&arm) {
                eyre::bail!("proximity.ids never maps to {arm}");
            }
        }

        // Scope
        if self.scope.frame_lo_addr == self.scope.frame_hi_addr {
            eyre::bail!("scope.frame_lo_addr and scope.frame_hi_addr must differ");
        }

        // Lick
        if self.lick.status_bit >= 32 {
            eyre::bail!("lick.status_bit must be < 32");
        }
        if self.lick.buffer_bytes == 0 {
            eyre::bail!("lick.buffer_bytes must be > 0");
        }
        if self.lick.buffer_bytes % 16 != 0 {
            eyre::bail!("lick.buffer_bytes must be a multiple of 16 (pipe transfer size)");
        }

        // Timing
        if self.timing.poll_ms == 0 {
            eyre::bail!("timing.poll_ms must be >= 1");
        }
        if self.timing.hold_poll_ms == 0 {
            eyre::bail!("timing.hold_poll_ms must be >= 1");
        }
        for (ms, name) in [
            (self.timing.start_hold_ms, "timing.start_hold_ms"),
            (self.timing.finish_hold_ms, "timing.finish_hold_ms"),
        ] {
            if ms > 10 * 60 * 1000 {
                eyre::bail!("{name} is unreasonably large (>10min)");
            }
        }
        if self.timing.rotation_settle_ms > 60 * 1000 {
            eyre::bail!("timing.rotation_settle_ms is unreasonably large (>60s)");
        }

        Ok(())
    }
}
