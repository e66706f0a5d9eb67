//! Small value types shared by the driver and the sequencers.

use plusmaze_traits::Arm;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Left,
    Right,
}

impl Turn {
    pub const fn name(self) -> &'static str {
        match self {
            Turn::Left => "left",
            Turn::Right => "right",
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Turn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Turn::Left),
            "right" => Ok(Turn::Right),
            _ => Err(format!("unknown turn '{s}' (expected left or right)")),
        }
    }
}

/// Rotation pulses understood by the controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationCommand {
    CenterCw,
    CenterCcw,
    /// Not wired on current boards; fires a placeholder bit.
    MazeCw,
    /// Not wired on current boards; fires a placeholder bit.
    MazeCcw,
}

impl RotationCommand {
    pub const ALL: [RotationCommand; 4] = [
        RotationCommand::CenterCcw,
        RotationCommand::CenterCw,
        RotationCommand::MazeCcw,
        RotationCommand::MazeCw,
    ];

    pub const fn is_implemented(self) -> bool {
        matches!(self, RotationCommand::CenterCw | RotationCommand::CenterCcw)
    }

    pub const fn name(self) -> &'static str {
        match self {
            RotationCommand::CenterCw => "center-cw",
            RotationCommand::CenterCcw => "center-ccw",
            RotationCommand::MazeCw => "maze-cw",
            RotationCommand::MazeCcw => "maze-ccw",
        }
    }
}

impl fmt::Display for RotationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RotationCommand {
    type Err = String;

    /// Accepts `center-cw`, `center cw` and `center_cw` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        RotationCommand::ALL
            .into_iter()
            .find(|c| c.name() == norm)
            .ok_or_else(|| {
                format!(
                    "unknown rotation '{s}' (expected center-cw, center-ccw, maze-cw or maze-ccw)"
                )
            })
    }
}

/// Where a reward dose goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseTarget {
    Arm(Arm),
    /// Broadcast bit: every arm at once.
    All,
}

impl fmt::Display for DoseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseTarget::Arm(a) => a.fmt(f),
            DoseTarget::All => f.write_str("all"),
        }
    }
}

impl FromStr for DoseTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(DoseTarget::All);
        }
        s.parse::<Arm>()
            .map(DoseTarget::Arm)
            .map_err(|e| e.to_string())
    }
}

/// Lick sensor history, one flag per recorded frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LickBuffer {
    frames: Vec<bool>,
}

impl LickBuffer {
    /// Unpack a pipe transfer: bytes in stream order, bit 0 of each byte first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let frames = bytes
            .iter()
            .flat_map(|b| (0..8).map(move |bit| (b >> bit) & 1 == 1))
            .collect();
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<bool> {
        self.frames.get(frame).copied()
    }

    /// The first `frame_count` flags, clipped to the buffer length.
    pub fn recorded(&self, frame_count: u32) -> &[bool] {
        let n = usize::try_from(frame_count).unwrap_or(usize::MAX).min(self.frames.len());
        &self.frames[..n]
    }
}
