use std::fmt;
use std::str::FromStr;

/// One of the four compass arms of the plus maze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arm {
    West,
    North,
    South,
    East,
}

impl Arm {
    /// Canonical iteration order used for gate setup and dosing programming.
    pub const ALL: [Arm; 4] = [Arm::West, Arm::North, Arm::South, Arm::East];

    /// Position of this arm in `Arm::ALL`.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Arm::West => 0,
            Arm::North => 1,
            Arm::South => 2,
            Arm::East => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Arm::West => "west",
            Arm::North => "north",
            Arm::South => "south",
            Arm::East => "east",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseArmError(pub String);

impl fmt::Display for ParseArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown arm '{}' (expected west, north, south or east)",
            self.0
        )
    }
}

impl std::error::Error for ParseArmError {}

impl FromStr for Arm {
    type Err = ParseArmError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "west" => Ok(Arm::West),
            "north" => Ok(Arm::North),
            "south" => Ok(Arm::South),
            "east" => Ok(Arm::East),
            _ => Err(ParseArmError(s.to_string())),
        }
    }
}
