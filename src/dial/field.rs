//! Dial identities, their limits and their numeric semantics

use crate::dial::error::{DialError, Result};
use std::fmt;
use std::str::FromStr;

/// Lower bound of the duration dial (seconds)
pub const SEC_MIN: f64 = 1.0;
/// Upper bound of the duration dial (seconds)
pub const SEC_MAX: f64 = 10.0;
/// Lower bound of the packet size dial (bytes)
pub const SIZE_MIN: f64 = 64.0;
/// Upper bound of the packet size dial (bytes)
pub const SIZE_MAX: f64 = 1400.0;
/// Lower bound of the packet count dial
pub const PKT_MIN: f64 = 1.0;
/// Upper bound of the packet count dial
pub const PKT_MAX: f64 = 187_500_000.0;
/// Lower bound of the bandwidth dial (Mbps)
pub const BW_MIN: f64 = 0.000_000_1;
/// Upper bound of the bandwidth dial (Mbps)
pub const BW_MAX: f64 = 150.0;

/// Bits per second in one unit of the bandwidth dial
pub const BPS_PER_MBPS: f64 = 1_000_000.0;

// Guards truncation against products like 2.9999999999 that are really 3.
const TRUNCATION_SLACK: f64 = 1e-9;

/// Traffic direction of a bandwidth test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::ClientToServer, Direction::ServerToClient];

    /// Short tag used in form field names (`cs`, `sc`)
    pub fn tag(self) -> &'static str {
        match self {
            Direction::ClientToServer => "cs",
            Direction::ServerToClient => "sc",
        }
    }

    /// Flag passed to the bandwidth test client
    pub fn flag(self) -> &'static str {
        match self {
            Direction::ClientToServer => "-cs",
            Direction::ServerToClient => "-sc",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Direction {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cs" | "c->s" => Ok(Direction::ClientToServer),
            "sc" | "s->c" => Ok(Direction::ServerToClient),
            _ => Err(DialError::UnknownDirection(s.to_string())),
        }
    }
}

/// One of the four linked dials of a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialField {
    Seconds,
    Size,
    PacketCount,
    Bandwidth,
}

impl DialField {
    pub const ALL: [DialField; 4] = [
        DialField::Seconds,
        DialField::Size,
        DialField::PacketCount,
        DialField::Bandwidth,
    ];

    /// Short key used in form field names
    pub fn key(self) -> &'static str {
        match self {
            DialField::Seconds => "sec",
            DialField::Size => "size",
            DialField::PacketCount => "pkt",
            DialField::Bandwidth => "bw",
        }
    }

    /// Name shown to the user in notices
    pub fn label(self) -> &'static str {
        match self {
            DialField::Seconds => "seconds",
            DialField::Size => "packet size",
            DialField::PacketCount => "packets",
            DialField::Bandwidth => "bandwidth",
        }
    }

    pub fn min(self) -> f64 {
        match self {
            DialField::Seconds => SEC_MIN,
            DialField::Size => SIZE_MIN,
            DialField::PacketCount => PKT_MIN,
            DialField::Bandwidth => BW_MIN,
        }
    }

    pub fn max(self) -> f64 {
        match self {
            DialField::Seconds => SEC_MAX,
            DialField::Size => SIZE_MAX,
            DialField::PacketCount => PKT_MAX,
            DialField::Bandwidth => BW_MAX,
        }
    }

    /// Apply the dial's precision: whole seconds, bytes and packets,
    /// bandwidth to two decimals.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            DialField::Bandwidth => (value * 100.0).round() / 100.0,
            _ => (value * (1.0 + TRUNCATION_SLACK)).trunc(),
        }
    }

    /// True when the value is finite and inside the dial's range
    pub fn accepts(self, value: f64) -> bool {
        value.is_finite() && value >= self.min() && value <= self.max()
    }

    /// Clamp into the dial's range
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min(), self.max())
    }

    pub(crate) fn index(self) -> usize {
        match self {
            DialField::Seconds => 0,
            DialField::Size => 1,
            DialField::PacketCount => 2,
            DialField::Bandwidth => 3,
        }
    }
}

impl fmt::Display for DialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DialField {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sec" | "seconds" => Ok(DialField::Seconds),
            "size" => Ok(DialField::Size),
            "pkt" | "packets" => Ok(DialField::PacketCount),
            "bw" | "bandwidth" => Ok(DialField::Bandwidth),
            _ => Err(DialError::UnknownField(s.to_string())),
        }
    }
}

/// The dials that may be locked (computed, read-only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockableField {
    #[default]
    Size,
    PacketCount,
    Bandwidth,
}

impl LockableField {
    pub fn field(self) -> DialField {
        match self {
            LockableField::Size => DialField::Size,
            LockableField::PacketCount => DialField::PacketCount,
            LockableField::Bandwidth => DialField::Bandwidth,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            LockableField::Size => 0,
            LockableField::PacketCount => 1,
            LockableField::Bandwidth => 2,
        }
    }
}

impl TryFrom<DialField> for LockableField {
    type Error = DialError;

    fn try_from(field: DialField) -> Result<Self> {
        match field {
            DialField::Size => Ok(LockableField::Size),
            DialField::PacketCount => Ok(LockableField::PacketCount),
            DialField::Bandwidth => Ok(LockableField::Bandwidth),
            DialField::Seconds => Err(DialError::NotLockable(field.key().to_string())),
        }
    }
}

impl FromStr for LockableField {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self> {
        LockableField::try_from(s.parse::<DialField>()?)
    }
}
