//! UART line-level vocabulary: baud rates and hardware error-source decoding.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B1200,
    #[default]
    B2400,
    B4800,
    B9600,
    B14400,
    B19200,
    B28800,
    B31250,
    B38400,
    B57600,
    B76800,
    B115200,
    B230400,
    B250000,
    B460800,
    B921600,
    B1000000,
}

impl BaudRate {
    pub const ALL: [BaudRate; 17] = [
        Self::B1200,
        Self::B2400,
        Self::B4800,
        Self::B9600,
        Self::B14400,
        Self::B19200,
        Self::B28800,
        Self::B31250,
        Self::B38400,
        Self::B57600,
        Self::B76800,
        Self::B115200,
        Self::B230400,
        Self::B250000,
        Self::B460800,
        Self::B921600,
        Self::B1000000,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            Self::B1200 => 1_200,
            Self::B2400 => 2_400,
            Self::B4800 => 4_800,
            Self::B9600 => 9_600,
            Self::B14400 => 14_400,
            Self::B19200 => 19_200,
            Self::B28800 => 28_800,
            Self::B31250 => 31_250,
            Self::B38400 => 38_400,
            Self::B57600 => 57_600,
            Self::B76800 => 76_800,
            Self::B115200 => 115_200,
            Self::B230400 => 230_400,
            Self::B250000 => 250_000,
            Self::B460800 => 460_800,
            Self::B921600 => 921_600,
            Self::B1000000 => 1_000_000,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedBaud(pub u32);

impl fmt::Display for UnsupportedBaud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported baud rate {}", self.0)
    }
}

impl std::error::Error for UnsupportedBaud {}

impl TryFrom<u32> for BaudRate {
    type Error = UnsupportedBaud;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.as_u32() == value)
            .ok_or(UnsupportedBaud(value))
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.as_u32()
    }
}

/// Why a baud rate string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseBaudError {
    /// Not a number at all.
    Invalid(String),
    Unsupported(UnsupportedBaud),
}

impl fmt::Display for ParseBaudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(s) => write!(f, "invalid baud rate '{s}'"),
            Self::Unsupported(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for ParseBaudError {}

impl From<UnsupportedBaud> for ParseBaudError {
    fn from(e: UnsupportedBaud) -> Self {
        Self::Unsupported(e)
    }
}

impl std::str::FromStr for BaudRate {
    type Err = ParseBaudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|_| ParseBaudError::Invalid(s.to_string()))?;
        Ok(Self::try_from(value)?)
    }
}

/// A fault reported by the receiver for a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineError {
    Overrun,
    Parity,
    Framing,
    Break,
}

impl LineError {
    /// Bit this fault occupies in an [`ErrorSource`] register.
    pub fn mask(self) -> u32 {
        match self {
            Self::Overrun => 1 << 0,
            Self::Parity => 1 << 1,
            Self::Framing => 1 << 2,
            Self::Break => 1 << 3,
        }
    }
}

/// Raw error-source register, laid out like the nRF52 UARTE `ERRORSRC`.
///
/// Bits outside the four known sources are carried but ignored by [`ErrorSource::errors`].
/// A watchdog runtime consumes these through its `report_line_errors` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorSource(pub u32);

impl ErrorSource {
    const ORDER: [LineError; 4] = [
        LineError::Overrun,
        LineError::Parity,
        LineError::Framing,
        LineError::Break,
    ];

    pub fn contains(self, error: LineError) -> bool {
        self.0 & error.mask() != 0
    }

    pub fn is_empty(self) -> bool {
        Self::ORDER.iter().all(|e| !self.contains(*e))
    }

    pub fn errors(self) -> impl Iterator<Item = LineError> {
        Self::ORDER.into_iter().filter(move |e| self.contains(*e))
    }
}

impl FromIterator<LineError> for ErrorSource {
    fn from_iter<I: IntoIterator<Item = LineError>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |acc, e| acc | e.mask()))
    }
}
