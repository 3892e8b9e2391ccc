use core::fmt;

/// Logical solenoid valve, `SV1`..`SV9`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValveId(pub u8);

impl fmt::Display for ValveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SV{}", self.0)
    }
}

/// Logical pressure transducer, `PT1`..`PT9`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PT{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValveState {
    Open,
    Closed,
}

impl ValveState {
    pub fn from_status_char(status: char) -> Option<Self> {
        match status {
            '1' => Some(Self::Open),
            '0' => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitored line a trend window is kept for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrendLine {
    Fuel,
    Oxidizer,
}

impl TrendLine {
    pub const ALL: [TrendLine; 2] = [TrendLine::Fuel, TrendLine::Oxidizer];

    pub fn label(self) -> &'static str {
        match self {
            Self::Fuel => "Fuel",
            Self::Oxidizer => "Ox",
        }
    }
}
