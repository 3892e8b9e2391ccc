use core::fmt;
use core::ops::RangeInclusive;

use serde::Deserialize;

use crate::error::ConfigError;

pub const SAFE_MIN_PSI: i32 = -1000;
pub const SAFE_MAX_PSI: i32 = 400;
pub const CAUTION_MAX_PSI: i32 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Band {
    Safe,
    Caution,
    Danger,
}

impl Band {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Danger => "DANGER",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static pressure bands. SAFE is `safe_min..=safe_max`, CAUTION runs from
/// `safe_max + 1` through `caution_max`, everything else is DANGER.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub safe_min: i32,
    pub safe_max: i32,
    pub caution_max: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            safe_min: SAFE_MIN_PSI,
            safe_max: SAFE_MAX_PSI,
            caution_max: CAUTION_MAX_PSI,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.safe_min > self.safe_max || self.safe_max >= self.caution_max {
            return Err(ConfigError::Thresholds(format!(
                "need safe_min <= safe_max < caution_max, got {} / {} / {}",
                self.safe_min, self.safe_max, self.caution_max
            )));
        }
        Ok(())
    }

    pub fn safe(&self) -> RangeInclusive<i32> {
        self.safe_min..=self.safe_max
    }

    pub fn caution(&self) -> RangeInclusive<i32> {
        self.safe_max.saturating_add(1)..=self.caution_max
    }

    pub fn classify(&self, value: i32) -> Band {
        if self.safe().contains(&value) {
            Band::Safe
        } else if self.caution().contains(&value) {
            Band::Caution
        } else {
            Band::Danger
        }
    }
}

/// Classifies against the default bands.
pub fn classify(value: i32) -> Band {
    Thresholds::default().classify(value)
}
