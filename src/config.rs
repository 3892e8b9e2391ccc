use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    error::ConfigError,
    safety::Thresholds,
    types::{ChannelId, TrendLine, ValveId},
};

pub const VALVE_COUNT: usize = 9;
pub const BAUD_RATES: [u32; 2] = [9600, 115200];
pub const DEFAULT_BAUD: u32 = 115200;

// Logical valve i is driven by physical pin DEFAULT_PIN_MAP[i - 1].
pub const DEFAULT_PIN_MAP: [u8; VALVE_COUNT] = [1, 2, 3, 4, 5, 6, 8, 7, 9];
// Field i of a pressure line belongs to PT{DEFAULT_ANALOG_MAP[i]}.
pub const DEFAULT_ANALOG_MAP: [u8; VALVE_COUNT] = [1, 3, 2, 4, 5, 6, 7, 8, 9];

pub const FUEL_CHANNEL: u8 = 2;
pub const OXIDIZER_CHANNEL: u8 = 3;

pub const TREND_CAPACITY: usize = 600;
pub const TREND_DISPLAY: usize = 100;
pub const TREND_RATE_SAMPLES: usize = 12;

pub const DECAY_ITERATIONS: u32 = 5;
pub const DECAY_INTERVAL_SECS: u64 = 60;
pub const DECAY_CHANNELS: [u8; 3] = [1, 2, 3];

pub const READ_TIMEOUT_MS: u64 = 50;
pub const WRITE_TIMEOUT_MS: u64 = 100;
// Keep draining in one critical section while more than this many bytes wait.
pub const DRAIN_BACKLOG_BYTES: u32 = 8;

const DEFAULT_VALVE_LABELS: [&str; VALVE_COUNT] = [
    "CVENT",
    "N/A",
    "HIGH PRESS",
    "FUEL VENT",
    "N/A",
    "NITRO VENT",
    "P VENT",
    "NITRO MAIN",
    "FUEL MAIN",
];

/// Bijective valve-to-pin assignment plus its read-side inverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinMap {
    write: [u8; VALVE_COUNT],
    read: [u8; VALVE_COUNT],
}

impl PinMap {
    pub fn new(write: [u8; VALVE_COUNT]) -> Result<Self, ConfigError> {
        let mut seen = [false; VALVE_COUNT];
        for &pin in &write {
            let slot = usize::from(pin)
                .checked_sub(1)
                .filter(|slot| *slot < VALVE_COUNT)
                .ok_or_else(|| ConfigError::PinMap(write.to_vec()))?;
            if std::mem::replace(&mut seen[slot], true) {
                return Err(ConfigError::PinMap(write.to_vec()));
            }
        }
        Ok(Self {
            write,
            read: invert(write),
        })
    }

    pub fn identity() -> Self {
        let mut write = [0u8; VALVE_COUNT];
        for (idx, pin) in write.iter_mut().enumerate() {
            *pin = (idx + 1) as u8;
        }
        Self { write, read: write }
    }

    /// Physical pin digit driving `valve`.
    pub fn physical_pin(&self, valve: ValveId) -> Option<u8> {
        let idx = usize::from(valve.0).checked_sub(1)?;
        self.write.get(idx).copied()
    }

    /// Logical valve reported at 1-based status `position` of a valve line.
    pub fn valve_at_position(&self, position: usize) -> Option<ValveId> {
        let idx = position.checked_sub(1)?;
        self.read.get(idx).copied().map(ValveId)
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            write: DEFAULT_PIN_MAP,
            read: DEFAULT_READ_MAP,
        }
    }
}

const DEFAULT_READ_MAP: [u8; VALVE_COUNT] = invert(DEFAULT_PIN_MAP);

/// Read-side table for a write table: `read[pin - 1]` is the valve driven by
/// `pin`. Assumes `write` is already a permutation of `1..=9`.
const fn invert(write: [u8; VALVE_COUNT]) -> [u8; VALVE_COUNT] {
    let mut read = [0u8; VALVE_COUNT];
    let mut idx = 0;
    while idx < VALVE_COUNT {
        read[(write[idx] - 1) as usize] = (idx + 1) as u8;
        idx += 1;
    }
    read
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalogMap {
    channels: Vec<u8>,
}

impl AnalogMap {
    pub fn new(channels: Vec<u8>) -> Result<Self, ConfigError> {
        if channels.is_empty() {
            return Err(ConfigError::EmptyAnalogMap);
        }
        if let Some(&bad) = channels
            .iter()
            .find(|&&c| c == 0 || usize::from(c) > VALVE_COUNT)
        {
            return Err(ConfigError::AnalogChannel(bad));
        }
        Ok(Self { channels })
    }

    pub fn identity() -> Self {
        Self {
            channels: (1..=VALVE_COUNT as u8).collect(),
        }
    }

    pub fn channel_for_field(&self, field: usize) -> Option<ChannelId> {
        self.channels.get(field).copied().map(ChannelId)
    }
}

impl Default for AnalogMap {
    fn default() -> Self {
        Self {
            channels: DEFAULT_ANALOG_MAP.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendSettings {
    pub capacity: usize,
    pub display: usize,
    pub rate_samples: usize,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            capacity: TREND_CAPACITY,
            display: TREND_DISPLAY,
            rate_samples: TREND_RATE_SAMPLES,
        }
    }
}

impl TrendSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_samples == 0 || self.rate_samples * 2 > self.capacity {
            return Err(ConfigError::TrendWindow(format!(
                "rate_samples {} must be non-zero and fit twice in capacity {}",
                self.rate_samples, self.capacity
            )));
        }
        if self.display == 0 || self.display > self.capacity {
            return Err(ConfigError::TrendWindow(format!(
                "display {} must be within 1..={}",
                self.display, self.capacity
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecaySettings {
    pub iterations: u32,
    pub interval: Duration,
    pub channels: Vec<ChannelId>,
}

impl Default for DecaySettings {
    fn default() -> Self {
        Self {
            iterations: DECAY_ITERATIONS,
            interval: Duration::from_secs(DECAY_INTERVAL_SECS),
            channels: DECAY_CHANNELS.iter().copied().map(ChannelId).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub drain_backlog_bytes: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(WRITE_TIMEOUT_MS),
            drain_backlog_bytes: DRAIN_BACKLOG_BYTES,
        }
    }
}

/// Raw TOML layout. Every field is optional; missing ones fall back to the
/// test-stand defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub pin_map: Option<[u8; VALVE_COUNT]>,
    pub analog_map: Option<Vec<u8>>,
    pub thresholds: Thresholds,
    pub trend: TrendSettings,
    pub fuel_channel: Option<u8>,
    pub oxidizer_channel: Option<u8>,
    pub decay_iterations: Option<u32>,
    pub decay_interval_secs: Option<u64>,
    pub decay_channels: Option<Vec<u8>>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub drain_backlog_bytes: Option<u32>,
    pub valve_labels: Option<Vec<String>>,
    pub log_dir: Option<PathBuf>,
}

/// Immutable station configuration, resolved once at startup and passed
/// explicitly to everything that needs it.
#[derive(Clone, Debug, PartialEq)]
pub struct StationConfig {
    pub pin_map: PinMap,
    pub analog_map: AnalogMap,
    pub thresholds: Thresholds,
    pub trend: TrendSettings,
    pub fuel_channel: ChannelId,
    pub oxidizer_channel: ChannelId,
    pub decay: DecaySettings,
    pub link: LinkSettings,
    pub valve_labels: Vec<String>,
    pub log_dir: PathBuf,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            pin_map: PinMap::default(),
            analog_map: AnalogMap::default(),
            thresholds: Thresholds::default(),
            trend: TrendSettings::default(),
            fuel_channel: ChannelId(FUEL_CHANNEL),
            oxidizer_channel: ChannelId(OXIDIZER_CHANNEL),
            decay: DecaySettings::default(),
            link: LinkSettings::default(),
            valve_labels: DEFAULT_VALVE_LABELS.iter().map(|s| s.to_string()).collect(),
            log_dir: PathBuf::from("log"),
        }
    }
}

impl StationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        Ok(Self::resolve(file)?)
    }

    pub fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pin_map = match file.pin_map {
            Some(map) => PinMap::new(map)?,
            None => defaults.pin_map,
        };
        let analog_map = match file.analog_map {
            Some(map) => AnalogMap::new(map)?,
            None => defaults.analog_map,
        };
        file.thresholds.validate()?;
        file.trend.validate()?;

        let fuel_channel = checked_channel(file.fuel_channel, defaults.fuel_channel)?;
        let oxidizer_channel = checked_channel(file.oxidizer_channel, defaults.oxidizer_channel)?;

        let mut decay = defaults.decay;
        if let Some(iterations) = file.decay_iterations {
            if iterations == 0 {
                return Err(ConfigError::Decay("iterations must be >= 1".into()));
            }
            decay.iterations = iterations;
        }
        if let Some(secs) = file.decay_interval_secs {
            if secs == 0 {
                return Err(ConfigError::Decay("interval must be >= 1 second".into()));
            }
            decay.interval = Duration::from_secs(secs);
        }
        if let Some(channels) = file.decay_channels {
            decay.channels = channels
                .into_iter()
                .map(|c| checked_channel(Some(c), ChannelId(c)))
                .collect::<Result<_, _>>()?;
        }

        let mut link = defaults.link;
        if let Some(ms) = file.read_timeout_ms {
            link.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.write_timeout_ms {
            link.write_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = file.drain_backlog_bytes {
            link.drain_backlog_bytes = bytes;
        }

        let valve_labels = match file.valve_labels {
            Some(labels) if labels.len() != VALVE_COUNT => {
                return Err(ConfigError::ValveLabels {
                    expected: VALVE_COUNT,
                    actual: labels.len(),
                })
            }
            Some(labels) => labels,
            None => defaults.valve_labels,
        };

        Ok(Self {
            pin_map,
            analog_map,
            thresholds: file.thresholds,
            trend: file.trend,
            fuel_channel,
            oxidizer_channel,
            decay,
            link,
            valve_labels,
            log_dir: file.log_dir.unwrap_or(defaults.log_dir),
        })
    }

    pub fn trend_channel(&self, line: TrendLine) -> ChannelId {
        match line {
            TrendLine::Fuel => self.fuel_channel,
            TrendLine::Oxidizer => self.oxidizer_channel,
        }
    }

    pub fn trend_line_for(&self, channel: ChannelId) -> Option<TrendLine> {
        TrendLine::ALL
            .into_iter()
            .find(|line| self.trend_channel(*line) == channel)
    }

    pub fn valve_label(&self, valve: ValveId) -> Option<&str> {
        let idx = usize::from(valve.0).checked_sub(1)?;
        self.valve_labels.get(idx).map(String::as_str)
    }
}

fn checked_channel(raw: Option<u8>, fallback: ChannelId) -> Result<ChannelId, ConfigError> {
    match raw {
        Some(c) if c == 0 || usize::from(c) > VALVE_COUNT => Err(ConfigError::AnalogChannel(c)),
        Some(c) => Ok(ChannelId(c)),
        None => Ok(fallback),
    }
}

pub fn is_supported_baud(baud: u32) -> bool {
    BAUD_RATES.contains(&baud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pin_map_swaps_seven_and_eight() {
        let map = PinMap::default();
        assert_eq!(map, PinMap::new(DEFAULT_PIN_MAP).expect("default map is valid"));
        assert_eq!(map.physical_pin(ValveId(7)), Some(8));
        assert_eq!(map.physical_pin(ValveId(8)), Some(7));
        assert_eq!(map.valve_at_position(7), Some(ValveId(8)));
        assert_eq!(map.valve_at_position(8), Some(ValveId(7)));
        assert_eq!(map.valve_at_position(1), Some(ValveId(1)));
    }

    #[test]
    fn default_read_table_follows_pin_constant() {
        let map = PinMap::default();
        for valve in 1..=VALVE_COUNT as u8 {
            let pin = map.physical_pin(ValveId(valve)).expect("pin exists");
            assert_eq!(map.valve_at_position(usize::from(pin)), Some(ValveId(valve)));
        }
    }

    #[test]
    fn pin_map_rejects_non_permutations() {
        assert!(PinMap::new([1, 1, 3, 4, 5, 6, 7, 8, 9]).is_err());
        assert!(PinMap::new([0, 2, 3, 4, 5, 6, 7, 8, 9]).is_err());
        assert!(PinMap::new([1, 2, 3, 4, 5, 6, 7, 8, 10]).is_err());
    }

    #[test]
    fn read_map_inverts_write_map() {
        let map = PinMap::new([9, 5, 7, 6, 2, 1, 8, 3, 4]).expect("valid permutation");
        for valve in 1..=9u8 {
            let pin = map.physical_pin(ValveId(valve)).expect("pin exists");
            assert_eq!(map.valve_at_position(usize::from(pin)), Some(ValveId(valve)));
        }
    }

    #[test]
    fn analog_map_positions() {
        let map = AnalogMap::default();
        assert_eq!(map.channel_for_field(0), Some(ChannelId(1)));
        assert_eq!(map.channel_for_field(1), Some(ChannelId(3)));
        assert_eq!(map.channel_for_field(2), Some(ChannelId(2)));
        assert_eq!(map.channel_for_field(9), None);
        assert!(AnalogMap::new(vec![1, 0]).is_err());
    }

    #[test]
    fn toml_overrides_merge_with_defaults() -> Result<()> {
        let config = StationConfig::from_toml(
            r#"
pin_map = [1, 2, 3, 4, 5, 6, 7, 8, 9]
decay_iterations = 2
decay_interval_secs = 1
log_dir = "/tmp/stand"

[thresholds]
safe_max = 350
"#,
        )?;
        assert_eq!(config.pin_map, PinMap::identity());
        assert_eq!(config.decay.iterations, 2);
        assert_eq!(config.decay.interval, Duration::from_secs(1));
        assert_eq!(config.thresholds.safe_max, 350);
        assert_eq!(config.thresholds.caution_max, 500);
        assert_eq!(config.analog_map, AnalogMap::default());
        assert_eq!(config.log_dir, PathBuf::from("/tmp/stand"));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StationConfig::from_toml("pinmap = []").expect_err("typo must fail");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn trend_lines_follow_channel_assignment() {
        let config = StationConfig::default();
        assert_eq!(config.trend_line_for(ChannelId(2)), Some(TrendLine::Fuel));
        assert_eq!(config.trend_line_for(ChannelId(3)), Some(TrendLine::Oxidizer));
        assert_eq!(config.trend_line_for(ChannelId(1)), None);
        assert_eq!(config.valve_label(ValveId(9)), Some("FUEL MAIN"));
    }

    #[test]
    fn load_reads_file_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stand.toml");
        std::fs::write(&path, "fuel_channel = 4\n")?;
        let config = StationConfig::load(&path)?;
        assert_eq!(config.fuel_channel, ChannelId(4));
        Ok(())
    }
}
