use crate::{
    config::{AnalogMap, PinMap, VALVE_COUNT},
    types::{ChannelId, ValveId, ValveState},
};

pub const VALVE_TAG: &str = "PS";
pub const PRESSURE_SEP: &str = ", ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryRecord {
    Valve { valve: ValveId, state: ValveState },
    Pressure { channel: ChannelId, value: i32 },
}

/// Decodes one inbound line. Anything unrecognised, and any malformed field,
/// is dropped without error; an empty result means the line carried nothing
/// usable.
pub fn decode_telemetry(
    line: &str,
    pin_map: &PinMap,
    analog_map: &AnalogMap,
) -> Vec<TelemetryRecord> {
    let line = line.trim_end_matches(['\r', '\n']);

    // A valve line may contain the pressure separator by coincidence; the tag
    // is checked first.
    if let Some(idx) = line.find(VALVE_TAG) {
        return decode_valve_states(&line[idx + VALVE_TAG.len()..], pin_map);
    }
    if line.contains(PRESSURE_SEP) {
        return decode_pressures(line, analog_map);
    }
    Vec::new()
}

fn decode_valve_states(statuses: &str, pin_map: &PinMap) -> Vec<TelemetryRecord> {
    statuses
        .trim()
        .chars()
        .take(VALVE_COUNT)
        .enumerate()
        .filter_map(|(idx, status)| {
            let state = ValveState::from_status_char(status)?;
            let valve = pin_map.valve_at_position(idx + 1)?;
            Some(TelemetryRecord::Valve { valve, state })
        })
        .collect()
}

fn decode_pressures(line: &str, analog_map: &AnalogMap) -> Vec<TelemetryRecord> {
    line.split(PRESSURE_SEP)
        .enumerate()
        .filter_map(|(idx, field)| {
            let channel = analog_map.channel_for_field(idx)?;
            let value = field.trim().parse::<i32>().ok()?;
            Some(TelemetryRecord::Pressure { channel, value })
        })
        .collect()
}
