//! End-to-end runs of the station against an in-memory wire.

use std::time::{Duration, Instant};

use groundlink::{
    config::{PinMap, StationConfig},
    decay::DecayPlan,
    link::MemoryWire,
    logging::{MemorySink, RecordKind},
    safety::Band,
    types::{ChannelId, ValveId, ValveState},
    GroundStation, StationUpdate,
};

fn station_on_wire(config: StationConfig) -> (GroundStation<MemorySink>, MemoryWire) {
    let wire = MemoryWire::new();
    let mut station = GroundStation::new(config, MemorySink::new());
    station.configure("mem0", 115200).expect("supported baud");
    station
        .connect_with(Box::new(wire.transport()))
        .expect("link opens");
    (station, wire)
}

fn pump_until(
    station: &mut GroundStation<MemorySink>,
    want: impl Fn(&[StationUpdate]) -> bool,
) -> Vec<StationUpdate> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut updates = Vec::new();
    while !want(&updates) && Instant::now() < deadline {
        updates.extend(station.pump());
        std::thread::sleep(Duration::from_millis(5));
    }
    updates
}

#[test]
fn valve_status_line_under_identity_map() {
    let config = StationConfig {
        pin_map: PinMap::identity(),
        ..StationConfig::default()
    };
    let (mut station, wire) = station_on_wire(config);
    wire.push_line("PS101100100");

    let updates = pump_until(&mut station, |u| u.len() >= 9);
    let valves: Vec<(ValveId, ValveState)> = updates
        .iter()
        .filter_map(|u| match u {
            StationUpdate::Valve { valve, state } => Some((*valve, *state)),
            _ => None,
        })
        .collect();

    let expected: Vec<(ValveId, ValveState)> = "101100100"
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let state = if c == '1' {
                ValveState::Open
            } else {
                ValveState::Closed
            };
            (ValveId(i as u8 + 1), state)
        })
        .collect();
    assert_eq!(valves, expected);
    assert_eq!(station.valves().state(ValveId(7)), Some(ValveState::Open));
    assert_eq!(station.valves().label(ValveId(3)), "HIGH PRESS");
}

#[test]
fn pressure_line_is_mapped_and_banded() {
    let (mut station, wire) = station_on_wire(StationConfig::default());
    wire.push_line("12, 405, 600, 10");

    let updates = pump_until(&mut station, |u| {
        u.iter()
            .filter(|u| matches!(u, StationUpdate::Pressure { .. }))
            .count()
            >= 4
    });
    let bands: Vec<(ChannelId, i32, Band)> = updates
        .iter()
        .filter_map(|u| match u {
            StationUpdate::Pressure {
                channel,
                value,
                band,
            } => Some((*channel, *value, *band)),
            _ => None,
        })
        .collect();

    assert_eq!(
        bands,
        vec![
            (ChannelId(1), 12, Band::Safe),
            (ChannelId(3), 405, Band::Caution),
            (ChannelId(2), 600, Band::Danger),
            (ChannelId(4), 10, Band::Safe),
        ]
    );
}

#[test]
fn decay_on_constant_pressure_averages_zero() {
    let (mut station, wire) = station_on_wire(StationConfig::default());
    wire.push_line("100, 100, 100");
    pump_until(&mut station, |u| {
        u.iter()
            .filter(|u| matches!(u, StationUpdate::Pressure { .. }))
            .count()
            >= 3
    });

    let t0 = Instant::now();
    let plan = DecayPlan {
        iterations: 2,
        interval: Duration::from_secs(1),
        channels: vec![ChannelId(1), ChannelId(2), ChannelId(3)],
    };
    station.start_decay(Some(plan), t0).expect("decay starts");
    assert!(station.decay().is_active());

    assert!(station.poll_timers(t0 + Duration::from_millis(999)).is_empty());
    assert!(!station.poll_timers(t0 + Duration::from_secs(1)).is_empty());
    assert!(station.decay().is_active());
    station.poll_timers(t0 + Duration::from_secs(2));

    assert!(!station.decay().is_active());
    assert_eq!(
        station.decay().session().averages,
        vec![
            (ChannelId(1), Some(0.0)),
            (ChannelId(2), Some(0.0)),
            (ChannelId(3), Some(0.0)),
        ]
    );
    let system = station.sink().messages(RecordKind::System);
    assert!(system.contains(&"Averages (PSI): PT1-0.00 PT2-0.00 PT3-0.00"));
    assert!(system.contains(&"Decay Test Complete."));
}

#[test]
fn replayed_capture_feeds_data_log() {
    let (mut station, wire) = station_on_wire(StationConfig::default());
    wire.push_inbound(b"noise\r\nPS000000000\r\n150, 160\r\n");
    pump_until(&mut station, |u| {
        u.iter()
            .any(|u| matches!(u, StationUpdate::Pressure { value: 160, .. }))
    });
    station.shutdown();

    assert_eq!(
        station.sink().messages(RecordKind::Data),
        vec!["noise", "PS000000000", "150, 160"]
    );
    assert!(wire.is_closed());
}
