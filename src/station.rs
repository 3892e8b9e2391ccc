use core::fmt;
use std::{
    sync::mpsc::{Receiver, TryRecvError},
    time::Instant,
};

use crate::{
    config::{StationConfig, VALVE_COUNT},
    decay::{DecayApplyResult, DecayEngine, DecayPlan, DecayReport, ValueSource},
    error::{CommandError, FrameError, LinkStateError, SessionError, TransportError},
    link::{LinkState, LinkWorker, SerialLink, Transport, WorkerEvent},
    logging::ReportSink,
    protocol::{
        decode_telemetry, encode_command, encode_valves, CommandFrame, ReservedCommand,
        TelemetryRecord,
    },
    safety::Band,
    sequence::{LaunchSequence, StageChange},
    trend::{format_rate, TrendBuffer},
    types::{ChannelId, TrendLine, ValveId, ValveState},
};

/// What changed after a pump or timer poll, for whoever renders the station.
#[derive(Clone, Debug, PartialEq)]
pub enum StationUpdate {
    Valve {
        valve: ValveId,
        state: ValveState,
    },
    Pressure {
        channel: ChannelId,
        value: i32,
        band: Band,
    },
    Rate {
        line: TrendLine,
        rate: Option<f64>,
    },
    Decay(DecayReport),
    /// The link failed and has been torn down.
    LinkFault(TransportError),
}

impl fmt::Display for StationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valve { valve, state } => write!(f, "{valve}: {state}"),
            Self::Pressure {
                channel,
                value,
                band,
            } => write!(f, "{channel}: {value} [{band}]"),
            Self::Rate { line, rate } => write!(f, "{} {}", line.label(), format_rate(*rate)),
            Self::Decay(report) => write!(f, "{report}"),
            Self::LinkFault(err) => write!(f, "link failure: {err}"),
        }
    }
}

/// Last known state of every solenoid valve plus the operator labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValveBoard {
    states: [Option<ValveState>; VALVE_COUNT],
    labels: Vec<String>,
}

impl ValveBoard {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            states: [None; VALVE_COUNT],
            labels,
        }
    }

    fn slot(valve: ValveId) -> Option<usize> {
        usize::from(valve.0)
            .checked_sub(1)
            .filter(|idx| *idx < VALVE_COUNT)
    }

    pub fn set(&mut self, valve: ValveId, state: ValveState) {
        if let Some(idx) = Self::slot(valve) {
            self.states[idx] = Some(state);
        }
    }

    pub fn state(&self, valve: ValveId) -> Option<ValveState> {
        Self::slot(valve).and_then(|idx| self.states[idx])
    }

    pub fn label(&self, valve: ValveId) -> &str {
        Self::slot(valve)
            .and_then(|idx| self.labels.get(idx))
            .map_or("N/A", String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValveId, Option<ValveState>)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (ValveId(idx as u8 + 1), *state))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PressureReading {
    pub channel: ChannelId,
    pub value: i32,
    pub band: Band,
    pub received_at: Instant,
}

/// Latest reading per transducer.
#[derive(Clone, Debug, Default)]
pub struct Readings {
    latest: [Option<PressureReading>; VALVE_COUNT],
}

impl Readings {
    fn slot(channel: ChannelId) -> Option<usize> {
        usize::from(channel.0)
            .checked_sub(1)
            .filter(|idx| *idx < VALVE_COUNT)
    }

    pub fn get(&self, channel: ChannelId) -> Option<&PressureReading> {
        Self::slot(channel).and_then(|idx| self.latest[idx].as_ref())
    }

    fn store(&mut self, reading: PressureReading) {
        if let Some(idx) = Self::slot(reading.channel) {
            self.latest[idx] = Some(reading);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PressureReading> {
        self.latest.iter().flatten()
    }
}

impl ValueSource for Readings {
    fn current_value(&self, channel: ChannelId) -> Option<i32> {
        self.get(channel).map(|r| r.value)
    }
}

struct ActiveLink {
    worker: LinkWorker,
    events: Receiver<WorkerEvent>,
    opened_at: Instant,
}

/// The interactive side of the ground station: owns the link, everything
/// derived from telemetry, the decay test and the launch checklist.
pub struct GroundStation<S: ReportSink> {
    config: StationConfig,
    link_state: LinkState,
    active: Option<ActiveLink>,
    valves: ValveBoard,
    readings: Readings,
    trends: TrendBuffer,
    decay: DecayEngine,
    sequence: LaunchSequence,
    sink: S,
    closed: bool,
}

impl<S: ReportSink> GroundStation<S> {
    pub fn new(config: StationConfig, sink: S) -> Self {
        Self {
            valves: ValveBoard::new(config.valve_labels.clone()),
            trends: TrendBuffer::new(config.trend),
            config,
            link_state: LinkState::default(),
            active: None,
            readings: Readings::default(),
            decay: DecayEngine::new(),
            sequence: LaunchSequence::new(),
            sink,
            closed: false,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn link_state(&self) -> &LinkState {
        &self.link_state
    }

    pub fn valves(&self) -> &ValveBoard {
        &self.valves
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn trends(&self) -> &TrendBuffer {
        &self.trends
    }

    pub fn decay(&self) -> &DecayEngine {
        &self.decay
    }

    pub fn sequence(&self) -> &LaunchSequence {
        &self.sequence
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn configure(&mut self, port: &str, baud: u32) -> Result<(), LinkStateError> {
        self.link_state.configure(port, baud)?;
        self.sink
            .system(&format!("Serial settings: {port} @ {baud} baud"));
        Ok(())
    }

    /// Opens the configured serial port and starts the worker on it.
    pub fn connect(&mut self) -> Result<(), LinkStateError> {
        let settings = self.link_state.begin_connect()?.clone();
        let link = match SerialLink::open(&settings.port, settings.baud, &self.config.link) {
            Ok(link) => link,
            Err(err) => {
                self.sink.warn(&err.to_string());
                return Err(err.into());
            }
        };
        self.connect_with(Box::new(link))
    }

    /// Starts the worker on an already open transport.
    pub fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<(), LinkStateError> {
        let settings = self.link_state.begin_connect()?.clone();
        let (worker, events) = LinkWorker::spawn(transport, &self.config.link);
        self.active = Some(ActiveLink {
            worker,
            events,
            opened_at: Instant::now(),
        });
        self.link_state.mark_connected();
        self.sink.system(&format!(
            "Connected to {} @ {} baud",
            settings.port, settings.baud
        ));
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), LinkStateError> {
        self.link_state.mark_disconnected()?;
        self.teardown_link();
        self.sink.system("Serial link closed");
        Ok(())
    }

    fn teardown_link(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.worker.shutdown();
        }
    }

    fn require_link(&self) -> Result<&ActiveLink, LinkStateError> {
        if !self.link_state.is_configured() {
            return Err(LinkStateError::NotConfigured);
        }
        match &self.active {
            Some(active) if self.link_state.is_connected() => Ok(active),
            _ => Err(LinkStateError::NotConnected),
        }
    }

    fn transmit(&mut self, frame: &CommandFrame) -> Result<(), CommandError> {
        let active = self.require_link()?;
        let sender = active.worker.sender();
        match sender.send_toggle(frame) {
            Ok(()) => {
                self.sink.system(&format!("Send: {frame}"));
                Ok(())
            }
            Err(err) => {
                self.sink.warn(&format!("Send failed: {frame}: {err}"));
                Err(err.into())
            }
        }
    }

    fn warn_duplicate(&mut self, err: &FrameError) {
        if let FrameError::DuplicatePin(pin) = err {
            self.sink.warn(&format!("Duplicate pin in command: {pin}"));
        }
    }

    /// Encodes the pin string and sends it. Nothing is transmitted when the
    /// frame is rejected.
    pub fn send_command(&mut self, pins: &str) -> Result<CommandFrame, CommandError> {
        self.require_link()?;
        let frame = encode_command(pins).inspect_err(|err| self.warn_duplicate(err))?;
        self.transmit(&frame)?;
        Ok(frame)
    }

    /// Toggles logical valves, translated through the pin map.
    pub fn toggle_valves(&mut self, valves: &[ValveId]) -> Result<CommandFrame, CommandError> {
        self.require_link()?;
        let frame = encode_valves(valves, &self.config.pin_map)
            .inspect_err(|err| self.warn_duplicate(err))?;
        self.transmit(&frame)?;
        Ok(frame)
    }

    pub fn abort(&mut self) -> Result<(), CommandError> {
        if self.sequence.is_aborted() {
            return Err(CommandError::Aborted);
        }
        self.transmit(&ReservedCommand::Abort.frame())?;
        self.sequence.abort();
        self.sink.system(&StageChange::Aborted.to_string());
        Ok(())
    }

    fn require_armed(&self) -> Result<(), CommandError> {
        if self.sequence.is_aborted() {
            return Err(CommandError::Aborted);
        }
        if !self.sequence.at_final_stage() {
            return Err(CommandError::NotArmed(self.sequence.stage().as_str()));
        }
        Ok(())
    }

    pub fn fire_main_valves(&mut self) -> Result<(), CommandError> {
        self.require_armed()?;
        self.transmit(&ReservedCommand::MainValveFire.frame())?;
        self.sink.system("Main valve actuation executed.");
        Ok(())
    }

    pub fn ignite(&mut self) -> Result<(), CommandError> {
        self.require_armed()?;
        self.transmit(&ReservedCommand::Ignite.frame())?;
        self.sink.system("Ignition command sent.");
        Ok(())
    }

    pub fn advance(&mut self) -> Option<StageChange> {
        let change = self.sequence.advance()?;
        self.sink.system(&change.to_string());
        Some(change)
    }

    pub fn retreat(&mut self) -> Option<StageChange> {
        let change = self.sequence.retreat()?;
        self.sink.system(&change.to_string());
        Some(change)
    }

    /// Drains everything the worker has produced so far.
    pub fn pump(&mut self) -> Vec<StationUpdate> {
        let mut updates = Vec::new();
        loop {
            let Some(active) = &self.active else {
                break;
            };
            let event = match active.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.lose_link(TransportError::Closed, &mut updates);
                    break;
                }
            };
            match event {
                WorkerEvent::Line(line) => self.handle_line(&line, &mut updates),
                WorkerEvent::Fault(err) => {
                    self.lose_link(err, &mut updates);
                    break;
                }
                // Only reached when the worker could not start its thread.
                WorkerEvent::Stopped => {
                    self.lose_link(TransportError::Closed, &mut updates);
                    break;
                }
            }
        }
        updates
    }

    fn lose_link(&mut self, err: TransportError, updates: &mut Vec<StationUpdate>) {
        self.teardown_link();
        let _ = self.link_state.mark_disconnected();
        self.sink.warn(&format!("Serial link failure: {err}"));
        updates.push(StationUpdate::LinkFault(err));
    }

    fn handle_line(&mut self, line: &str, updates: &mut Vec<StationUpdate>) {
        let text = line.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return;
        }
        self.sink.data(text);
        let records = decode_telemetry(text, &self.config.pin_map, &self.config.analog_map);
        let now = Instant::now();
        for record in records {
            match record {
                TelemetryRecord::Valve { valve, state } => {
                    self.valves.set(valve, state);
                    updates.push(StationUpdate::Valve { valve, state });
                }
                TelemetryRecord::Pressure { channel, value } => {
                    self.apply_pressure(channel, value, now, updates);
                }
            }
        }
    }

    fn apply_pressure(
        &mut self,
        channel: ChannelId,
        value: i32,
        now: Instant,
        updates: &mut Vec<StationUpdate>,
    ) {
        let band = self.config.thresholds.classify(value);
        self.readings.store(PressureReading {
            channel,
            value,
            band,
            received_at: now,
        });
        updates.push(StationUpdate::Pressure {
            channel,
            value,
            band,
        });

        let Some(line) = self.config.trend_line_for(channel) else {
            return;
        };
        let t_secs = self
            .active
            .as_ref()
            .map_or(0.0, |a| now.saturating_duration_since(a.opened_at).as_secs_f64());
        self.trends.push(line, t_secs, value);
        updates.push(StationUpdate::Rate {
            line,
            rate: self.trends.rolling_rate(line),
        });
    }

    /// Value shown for `channel`, `None` until a reading has arrived.
    pub fn current_value(&self, channel: ChannelId) -> Option<i32> {
        self.readings.current_value(channel)
    }

    fn log_decay(&mut self, result: &DecayApplyResult) -> Vec<StationUpdate> {
        for report in &result.reports {
            for line in report.to_string().lines() {
                self.sink.system(line);
            }
        }
        result
            .reports
            .iter()
            .cloned()
            .map(StationUpdate::Decay)
            .collect()
    }

    /// Starts a decay test; `plan` defaults to the configured one.
    pub fn start_decay(
        &mut self,
        plan: Option<DecayPlan>,
        now: Instant,
    ) -> Result<Vec<StationUpdate>, SessionError> {
        let plan = plan.unwrap_or_else(|| DecayPlan::from(&self.config.decay));
        let ready = self.link_state.is_ready();
        let result = self.decay.start(plan, ready, &self.readings, now)?;
        Ok(self.log_decay(&result))
    }

    pub fn cancel_decay(&mut self) -> Result<Vec<StationUpdate>, SessionError> {
        let result = self.decay.cancel()?;
        Ok(self.log_decay(&result))
    }

    /// Fires any timer that is due at `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<StationUpdate> {
        match self.decay.poll(now, &self.readings) {
            Some(result) => self.log_decay(&result),
            None => Vec::new(),
        }
    }

    /// Operator summary of the link, checklist, valves and pressures.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let link = match self.link_state.settings() {
            Some(s) if self.link_state.is_connected() => {
                format!("link: {} @ {} (open)", s.port, s.baud)
            }
            Some(s) => format!("link: {} @ {} (closed)", s.port, s.baud),
            None => "link: not configured".to_string(),
        };
        lines.push(link);
        let aborted = if self.sequence.is_aborted() {
            " (ABORTED)"
        } else {
            ""
        };
        lines.push(format!("stage: {}{aborted}", self.sequence.stage()));
        for (valve, state) in self.valves.iter() {
            let state = state.map_or("UNKNOWN", ValveState::as_str);
            lines.push(format!("{valve} {}: {state}", self.valves.label(valve)));
        }
        for reading in self.readings.iter() {
            lines.push(format!(
                "{}: {} [{}]",
                reading.channel, reading.value, reading.band
            ));
        }
        for line in TrendLine::ALL {
            lines.push(format!(
                "{} {}",
                line.label(),
                format_rate(self.trends.rolling_rate(line))
            ));
        }
        if self.decay.is_active() {
            lines.push(format!(
                "decay: running, {} iterations left",
                self.decay.session().remaining
            ));
        }
        lines
    }

    /// Stops the worker, closes the link and ends the log session.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.decay.is_active() {
            if let Ok(result) = self.decay.cancel() {
                self.log_decay(&result);
            }
        }
        if self.active.is_some() {
            self.teardown_link();
            let _ = self.link_state.mark_disconnected();
        }
        self.sink.close();
    }
}

impl<S: ReportSink> Drop for GroundStation<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
