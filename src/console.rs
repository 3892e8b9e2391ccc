use std::{
    io::{BufRead, Write},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use thiserror::Error;

use crate::{
    decay::DecayPlan,
    logging::ReportSink,
    station::{GroundStation, StationUpdate},
    types::ValveId,
};

const TICK: Duration = Duration::from_millis(20);

pub const HELP: &str = "\
commands:
  send <pins>        toggle physical pins, e.g. send 136
  toggle <SV...>     toggle logical valves, e.g. toggle 7 8
  abort              send the abort command
  fire               actuate main valves (FIRE stage only)
  ignite             send ignition (FIRE stage only)
  decay [N [S]]      start a decay test, N samples S seconds apart
  decay stop         end the running decay test
  advance | back     step the launch checklist
  status             print link, valves and pressures
  quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    Send(String),
    Toggle(Vec<ValveId>),
    Abort,
    Fire,
    Ignite,
    Decay {
        iterations: Option<u32>,
        interval_secs: Option<u64>,
    },
    DecayStop,
    Advance,
    Back,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a valid number")]
    BadNumber(String),
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, ParseError> {
    raw.parse()
        .map_err(|_| ParseError::BadNumber(raw.to_string()))
}

pub fn parse_command(line: &str) -> Result<OperatorCommand, ParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(ParseError::Empty);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "send" => {
            let pins = args.first().ok_or(ParseError::MissingArgument("send"))?;
            OperatorCommand::Send((*pins).to_string())
        }
        "toggle" => {
            if args.is_empty() {
                return Err(ParseError::MissingArgument("toggle"));
            }
            let valves = args
                .iter()
                .map(|raw| {
                    let digits = raw.trim_start_matches(['S', 's', 'V', 'v']);
                    number::<u8>(digits).map(ValveId)
                })
                .collect::<Result<_, _>>()?;
            OperatorCommand::Toggle(valves)
        }
        "abort" => OperatorCommand::Abort,
        "fire" => OperatorCommand::Fire,
        "ignite" => OperatorCommand::Ignite,
        "decay" => match args.as_slice() {
            ["stop"] => OperatorCommand::DecayStop,
            [] => OperatorCommand::Decay {
                iterations: None,
                interval_secs: None,
            },
            [n] => OperatorCommand::Decay {
                iterations: Some(number(n)?),
                interval_secs: None,
            },
            [n, s, ..] => OperatorCommand::Decay {
                iterations: Some(number(n)?),
                interval_secs: Some(number(s)?),
            },
        },
        "advance" | "next" => OperatorCommand::Advance,
        "back" => OperatorCommand::Back,
        "status" => OperatorCommand::Status,
        "help" | "?" => OperatorCommand::Help,
        "quit" | "exit" => OperatorCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Continue(Vec<String>),
    Quit,
}

/// Runs one operator command. Refusals come back as output lines; they never
/// end the session.
pub fn execute<S: ReportSink>(
    station: &mut GroundStation<S>,
    command: OperatorCommand,
    now: Instant,
) -> Step {
    let mut out = Vec::new();
    match command {
        OperatorCommand::Send(pins) => {
            if let Err(err) = station.send_command(&pins) {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Toggle(valves) => {
            if let Err(err) = station.toggle_valves(&valves) {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Abort => {
            if let Err(err) = station.abort() {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Fire => {
            if let Err(err) = station.fire_main_valves() {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Ignite => {
            if let Err(err) = station.ignite() {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Decay {
            iterations,
            interval_secs,
        } => {
            let mut plan = DecayPlan::from(&station.config().decay);
            if let Some(iterations) = iterations {
                plan.iterations = iterations;
            }
            if let Some(secs) = interval_secs {
                plan.interval = Duration::from_secs(secs);
            }
            if let Err(err) = station.start_decay(Some(plan), now) {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::DecayStop => {
            if let Err(err) = station.cancel_decay() {
                out.push(format!("error: {err}"));
            }
        }
        OperatorCommand::Advance => {
            if station.advance().is_none() {
                out.push(format!(
                    "cannot advance from {}",
                    station.sequence().stage()
                ));
            }
        }
        OperatorCommand::Back => {
            if station.retreat().is_none() {
                out.push(format!("cannot go back from {}", station.sequence().stage()));
            }
        }
        OperatorCommand::Status => out.extend(station.status_lines()),
        OperatorCommand::Help => out.push(HELP.to_string()),
        OperatorCommand::Quit => return Step::Quit,
    }
    Step::Continue(out)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleOptions {
    /// Leave the loop after this long.
    pub duration: Option<Duration>,
    /// Leave the loop once the input is exhausted.
    pub exit_on_eof: bool,
}

fn render(out: &mut impl Write, updates: &[StationUpdate]) -> Result<()> {
    for update in updates {
        // Decay reports already went through the report log.
        if matches!(update, StationUpdate::Decay(_)) {
            continue;
        }
        writeln!(out, "{update}")?;
    }
    Ok(())
}

/// Interactive loop: operator input is read on its own thread while this
/// thread pumps telemetry and fires timers.
pub fn run<S, R, W>(
    station: &mut GroundStation<S>,
    input: R,
    out: &mut W,
    options: ConsoleOptions,
) -> Result<()>
where
    S: ReportSink,
    R: BufRead + Send + 'static,
    W: Write,
{
    let (lines_tx, lines_rx) = mpsc::channel();
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else {
                    break;
                };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let started = Instant::now();
    let mut input_open = true;
    loop {
        render(out, &station.pump())?;
        render(out, &station.poll_timers(Instant::now()))?;

        if options
            .duration
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            break;
        }

        if !input_open {
            if options.exit_on_eof {
                break;
            }
            thread::sleep(TICK);
            continue;
        }

        match lines_rx.recv_timeout(TICK) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(err) => {
                        writeln!(out, "error: {err}")?;
                        continue;
                    }
                };
                match execute(station, command, Instant::now()) {
                    Step::Continue(lines) => {
                        for line in lines {
                            writeln!(out, "{line}")?;
                        }
                    }
                    Step::Quit => break,
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => input_open = false,
        }
        out.flush()?;
    }
    render(out, &station.pump())?;
    out.flush()?;
    Ok(())
}
