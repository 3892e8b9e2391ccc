use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::json;

pub const JSON_PATH_ENV: &str = "GROUNDLINK_LOG_JSON_PATH";

const SEPARATOR_WIDTH: usize = 75;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Operator-facing system event.
    System,
    /// Raw inbound telemetry line.
    Data,
    Warning,
}

impl RecordKind {
    fn level(self) -> &'static str {
        match self {
            Self::System => "info",
            Self::Data => "data",
            Self::Warning => "warn",
        }
    }
}

/// Destination for everything the station reports.
pub trait ReportSink {
    fn record(&mut self, kind: RecordKind, message: &str);

    fn system(&mut self, message: &str) {
        self.record(RecordKind::System, message);
    }

    fn data(&mut self, line: &str) {
        self.record(RecordKind::Data, line);
    }

    fn warn(&mut self, message: &str) {
        self.record(RecordKind::Warning, message);
    }

    /// End of session.
    fn close(&mut self) {}
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn record(&mut self, kind: RecordKind, message: &str) {
        (**self).record(kind, message);
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Keeps records in memory. Used by tests and replay runs.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(RecordKind, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, kind: RecordKind) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m.as_str())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.records.iter().any(|(_, m)| m.contains(needle))
    }
}

impl ReportSink for MemorySink {
    fn record(&mut self, kind: RecordKind, message: &str) {
        self.records.push((kind, message.to_owned()));
    }
}

pub fn timestamp_prefix(now: &DateTime<Local>) -> String {
    now.format("%m/%d/%Y | %H:%M:%S:%3f -> ").to_string()
}

pub fn log_file_name(now: &DateTime<Local>) -> String {
    now.format("%m-%d-%y.txt").to_string()
}

pub fn session_marker(now: &DateTime<Local>) -> String {
    now.format("NEW SESSION: %m-%d-%y-%H-%M").to_string()
}

/// Console, dated text logs under `<log_dir>/sys` and `<log_dir>/data`, and
/// an optional JSON-lines mirror.
pub struct ReportLog {
    sys_file: Option<File>,
    data_file: Option<File>,
    json_file: Option<File>,
    echo: bool,
}

impl ReportLog {
    pub fn from_env(log_dir: Option<&Path>) -> Result<Self> {
        let json_path = std::env::var(JSON_PATH_ENV).ok().map(PathBuf::from);
        Self::open(log_dir, json_path)
    }

    /// Opens the dated logs and writes the session marker to both.
    pub fn open(log_dir: Option<&Path>, json_path: Option<PathBuf>) -> Result<Self> {
        let now = Local::now();
        let (sys_file, data_file) = match log_dir {
            Some(dir) => {
                let name = log_file_name(&now);
                (
                    Some(open_append(&dir.join("sys").join(&name))?),
                    Some(open_append(&dir.join("data").join(&name))?),
                )
            }
            None => (None, None),
        };
        let json_file = match json_path {
            Some(path) => Some(open_append(&path)?),
            None => None,
        };

        let mut log = Self {
            sys_file,
            data_file,
            json_file,
            echo: true,
        };
        let marker = session_marker(&now);
        for file in [&mut log.sys_file, &mut log.data_file].into_iter().flatten() {
            let _ = writeln!(file, "{marker}");
        }
        Ok(log)
    }

    /// Console output only; nothing touches the filesystem.
    pub fn console() -> Self {
        Self {
            sys_file: None,
            data_file: None,
            json_file: None,
            echo: true,
        }
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    fn json_event(&mut self, now: &DateTime<Local>, level: &str, message: &str) {
        let Some(file) = &mut self.json_file else {
            return;
        };
        let entry = json!({
            "ts_ms": now.timestamp_millis(),
            "level": level,
            "msg": message,
        });
        let _ = writeln!(file, "{}", entry);
        let _ = file.flush();
    }
}

impl ReportSink for ReportLog {
    fn record(&mut self, kind: RecordKind, message: &str) {
        let now = Local::now();
        let stamped = format!("{}{message}", timestamp_prefix(&now));
        if self.echo {
            match kind {
                RecordKind::System => println!("{stamped}"),
                RecordKind::Warning => eprintln!("{stamped}"),
                RecordKind::Data => {}
            }
        }
        let file = match kind {
            RecordKind::Data => &mut self.data_file,
            RecordKind::System | RecordKind::Warning => &mut self.sys_file,
        };
        if let Some(file) = file {
            let _ = writeln!(file, "{stamped}");
            let _ = file.flush();
        }
        self.json_event(&now, kind.level(), message);
    }

    /// Writes the session separator to both text logs.
    fn close(&mut self) {
        let separator = "-".repeat(SEPARATOR_WIDTH);
        for file in [&mut self.sys_file, &mut self.data_file]
            .into_iter()
            .flatten()
        {
            let _ = writeln!(file, "{separator}");
            let _ = file.flush();
        }
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn open_append(path: &Path) -> Result<File> {
    ensure_parent_dir(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamp_prefix_matches_log_format() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 2)
            .single()
            .expect("unambiguous local time");
        assert_eq!(timestamp_prefix(&at), "03/07/2024 | 09:05:02:000 -> ");
        assert_eq!(log_file_name(&at), "03-07-24.txt");
        assert_eq!(session_marker(&at), "NEW SESSION: 03-07-24-09-05");
    }

    #[test]
    fn records_are_split_between_sys_and_data_logs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let json_path = dir.path().join("mirror").join("events.jsonl");
        let mut log = ReportLog::open(Some(dir.path()), Some(json_path.clone()))?;
        log.set_echo(false);
        log.system("Send: 12000000");
        log.data("PS101100100");
        log.close();

        let name = log_file_name(&Local::now());
        let sys = fs::read_to_string(dir.path().join("sys").join(&name))?;
        let data = fs::read_to_string(dir.path().join("data").join(&name))?;

        assert!(sys.starts_with("NEW SESSION: "));
        assert!(sys.contains(" -> Send: 12000000"));
        assert!(!sys.contains("PS101100100"));
        assert!(data.contains(" -> PS101100100"));
        assert!(data.trim_end().ends_with(&"-".repeat(SEPARATOR_WIDTH)));

        let mirror = fs::read_to_string(json_path)?;
        let first: serde_json::Value =
            serde_json::from_str(mirror.lines().next().unwrap_or_default())?;
        assert_eq!(first["level"], "info");
        assert_eq!(first["msg"], "Send: 12000000");
        Ok(())
    }

    #[test]
    fn memory_sink_filters_by_kind() {
        let mut sink = MemorySink::new();
        sink.system("Advance to: FIRE");
        sink.warn("Duplicate pin: 3");
        assert_eq!(sink.messages(RecordKind::Warning), vec!["Duplicate pin: 3"]);
        assert!(sink.contains("FIRE"));
    }
}
