use std::io::{BufRead, Write};

use anyhow::{Context, Result};

pub const CSV_HEADER: &str = "time,PT1: HP,PT2: FUEL,PT3: OX,PT4: ENG?, PT5,PT6,PT7,PT8";

const STAMP_SEP: &str = "->";
const TIME_SEP: &str = "| ";

/// One pressure row from a data log line, `None` for anything else.
pub fn csv_row(line: &str) -> Option<String> {
    if !line.contains(',') {
        return None;
    }
    let (stamp, payload) = line.split_once(STAMP_SEP)?;
    let (_, time) = stamp.split_once(TIME_SEP)?;
    let mut row = time.trim().to_string();
    for value in payload.split(',') {
        row.push(',');
        row.push_str(value.trim());
    }
    Some(row)
}

/// Converts a data log into CSV. Returns the number of rows written.
pub fn export_csv(reader: impl BufRead, mut writer: impl Write) -> Result<usize> {
    writeln!(writer, "{CSV_HEADER}")?;
    let mut rows = 0;
    for line in reader.lines() {
        let line = line.context("reading data log")?;
        if let Some(row) = csv_row(&line) {
            writeln!(writer, "{row}")?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}
