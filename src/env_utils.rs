use anyhow::{anyhow, Context, Result};

use crate::{config::DEFAULT_BAUD, port_detect};

pub const PORT_ENV: &str = "GROUNDLINK_PORT";
pub const BAUD_ENV: &str = "GROUNDLINK_BAUD";

pub fn parse_env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("{name} must be an unsigned integer")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

/// Port from the command line, then `GROUNDLINK_PORT`, then autodetection.
pub fn require_port(explicit: Option<&str>) -> Result<String> {
    if let Some(port) = explicit.filter(|p| !p.trim().is_empty()) {
        return Ok(port.to_owned());
    }
    if let Ok(port) = std::env::var(PORT_ENV) {
        if !port.trim().is_empty() {
            return Ok(port);
        }
    }

    if let Some(port) = port_detect::detect_port() {
        return Ok(port);
    }

    let candidates = port_detect::list_candidates();
    let mut message = format!(
        "{PORT_ENV} is not set and autodetection was not conclusive. Pass --port or set {PORT_ENV}."
    );
    if !candidates.is_empty() {
        message.push_str(" Candidates:\n");
        for candidate in candidates {
            message.push_str("  - ");
            message.push_str(&candidate);
            message.push('\n');
        }
    }
    Err(anyhow!(message))
}

pub fn baud_from_env(explicit: Option<u32>) -> Result<u32> {
    match explicit {
        Some(baud) => Ok(baud),
        None => parse_env_u32(BAUD_ENV, DEFAULT_BAUD),
    }
}
