use thiserror::Error;

/// Physical-layer failure on the serial link. Surfaced once per fault episode;
/// the link has to be reopened by the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open serial port {port} @ {baud}: {reason}")]
    Open {
        port: String,
        baud: u32,
        reason: String,
    },
    #[error("serial read failed: {0}")]
    Read(String),
    #[error("serial write failed: {0}")]
    Write(String),
    #[error("serial write timed out")]
    WriteTimeout,
    #[error("serial link is closed")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("duplicate pin '{0}' in command")]
    DuplicatePin(char),
    #[error("command has {len} characters, frames hold at most {max}")]
    TooLong { len: usize, max: usize },
    #[error("invalid command character '{0}'")]
    InvalidChar(char),
    #[error("no pin mapped for valve SV{0}")]
    UnknownValve(u8),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("a decay test is already running")]
    AlreadyActive,
    #[error("serial link must be configured and open")]
    LinkNotReady,
    #[error("no decay test is running")]
    NotActive,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkStateError {
    #[error("serial settings not configured")]
    NotConfigured,
    #[error("serial link is already open")]
    AlreadyConnected,
    #[error("serial link is not open")]
    NotConnected,
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pin map must be a permutation of 1..=9, got {0:?}")]
    PinMap(Vec<u8>),
    #[error("analog map entry {0} is outside 1..=9")]
    AnalogChannel(u8),
    #[error("analog map must not be empty")]
    EmptyAnalogMap,
    #[error("pressure thresholds out of order: {0}")]
    Thresholds(String),
    #[error("trend window invalid: {0}")]
    TrendWindow(String),
    #[error("decay settings invalid: {0}")]
    Decay(String),
    #[error("expected {expected} valve labels, got {actual}")]
    ValveLabels { expected: usize, actual: usize },
}

/// Errors raised on the operator command path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Link(#[from] LinkStateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("mission is aborted")]
    Aborted,
    #[error("command needs the FIRE stage, sequence is at {0}")]
    NotArmed(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_open_error_names_port_and_baud() {
        let err = TransportError::Open {
            port: "/dev/ttyUSB0".into(),
            baud: 115200,
            reason: "busy".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to open serial port /dev/ttyUSB0 @ 115200: busy"
        );
    }

    #[test]
    fn link_state_error_wraps_transport_transparently() {
        let err: LinkStateError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "serial link is closed");
    }
}
