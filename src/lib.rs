//! Ground-control side of a liquid rocket test stand: serial command framing,
//! telemetry decoding, pressure safety bands, trend rates and the pressure
//! decay test.

pub mod config;
pub mod console;
pub mod decay;
pub mod env_utils;
pub mod error;
pub mod export;
pub mod link;
pub mod logging;
pub mod port_detect;
pub mod protocol;
pub mod safety;
pub mod sequence;
pub mod station;
pub mod trend;
pub mod types;

pub use config::StationConfig;
pub use error::{CommandError, ConfigError, FrameError, LinkStateError, SessionError, TransportError};
pub use station::{GroundStation, StationUpdate};
