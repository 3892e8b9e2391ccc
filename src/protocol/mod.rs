//! Wire format shared with the stand controller: outbound command frames and
//! inbound telemetry lines.

pub mod frame;
pub mod telemetry;

pub use frame::{encode_command, encode_valves, CommandFrame, ReservedCommand, FRAME_LEN};
pub use telemetry::{decode_telemetry, TelemetryRecord, PRESSURE_SEP, VALVE_TAG};
