//! The single serial link: transport access, the background poller that
//! shares it with the command path, and open/closed bookkeeping.

pub mod memory;
pub mod serial;
pub mod state;
pub mod worker;

pub use memory::{MemoryTransport, MemoryWire, WireOp};
pub use serial::{SerialLink, Transport};
pub use state::{LinkState, PortSettings};
pub use worker::{LinkSender, LinkWorker, WorkerEvent, WorkerState};
