use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use crate::error::TransportError;

use super::serial::Transport;

/// One byte-level operation observed on a [`MemoryWire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireOp {
    Read(u8),
    Write(u8),
}

#[derive(Default)]
struct WireState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    journal: Vec<WireOp>,
    closed: bool,
    fault: Option<TransportError>,
}

/// In-memory stand-in for the serial cable. The wire side feeds inbound bytes
/// and inspects what was written; [`MemoryTransport`] is the station side.
#[derive(Clone, Default)]
pub struct MemoryWire {
    state: Arc<Mutex<WireState>>,
}

impl MemoryWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { wire: self.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, WireState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    pub fn push_line(&self, line: &str) {
        let mut state = self.lock();
        state.inbound.extend(line.bytes());
        state.inbound.push_back(b'\n');
    }

    pub fn outbound(&self) -> Vec<u8> {
        self.lock().outbound.clone()
    }

    pub fn outbound_text(&self) -> String {
        String::from_utf8_lossy(&self.lock().outbound).into_owned()
    }

    /// Every byte read or written, in the order the transport saw them.
    pub fn journal(&self) -> Vec<WireOp> {
        self.lock().journal.clone()
    }

    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Makes the next read or write fail with `err`.
    pub fn inject_fault(&self, err: TransportError) {
        self.lock().fault = Some(err);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

pub struct MemoryTransport {
    wire: MemoryWire,
}

impl MemoryTransport {
    fn check(state: &mut WireState) -> Result<(), TransportError> {
        if state.closed {
            return Err(TransportError::Closed);
        }
        match state.fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        !self.wire.lock().closed
    }

    fn bytes_waiting(&mut self) -> Result<u32, TransportError> {
        let mut state = self.wire.lock();
        Self::check(&mut state)?;
        Ok(u32::try_from(state.inbound.len()).unwrap_or(u32::MAX))
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut state = self.wire.lock();
        Self::check(&mut state)?;
        let byte = state.inbound.pop_front();
        if let Some(byte) = byte {
            state.journal.push(WireOp::Read(byte));
        }
        Ok(byte)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut state = self.wire.lock();
        Self::check(&mut state)?;
        let bytes: Vec<u8> = state.inbound.drain(..).collect();
        state.journal.extend(bytes.iter().map(|b| WireOp::Read(*b)));
        Ok(bytes)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), TransportError> {
        Self::check(&mut self.wire.lock())?;
        // Byte at a time with a yield in between, so a caller that skipped
        // the link lock would show up as interleaving in the journal.
        for &byte in data {
            {
                let mut state = self.wire.lock();
                state.outbound.push(byte);
                state.journal.push(WireOp::Write(byte));
            }
            thread::yield_now();
        }
        Ok(())
    }

    fn close(&mut self) {
        self.wire.lock().closed = true;
    }
}
