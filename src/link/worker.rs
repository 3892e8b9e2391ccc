use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{config::LinkSettings, error::TransportError, protocol::CommandFrame};

use super::serial::Transport;

// Back-off when a poll found nothing, so an idle in-memory wire does not spin.
const IDLE_BACKOFF: Duration = Duration::from_millis(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One raw inbound line, terminator included when it arrived.
    Line(String),
    /// The link failed; sent once, after which the worker stops.
    Fault(TransportError),
    /// The poll loop has exited.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Polling = 1,
    Draining = 2,
    Faulted = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Polling,
            2 => Self::Draining,
            3 => Self::Faulted,
            _ => Self::Idle,
        }
    }
}

/// The transport plus the single lock serializing every read and write on it.
struct LinkShared {
    transport: Mutex<Box<dyn Transport>>,
    pending_sends: AtomicUsize,
}

impl LinkShared {
    fn try_acquire(&self) -> Option<MutexGuard<'_, Box<dyn Transport>>> {
        match self.transport.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Cloneable command path onto the link.
#[derive(Clone)]
pub struct LinkSender {
    shared: Arc<LinkShared>,
}

impl LinkSender {
    /// Writes `frame` plus a line feed under the link lock. Retries the lock
    /// until it is obtained; a command is never dropped because the poller
    /// held the link.
    pub fn send_toggle(&self, frame: &CommandFrame) -> Result<(), TransportError> {
        let line = frame.wire_line();
        self.shared.pending_sends.fetch_add(1, Ordering::AcqRel);
        let result = loop {
            if let Some(mut transport) = self.shared.try_acquire() {
                break transport.send(&line);
            }
            thread::yield_now();
        };
        self.shared.pending_sends.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

pub struct LinkWorker {
    sender: LinkSender,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    default_frame: CommandFrame,
    handle: Option<JoinHandle<()>>,
}

impl LinkWorker {
    /// Starts the poll loop on its own thread. Inbound lines, the fault
    /// notification and the cleanup notification arrive on the returned
    /// receiver.
    pub fn spawn(
        transport: Box<dyn Transport>,
        settings: &LinkSettings,
    ) -> (Self, Receiver<WorkerEvent>) {
        let shared = Arc::new(LinkShared {
            transport: Mutex::new(transport),
            pending_sends: AtomicUsize::new(0),
        });
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(AtomicU8::new(WorkerState::Polling as u8));
        let (events_tx, events_rx) = mpsc::channel();

        let poller = Poller {
            shared: Arc::clone(&shared),
            running: Arc::clone(&running),
            state: Arc::clone(&state),
            events: events_tx,
            drain_backlog: settings.drain_backlog_bytes,
        };
        let handle = thread::Builder::new()
            .name("link-worker".into())
            .spawn(move || poller.run())
            .ok();

        if handle.is_none() {
            running.store(false, Ordering::Release);
            state.store(WorkerState::Idle as u8, Ordering::Release);
        }

        let worker = Self {
            sender: LinkSender { shared },
            running,
            state,
            default_frame: CommandFrame::empty(),
            handle,
        };
        (worker, events_rx)
    }

    pub fn sender(&self) -> LinkSender {
        self.sender.clone()
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_default_frame(&mut self, frame: CommandFrame) {
        self.default_frame = frame;
    }

    pub fn default_frame(&self) -> &CommandFrame {
        &self.default_frame
    }

    /// Sends `frame`, or the default frame when none is given.
    pub fn send_toggle(&self, frame: Option<&CommandFrame>) -> Result<(), TransportError> {
        self.sender
            .send_toggle(frame.unwrap_or(&self.default_frame))
    }

    /// Requests a stop and waits for the current iteration to finish. One
    /// in-flight read may still complete after the request.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Stops the loop and releases the transport.
    pub fn shutdown(&mut self) {
        self.stop();
        let mut transport = self
            .sender
            .shared
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        transport.close();
    }
}

impl Drop for LinkWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Poller {
    shared: Arc<LinkShared>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    events: Sender<WorkerEvent>,
    drain_backlog: u32,
}

impl Poller {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(self) {
        self.set_state(WorkerState::Polling);
        while self.running.load(Ordering::Acquire) {
            // Let queued commands through before taking the link again.
            if self.shared.pending_sends.load(Ordering::Acquire) > 0 {
                thread::yield_now();
                continue;
            }
            let Some(mut transport) = self.shared.try_acquire() else {
                thread::yield_now();
                continue;
            };
            let burst = self.read_burst(&mut **transport);
            drop(transport);

            match burst {
                Ok(lines) if lines.is_empty() => {
                    self.set_state(WorkerState::Polling);
                    thread::sleep(IDLE_BACKOFF);
                }
                Ok(lines) => {
                    self.set_state(WorkerState::Polling);
                    if !self.emit_lines(lines) {
                        break;
                    }
                }
                Err(err) => {
                    self.set_state(WorkerState::Faulted);
                    let _ = self.events.send(WorkerEvent::Fault(err));
                    self.running.store(false, Ordering::Release);
                    break;
                }
            }
        }
        self.set_state(WorkerState::Idle);
        let _ = self.events.send(WorkerEvent::Stopped);
    }

    fn read_burst(&self, transport: &mut dyn Transport) -> Result<Vec<Vec<u8>>, TransportError> {
        let mut lines = Vec::new();
        let first = transport.read_line()?;
        if first.is_empty() {
            return Ok(lines);
        }
        lines.push(first);

        while transport.bytes_waiting()? > self.drain_backlog {
            self.set_state(WorkerState::Draining);
            let line = transport.read_line()?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Returns false once the receiving side has gone away.
    fn emit_lines(&self, lines: Vec<Vec<u8>>) -> bool {
        for raw in lines {
            // Lines that are not valid text are dropped; telemetry is lossy.
            let Ok(text) = String::from_utf8(raw) else {
                continue;
            };
            if self.events.send(WorkerEvent::Line(text)).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{link::memory::MemoryWire, protocol::encode_command};

    fn recv_until_stopped(rx: &Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(WorkerEvent::Stopped) => {
                    events.push(WorkerEvent::Stopped);
                    break;
                }
                Ok(event) => events.push(event),
                Err(_) => continue,
            }
        }
        events
    }

    fn test_poller(drain_backlog: u32) -> (Poller, Receiver<WorkerEvent>) {
        let (events, rx) = mpsc::channel();
        let poller = Poller {
            shared: Arc::new(LinkShared {
                transport: Mutex::new(Box::new(MemoryWire::new().transport())),
                pending_sends: AtomicUsize::new(0),
            }),
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(AtomicU8::new(WorkerState::Polling as u8)),
            events,
            drain_backlog,
        };
        (poller, rx)
    }

    #[test]
    fn backlog_drains_in_one_burst_and_short_tail_waits() -> Result<(), TransportError> {
        let wire = MemoryWire::new();
        wire.push_line("PS101100100");
        wire.push_line("12, 405, 600");
        wire.push_line("1, 2, 3");
        let mut transport = wire.transport();
        let (poller, _rx) = test_poller(LinkSettings::default().drain_backlog_bytes);

        let burst = poller.read_burst(&mut transport)?;
        assert_eq!(
            burst,
            vec![b"PS101100100\n".to_vec(), b"12, 405, 600\n".to_vec()]
        );
        assert_eq!(wire.pending_inbound(), 8);
        assert_eq!(
            WorkerState::from_u8(poller.state.load(Ordering::Acquire)),
            WorkerState::Draining
        );

        poller.set_state(WorkerState::Polling);
        let tail = poller.read_burst(&mut transport)?;
        assert_eq!(tail, vec![b"1, 2, 3\n".to_vec()]);
        assert_eq!(
            WorkerState::from_u8(poller.state.load(Ordering::Acquire)),
            WorkerState::Polling
        );
        assert!(poller.read_burst(&mut transport)?.is_empty());
        Ok(())
    }

    #[test]
    fn small_backlog_is_left_for_next_poll() -> Result<(), TransportError> {
        let wire = MemoryWire::new();
        wire.push_line("1, 2");
        wire.push_line("3, 4");
        let mut transport = wire.transport();
        let (poller, _rx) = test_poller(8);

        assert_eq!(poller.read_burst(&mut transport)?, vec![b"1, 2\n".to_vec()]);
        assert_eq!(wire.pending_inbound(), 5);
        assert_eq!(poller.read_burst(&mut transport)?, vec![b"3, 4\n".to_vec()]);
        Ok(())
    }

    #[test]
    fn emits_each_line_then_cleanup_on_stop() {
        let wire = MemoryWire::new();
        wire.push_line("PS101100100");
        wire.push_line("12, 405");
        let (mut worker, rx) = LinkWorker::spawn(Box::new(wire.transport()), &LinkSettings::default());

        let first = rx.recv_timeout(Duration::from_secs(2)).expect("first line");
        let second = rx.recv_timeout(Duration::from_secs(2)).expect("second line");
        assert_eq!(first, WorkerEvent::Line("PS101100100\n".into()));
        assert_eq!(second, WorkerEvent::Line("12, 405\n".into()));

        worker.stop();
        assert_eq!(recv_until_stopped(&rx), vec![WorkerEvent::Stopped]);
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn transport_fault_is_reported_once_and_stops_loop() {
        let wire = MemoryWire::new();
        wire.inject_fault(TransportError::Read("cable pulled".into()));
        let (worker, rx) = LinkWorker::spawn(Box::new(wire.transport()), &LinkSettings::default());

        let events = recv_until_stopped(&rx);
        let faults = events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Fault(_)))
            .count();
        assert_eq!(faults, 1);
        assert_eq!(events.last(), Some(&WorkerEvent::Stopped));
        assert!(!worker.is_running());
    }

    #[test]
    fn invalid_utf8_lines_are_dropped() {
        let wire = MemoryWire::new();
        wire.push_inbound(&[0xff, b'\n']);
        wire.push_line("1, 2");
        let (mut worker, rx) = LinkWorker::spawn(Box::new(wire.transport()), &LinkSettings::default());
        let event = rx.recv_timeout(Duration::from_secs(2)).expect("valid line");
        assert_eq!(event, WorkerEvent::Line("1, 2\n".into()));
        worker.stop();
    }

    #[test]
    fn send_toggle_uses_default_frame_when_none_given() -> Result<(), TransportError> {
        let wire = MemoryWire::new();
        let (mut worker, _rx) = LinkWorker::spawn(Box::new(wire.transport()), &LinkSettings::default());
        worker.set_default_frame(encode_command("36").expect("valid pins"));
        worker.send_toggle(None)?;
        worker.send_toggle(Some(&encode_command("1").expect("valid pin")))?;
        worker.shutdown();
        assert_eq!(wire.outbound_text(), "36000000\n10000000\n");
        assert!(wire.is_closed());
        Ok(())
    }
}
