//! Inbound polling and outbound commands share one transport; neither side
//! may split the other's bytes.

use std::{
    collections::HashSet,
    sync::mpsc::Receiver,
    thread,
    time::{Duration, Instant},
};

use groundlink::{
    config::LinkSettings,
    link::{LinkWorker, MemoryWire, WireOp, WorkerEvent},
    protocol::encode_command,
};

const ROUNDS: usize = 50;

fn collect_lines(rx: &Receiver<WorkerEvent>, want: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while lines.len() < want && Instant::now() < deadline {
        if let Ok(WorkerEvent::Line(line)) = rx.recv_timeout(Duration::from_millis(50)) {
            lines.push(line);
        }
    }
    lines
}

#[test]
fn sends_and_reads_never_interleave() {
    let wire = MemoryWire::new();
    for i in 0..ROUNDS {
        wire.push_line(&format!("{}, {}, {}", i, i + 1, i + 2));
    }
    let (mut worker, rx) = LinkWorker::spawn(Box::new(wire.transport()), &LinkSettings::default());

    let frames: Vec<_> = (0..ROUNDS)
        .map(|i| {
            let pins = format!("{}{}", i % 9 + 1, (i + 4) % 9 + 1);
            encode_command(&pins).expect("two distinct pins")
        })
        .collect();

    let sender = worker.sender();
    let to_send = frames.clone();
    let writer = thread::spawn(move || {
        for frame in &to_send {
            sender.send_toggle(frame).expect("memory wire accepts writes");
        }
    });
    writer.join().expect("writer thread");

    let lines = collect_lines(&rx, ROUNDS);
    worker.shutdown();

    // Every inbound line arrives once and in order.
    assert_eq!(lines.len(), ROUNDS);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line, &format!("{}, {}, {}\n", i, i + 1, i + 2));
    }

    // Every command reaches the wire exactly once, in order.
    let expected: String = frames.iter().map(|f| f.wire_line()).collect();
    assert_eq!(wire.outbound_text(), expected);

    // Each frame's bytes form one unbroken run of writes, and each inbound
    // line is one unbroken run of reads.
    let journal = wire.journal();
    let mut runs: Vec<(bool, Vec<u8>)> = Vec::new();
    for op in journal {
        let (is_write, byte) = match op {
            WireOp::Write(b) => (true, b),
            WireOp::Read(b) => (false, b),
        };
        match runs.last_mut() {
            Some((kind, bytes)) if *kind == is_write && bytes.last() != Some(&b'\n') => {
                bytes.push(byte)
            }
            _ => runs.push((is_write, vec![byte])),
        }
    }
    let write_runs: Vec<String> = runs
        .iter()
        .filter(|(w, _)| *w)
        .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
        .collect();
    let expected_runs: Vec<String> = frames.iter().map(|f| f.wire_line()).collect();
    assert_eq!(write_runs, expected_runs);

    let read_runs: HashSet<String> = runs
        .iter()
        .filter(|(w, _)| !*w)
        .map(|(_, b)| String::from_utf8_lossy(b).into_owned())
        .collect();
    assert_eq!(read_runs.len(), ROUNDS);
    assert!(read_runs.iter().all(|line| line.ends_with('\n')));
}
