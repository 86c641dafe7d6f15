#![allow(dead_code)]

use polaris::{Connection, Error, Event, EventSink, FlushOutcome, Result};

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }

    condition()
}

/// A connection whose messages are scripted by the test.
///
/// Readiness is real: the descriptor is one end of a socket pair, and every
/// scripted inbound event is announced by one byte written to the peer.
/// Outbound messages are plain integers; each flush may send as many of
/// them as the next budget allows.
pub struct ScriptedConnection {
    local: UnixStream,

    inbound: Mutex<VecDeque<Event>>,

    outbound: Mutex<VecDeque<u32>>,
    sent: Mutex<Vec<u32>>,

    /// Per-flush send budgets; an empty list means unlimited.
    budgets: Mutex<VecDeque<usize>>,
    block_forever: AtomicBool,
    fail_flush: AtomicBool,
    flush_calls: AtomicUsize,

    valid: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl ScriptedConnection {
    /// Returns the connection and the peer end of its socket.
    pub fn pair() -> (Arc<Self>, UnixStream) {
        let (local, peer) = UnixStream::pair().expect("socketpair failed");
        local.set_nonblocking(true).expect("set_nonblocking failed");

        let connection = Arc::new(Self {
            local,
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            budgets: Mutex::new(VecDeque::new()),
            block_forever: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            flush_calls: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
            reason: Mutex::new(None),
        });

        (connection, peer)
    }

    /// Scripts `events` and makes the descriptor readable for them.
    pub fn push_inbound(&self, peer: &mut UnixStream, events: &[Event]) {
        self.inbound.lock().unwrap().extend(events.iter().cloned());
        peer.write_all(&vec![0u8; events.len()])
            .expect("peer write failed");
    }

    pub fn queue_outbound(&self, messages: &[u32]) {
        self.outbound.lock().unwrap().extend(messages);
    }

    pub fn set_budgets(&self, budgets: &[usize]) {
        *self.budgets.lock().unwrap() = budgets.iter().copied().collect();
    }

    pub fn set_block_forever(&self, block: bool) {
        self.block_forever.store(block, Ordering::SeqCst);
    }

    pub fn set_fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Writes to the socket until it stops accepting data, so the
    /// descriptor is no longer reported writable while the peer is idle.
    pub fn fill_socket(&self) {
        let chunk = [0u8; 4096];

        loop {
            match (&self.local).write(&chunk) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => panic!("filling the socket failed: {e}"),
            }
        }
    }

    pub fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }
}

impl Connection for ScriptedConnection {
    fn descriptor(&self) -> RawFd {
        self.local.as_raw_fd()
    }

    fn dispatch_pending(&self, _sink: &mut dyn EventSink) -> Result<usize> {
        Ok(0)
    }

    fn dispatch(&self, sink: &mut dyn EventSink) -> Result<usize> {
        let mut announced = 0;
        let mut buf = [0u8; 256];

        loop {
            match (&self.local).read(&mut buf) {
                Ok(0) => return Err(Error::HangUp),
                Ok(n) => announced += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let events: Vec<Event> = {
            let mut inbound = self.inbound.lock().unwrap();
            let n = announced.min(inbound.len());
            inbound.drain(..n).collect()
        };

        let count = events.len();
        for event in events {
            sink.deliver(event);
        }

        Ok(count)
    }

    fn flush(&self) -> Result<FlushOutcome> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Error::Io(io::ErrorKind::BrokenPipe.into()));
        }
        if self.block_forever.load(Ordering::SeqCst) {
            return Ok(FlushOutcome::WouldBlock);
        }

        let mut outbound = self.outbound.lock().unwrap();
        if outbound.is_empty() {
            return Ok(FlushOutcome::Complete);
        }

        let budget = self
            .budgets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(usize::MAX);
        let n = budget.min(outbound.len());
        self.sent.lock().unwrap().extend(outbound.drain(..n));

        if outbound.is_empty() {
            Ok(FlushOutcome::Complete)
        } else {
            Ok(FlushOutcome::WouldBlock)
        }
    }

    fn invalidate(&self, reason: &Error) {
        *self.reason.lock().unwrap() = Some(reason.to_string());
        self.valid.store(false, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}
