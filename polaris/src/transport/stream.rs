use super::codec::{Request, decode_event, encode_request};
use crate::connection::{Connection, FlushOutcome};
use crate::error::{DecodeError, Error, Result};
use crate::event::{Event, EventSink};

use log::trace;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bytes read from the socket per `read` call.
const READ_CHUNK: usize = 4096;

/// Pending bytes in both directions.
#[derive(Default)]
struct Buffers {
    /// Received bytes not yet decoded into events.
    inbound: Vec<u8>,

    /// Encoded requests not yet written to the socket.
    outbound: Vec<u8>,
}

/// A [`Connection`] over a non-blocking Unix stream socket.
///
/// Messages are framed with the [`codec`](super::codec). Requests queued with
/// [`queue`](Self::queue) are written by the next flush, which the scheduler
/// performs on every loop iteration and whenever the socket turns writable.
pub struct StreamConnection {
    stream: UnixStream,
    buffers: Mutex<Buffers>,
    valid: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl StreamConnection {
    /// Connects to the display service listening at `path`.
    pub fn connect<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_stream(UnixStream::connect(path)?)
    }

    /// Wraps an already connected stream, switching it to non-blocking mode.
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;

        Ok(Self {
            stream,
            buffers: Mutex::new(Buffers::default()),
            valid: AtomicBool::new(true),
            last_error: Mutex::new(None),
        })
    }

    /// Queues a request for the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnection`] once the connection has failed.
    pub fn queue(&self, request: &Request) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidConnection);
        }

        encode_request(request, &mut self.buffers().outbound);
        Ok(())
    }

    /// Returns `true` if queued requests are waiting to be written.
    pub fn has_pending_output(&self) -> bool {
        !self.buffers().outbound.is_empty()
    }

    /// Description of the failure that invalidated the connection, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes every complete inbound frame.
    ///
    /// Runs under the buffer lock; delivery happens after it is released so
    /// a sink may queue requests on this connection. Events decoded before a
    /// malformed frame are returned together with the decode error.
    fn decode_buffered(&self) -> (Vec<Event>, Option<DecodeError>) {
        let mut buffers = self.buffers();
        let mut events = Vec::new();
        let mut consumed = 0;

        let failure = loop {
            match decode_event(&buffers.inbound[consumed..]) {
                Ok(Some((event, used))) => {
                    consumed += used;
                    events.extend(event);
                }
                Ok(None) => break None,
                Err(err) => break Some(err),
            }
        };

        buffers.inbound.drain(..consumed);
        (events, failure)
    }

    /// Delivers every decodable event, then reports a malformed frame.
    fn deliver(&self, sink: &mut dyn EventSink) -> Result<usize> {
        let (events, failure) = self.decode_buffered();
        let count = events.len();

        for event in events {
            sink.deliver(event);
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(count),
        }
    }

    /// Reads until the socket would block or the peer closes its end.
    fn fill(&self) -> Result<Fill> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut fill = Fill::default();

        loop {
            match (&self.stream).read(&mut chunk) {
                Ok(0) => {
                    fill.closed = true;
                    return Ok(fill);
                }
                Ok(n) => {
                    self.buffers().inbound.extend_from_slice(&chunk[..n]);
                    fill.read += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(fill),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

/// Outcome of draining the socket.
#[derive(Debug, Default)]
struct Fill {
    read: usize,

    /// End of stream was reached.
    closed: bool,
}

impl Connection for StreamConnection {
    fn descriptor(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn dispatch_pending(&self, sink: &mut dyn EventSink) -> Result<usize> {
        self.deliver(sink)
    }

    fn dispatch(&self, sink: &mut dyn EventSink) -> Result<usize> {
        let fill = self.fill()?;
        trace!("read {} bytes from fd {}", fill.read, self.descriptor());

        let delivered = self.deliver(sink)?;
        if fill.closed {
            return Err(Error::HangUp);
        }

        Ok(delivered)
    }

    fn flush(&self) -> Result<FlushOutcome> {
        let mut buffers = self.buffers();

        while !buffers.outbound.is_empty() {
            match (&self.stream).write(&buffers.outbound) {
                Ok(0) => return Err(Error::Io(io::ErrorKind::WriteZero.into())),
                Ok(n) => {
                    buffers.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushOutcome::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(FlushOutcome::Complete)
    }

    fn invalidate(&self, reason: &Error) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
        self.valid.store(false, Ordering::Release);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}
