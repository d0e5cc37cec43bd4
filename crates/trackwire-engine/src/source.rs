//! Transport boundary.
//!
//! The poll loop owns exactly one [`ByteSource`] and is the only thread that
//! touches it. Concrete transports (serial ports, Bluetooth channels,
//! sockets) live outside this crate; [`ScriptedSource`] replays bytes from
//! memory for tests and capture replay.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The peer closed the stream or a replay ran out of data.
    #[error("Transport closed")]
    Closed,

    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => SourceError::Closed,
            _ => SourceError::Io(err.to_string()),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Blocking byte transport for one device.
///
/// Datagram transports return one datagram per `read`; stream transports
/// return whatever is available.
pub trait ByteSource: Send {
    /// Read into `buf`, blocking at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the transport is closed or broken.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> SourceResult<usize>;

    /// Send an output report or command to the device.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the transport is closed or broken.
    fn write(&mut self, data: &[u8]) -> SourceResult<()>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> SourceResult<usize> {
        (**self).read(buf, timeout)
    }

    fn write(&mut self, data: &[u8]) -> SourceResult<()> {
        (**self).write(data)
    }
}

/// Produces reply chunks for bytes written to a [`ScriptedSource`].
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Debug, Default)]
struct Script {
    chunks: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    closed: bool,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    script: Mutex<Script>,
    ready: Condvar,
}

/// In-memory [`ByteSource`] fed from queued chunks.
///
/// Each queued chunk is returned by one `read`; a chunk larger than the read
/// buffer is split across reads. Once the queue is empty the source either
/// idles until more data is pushed or, after [`ScriptHandle::close`], reports
/// [`SourceError::Closed`].
pub struct ScriptedSource {
    shared: Arc<Shared>,
    responder: Option<Responder>,
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("shared", &self.shared)
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

/// Test-side handle of a [`ScriptedSource`].
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    shared: Arc<Shared>,
}

impl ScriptedSource {
    /// An empty source and the handle that feeds it.
    pub fn new() -> (Self, ScriptHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
                responder: None,
            },
            ScriptHandle { shared },
        )
    }

    /// A source that replays `chunks` and then reports the end of the stream.
    pub fn replay<I>(chunks: I) -> (Self, ScriptHandle)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let (source, handle) = Self::new();
        for chunk in chunks {
            handle.push(chunk);
        }
        handle.close();
        (source, handle)
    }

    /// Answer every write with the chunks `responder` returns.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }
}

impl ByteSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> SourceResult<usize> {
        let deadline = Instant::now() + timeout;
        let mut script = self.shared.script.lock();
        loop {
            if let Some(reason) = script.failure.take() {
                return Err(SourceError::Io(reason));
            }
            if let Some(mut chunk) = script.chunks.pop_front() {
                let n = chunk.len().min(buf.len());
                if let (Some(dst), Some(src)) = (buf.get_mut(..n), chunk.get(..n)) {
                    dst.copy_from_slice(src);
                }
                if n < chunk.len() {
                    script.chunks.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            if script.closed {
                return Err(SourceError::Closed);
            }
            if self.shared.ready.wait_until(&mut script, deadline).timed_out() {
                return Ok(0);
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> SourceResult<()> {
        let replies = match self.responder.as_mut() {
            Some(responder) => responder(data),
            None => Vec::new(),
        };
        let mut script = self.shared.script.lock();
        if script.closed {
            return Err(SourceError::Closed);
        }
        script.written.push(data.to_vec());
        script.chunks.extend(replies);
        self.shared.ready.notify_all();
        Ok(())
    }
}

impl ScriptHandle {
    /// Queue a chunk for a later `read`.
    pub fn push(&self, chunk: impl Into<Vec<u8>>) {
        self.shared.script.lock().chunks.push_back(chunk.into());
        self.shared.ready.notify_all();
    }

    /// End the stream once the queued chunks are consumed.
    pub fn close(&self) {
        self.shared.script.lock().closed = true;
        self.shared.ready.notify_all();
    }

    /// Make the next `read` fail with an I/O error.
    pub fn fail(&self, reason: impl Into<String>) {
        self.shared.script.lock().failure = Some(reason.into());
        self.shared.ready.notify_all();
    }

    /// Everything written to the source so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.script.lock().written.clone()
    }

    /// Chunks not yet read.
    pub fn pending(&self) -> usize {
        self.shared.script.lock().chunks.len()
    }
}
