//! Per-device poll loop.
//!
//! Each device runs on its own named thread that owns the transport. The
//! thread reads with a bounded timeout, pushes bytes through the format's
//! framer and decoder, maps records into the state sink and commits once per
//! read. Side-channel requests posted on the [`RequestChannel`] are written
//! between reads; their replies come back through the decoder.
//!
//! ```text
//! Idle -> Synchronizing -> Decoding -> Publishing -> Synchronizing ...
//!                                                    \-> Stopped
//! ```

use crate::cancel::CancelToken;
use crate::config::DeviceConfig;
use crate::error::{PollError, PollResult, RequestError, RequestResult};
use crate::publish::Publisher;
use crate::request::RequestChannel;
use crate::source::{ByteSource, SourceError};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use trackwire_atomic::{StateReader, StreamCounters, StreamSnapshot, state_sink};
use trackwire_devicemap::DeviceIdMap;
use trackwire_protocol::{
    AnyDecoder, AnyFramer, DecodeStatus, DeviceContext, RecordBatch, RecordDecoder, Reply,
    WireFormat,
};
use trackwire_types::monotonic_now_ns;

const EVENT_CAPACITY: usize = 16;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoopState {
    /// Created, thread not yet reading.
    #[default]
    Idle = 0,
    /// Waiting for bytes or scanning for a record boundary.
    Synchronizing = 1,
    Decoding = 2,
    Publishing = 3,
    Stopped = 4,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Synchronizing,
            2 => LoopState::Decoding,
            3 => LoopState::Publishing,
            4 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, LoopState::Idle | LoopState::Stopped)
    }
}

#[derive(Debug, Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Lifecycle notifications sent to the owner of a [`DeviceLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Started,
    /// The loop ended on cancellation or end of stream.
    Stopped,
    /// The loop ended on a transport failure.
    Failed(String),
}

fn emit(events: &Sender<LinkEvent>, event: LinkEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "link event queue full, dropping event"),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Decode state owned by the poll thread.
struct Pipeline {
    framer: AnyFramer,
    decoder: AnyDecoder,
    ctx: DeviceContext,
    batch: RecordBatch,
    publisher: Publisher,
    counters: Arc<StreamCounters>,
    requests: Arc<RequestChannel>,
    state: Arc<SharedState>,
}

impl Pipeline {
    /// Frame, decode and publish one transport read.
    fn process(&mut self, input: &[u8], now_ns: u64) {
        let mut pos = 0;
        loop {
            self.batch.clear();
            let status = match self.framer.feed(input, &mut pos) {
                Some(frame) => {
                    self.state.set(LoopState::Decoding);
                    self.decoder.decode(frame, &mut self.ctx, &mut self.batch)
                }
                None => break,
            };

            match status {
                DecodeStatus::Complete => {}
                DecodeStatus::Truncated => self.counters.inc_truncated(),
                DecodeStatus::Resync => {
                    trace!(device = %self.ctx.name, "decoder requested resync");
                    self.framer.resync();
                    self.decoder.reset();
                    self.publisher.reset_velocities();
                }
            }

            if let Some(reply) = self.batch.take_reply() {
                self.deliver(reply);
            }
            if !self.batch.records().is_empty() {
                self.state.set(LoopState::Publishing);
                self.publisher.publish(self.batch.records(), now_ns);
            }
            self.state.set(LoopState::Synchronizing);
        }

        let counts = self.framer.take_counts();
        if counts.resyncs > 0 {
            self.counters.add_resyncs(counts.resyncs);
            self.publisher.reset_velocities();
        }
        if counts.skipped > 0 {
            self.counters.add_unmapped(counts.skipped);
        }
        if let Some(generation) = self.publisher.commit() {
            trace!(generation, "committed");
        }
    }

    fn deliver(&self, reply: Reply) {
        if !self.requests.complete(reply) {
            debug!(device = %self.ctx.name, ?reply, "reply with no request waiting");
        }
    }
}

fn run<S: ByteSource>(
    source: &mut S,
    pipeline: &mut Pipeline,
    cancel: &CancelToken,
    read_timeout: Duration,
    buf: &mut [u8],
) -> PollResult<()> {
    pipeline.state.set(LoopState::Synchronizing);
    while !cancel.is_cancelled() {
        if let Some(message) = pipeline.requests.take_pending() {
            if let Err(e) = source.write(&message) {
                pipeline
                    .requests
                    .fail(RequestError::Transport(e.to_string()));
                return Err(e.into());
            }
            trace!(len = message.len(), "request written");
        }

        let n = match source.read(buf, read_timeout) {
            Ok(n) => n,
            Err(SourceError::Closed) => {
                info!(device = %pipeline.ctx.name, "transport closed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            continue;
        }
        pipeline
            .counters
            .add_bytes(u64::try_from(n).unwrap_or(u64::MAX));
        let input = buf.get(..n).unwrap_or_default();
        pipeline.process(input, monotonic_now_ns());
    }
    debug!(device = %pipeline.ctx.name, "poll loop cancelled");
    Ok(())
}

/// Owner handle of a running device poll loop.
///
/// Dropping the handle stops the loop and joins its thread.
#[derive(Debug)]
pub struct DeviceLink {
    name: String,
    format: WireFormat,
    map: Arc<DeviceIdMap>,
    reader: StateReader,
    counters: Arc<StreamCounters>,
    requests: Arc<RequestChannel>,
    state: Arc<SharedState>,
    cancel: CancelToken,
    events: Receiver<LinkEvent>,
    reply_timeout: Duration,
    thread: Option<JoinHandle<PollResult<()>>>,
}

impl DeviceLink {
    /// Validate `config` and start polling `source` on a new thread.
    ///
    /// # Errors
    ///
    /// - [`PollError::Config`] when the configuration or device map is invalid.
    /// - [`PollError::Spawn`] when the thread cannot be created.
    pub fn start<S>(config: DeviceConfig, mut source: S) -> PollResult<Self>
    where
        S: ByteSource + 'static,
    {
        config.validate()?;
        let map = Arc::new(config.device_map()?);
        let options = config.decoder_options();

        let (writer, reader) =
            state_sink(map.tracker_count(), map.button_count(), map.valuator_count());
        let counters = Arc::new(StreamCounters::new());
        let requests = Arc::new(RequestChannel::new());
        let state = Arc::new(SharedState::default());
        let cancel = CancelToken::new();
        let (events_tx, events) = channel::bounded(EVENT_CAPACITY);

        let mut pipeline = Pipeline {
            framer: config.format.framer(&options),
            decoder: config.format.decoder(&options),
            ctx: DeviceContext::new(config.name.clone()).with_invert_z(config.invert_z),
            batch: RecordBatch::new(),
            publisher: Publisher::new(
                Arc::clone(&map),
                config.format,
                writer,
                config.velocity_reset_gap,
                Arc::clone(&counters),
            ),
            counters: Arc::clone(&counters),
            requests: Arc::clone(&requests),
            state: Arc::clone(&state),
        };

        info!(
            device = %config.name,
            format = %config.format,
            trackers = map.tracker_count(),
            buttons = map.button_count(),
            valuators = map.valuator_count(),
            "starting poll loop"
        );

        let thread_cancel = cancel.clone();
        let read_timeout = config.read_timeout;
        let read_buffer = config.read_buffer;
        let thread = thread::Builder::new()
            .name(format!("trackwire-{}", config.name))
            .spawn(move || {
                emit(&events_tx, LinkEvent::Started);
                let mut buf = vec![0u8; read_buffer];
                let result = run(
                    &mut source,
                    &mut pipeline,
                    &thread_cancel,
                    read_timeout,
                    &mut buf,
                );
                pipeline.state.set(LoopState::Stopped);
                pipeline.requests.close();
                match &result {
                    Ok(()) => {
                        info!(device = %pipeline.ctx.name, "poll loop stopped");
                        emit(&events_tx, LinkEvent::Stopped);
                    }
                    Err(e) => {
                        error!(device = %pipeline.ctx.name, error = %e, "poll loop failed");
                        emit(&events_tx, LinkEvent::Failed(e.to_string()));
                    }
                }
                result
            })
            .map_err(|e| PollError::Spawn(e.to_string()))?;

        Ok(Self {
            name: config.name,
            format: config.format,
            map,
            reader,
            counters,
            requests,
            state,
            cancel,
            events,
            reply_timeout: config.reply_timeout,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn device_map(&self) -> &Arc<DeviceIdMap> {
        &self.map
    }

    /// A reader of the published device state.
    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn counters(&self) -> StreamSnapshot {
        self.counters.snapshot()
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Whether a written request is waiting for the device to answer.
    pub fn is_waiting_for_reply(&self) -> bool {
        self.requests.is_in_flight()
    }

    pub fn events(&self) -> &Receiver<LinkEvent> {
        &self.events
    }

    /// Send `message` to the device and wait for its reply, bounded by the
    /// configured reply timeout.
    ///
    /// # Errors
    ///
    /// See [`RequestChannel::request`].
    pub fn request(&self, message: Vec<u8>) -> RequestResult<Reply> {
        self.request_with_timeout(message, self.reply_timeout)
    }

    /// [`DeviceLink::request`] with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`RequestChannel::request`].
    pub fn request_with_timeout(&self, message: Vec<u8>, timeout: Duration) -> RequestResult<Reply> {
        self.requests.request(message, timeout)
    }

    /// Ask the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.requests.close();
    }

    /// Stop the loop and wait for its thread.
    ///
    /// # Errors
    ///
    /// Returns the error the loop ended with, or
    /// [`PollError::ThreadPanicked`]. Calling it again returns `Ok(())`.
    pub fn stop(&mut self) -> PollResult<()> {
        self.cancel();
        self.join()
    }

    /// Wait for the loop to end on its own (end of stream or failure).
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLink::stop`].
    pub fn join(&mut self) -> PollResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        match thread.join() {
            Ok(result) => result,
            Err(_) => {
                error!(device = %self.name, "poll thread panicked");
                Err(PollError::ThreadPanicked)
            }
        }
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.stop()
        {
            warn!(device = %self.name, error = %e, "poll loop ended with error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_atomic() {
        let shared = SharedState::default();
        assert_eq!(shared.get(), LoopState::Idle);
        for state in [
            LoopState::Synchronizing,
            LoopState::Decoding,
            LoopState::Publishing,
            LoopState::Stopped,
        ] {
            shared.set(state);
            assert_eq!(shared.get(), state);
        }
        assert!(LoopState::Decoding.is_running());
        assert!(!LoopState::Stopped.is_running());
    }

    #[test]
    fn test_full_event_queue_drops_without_blocking() {
        let (tx, rx) = channel::bounded(1);
        emit(&tx, LinkEvent::Started);
        emit(&tx, LinkEvent::Stopped);
        assert_eq!(rx.try_recv().ok(), Some(LinkEvent::Started));
        assert!(rx.try_recv().is_err());
    }
}
