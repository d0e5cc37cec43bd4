//! Single-slot side channel between callers and the poll loop.
//!
//! A caller posts an outgoing message into the slot and blocks on a condition
//! variable until the loop resolves it, the deadline passes, or the channel
//! is closed. Only one request is in the slot at a time; later callers wait
//! for it to drain. Replies arrive through the normal decode path, so the
//! loop never blocks on a request.

use crate::error::{RequestError, RequestResult};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use trackwire_protocol::Reply;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    /// Posted, not yet written to the transport.
    Pending(Vec<u8>),
    /// Written; waiting for the device to answer.
    InFlight,
    Done(RequestResult<Reply>),
}

#[derive(Debug, Default)]
struct Inner {
    slot: Slot,
    closed: bool,
}

/// Request/reply rendezvous shared by callers and one poll loop.
#[derive(Debug, Default)]
pub struct RequestChannel {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl RequestChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `message` and wait for the device's reply.
    ///
    /// `timeout` bounds the whole call, including the wait for an earlier
    /// request to finish.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Timeout`] when no reply arrives before the deadline.
    /// - [`RequestError::Cancelled`] when the channel closes first.
    /// - [`RequestError::Device`] when the device rejects the request.
    /// - [`RequestError::Transport`] when the message could not be written.
    pub fn request(&self, message: Vec<u8>, timeout: Duration) -> RequestResult<Reply> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        while !matches!(inner.slot, Slot::Empty) {
            if inner.closed {
                return Err(RequestError::Cancelled);
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return Err(RequestError::Timeout);
            }
        }
        if inner.closed {
            return Err(RequestError::Cancelled);
        }

        inner.slot = Slot::Pending(message);
        self.changed.notify_all();

        loop {
            if let Slot::Done(_) = inner.slot {
                let result = match std::mem::take(&mut inner.slot) {
                    Slot::Done(result) => result,
                    _ => Err(RequestError::Cancelled),
                };
                self.changed.notify_all();
                return result;
            }
            if inner.closed {
                inner.slot = Slot::Empty;
                self.changed.notify_all();
                return Err(RequestError::Cancelled);
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                if let Slot::Done(_) = inner.slot {
                    continue;
                }
                inner.slot = Slot::Empty;
                self.changed.notify_all();
                tracing::debug!("side-channel request timed out");
                return Err(RequestError::Timeout);
            }
        }
    }

    /// Loop side: take a posted message for writing, marking it in flight.
    pub fn take_pending(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match std::mem::take(&mut inner.slot) {
            Slot::Pending(message) => {
                inner.slot = Slot::InFlight;
                Some(message)
            }
            other => {
                inner.slot = other;
                None
            }
        }
    }

    /// Whether a posted request is waiting to be written.
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Pending(_))
    }

    /// Whether a written request is waiting for its reply.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::InFlight)
    }

    /// Loop side: resolve the in-flight request with a decoded reply.
    ///
    /// A nonzero device error code fails the request. Returns `false` when
    /// nothing has been written yet or the caller already timed out; the
    /// reply is then unsolicited and a posted message stays pending.
    pub fn complete(&self, reply: Reply) -> bool {
        let result = match reply.error() {
            0 => Ok(reply),
            status => Err(RequestError::Device { status }),
        };
        let mut inner = self.inner.lock();
        if !matches!(inner.slot, Slot::InFlight) {
            return false;
        }
        inner.slot = Slot::Done(result);
        self.changed.notify_all();
        true
    }

    /// Loop side: fail the posted or in-flight request.
    pub fn fail(&self, error: RequestError) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.slot, Slot::Pending(_) | Slot::InFlight) {
            return false;
        }
        inner.slot = Slot::Done(Err(error));
        self.changed.notify_all();
        true
    }

    /// Refuse new requests and wake every waiter with
    /// [`RequestError::Cancelled`].
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        if matches!(inner.slot, Slot::Pending(_) | Slot::InFlight) {
            inner.slot = Slot::Done(Err(RequestError::Cancelled));
        }
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ack(error: u8) -> Reply {
        Reply::Ack { report: 0x16, error }
    }

    /// Serve one request from another thread, answering with `reply`.
    fn serve_once(channel: Arc<RequestChannel>, reply: Reply) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            loop {
                if let Some(message) = channel.take_pending() {
                    assert!(channel.complete(reply));
                    return message;
                }
                thread::sleep(Duration::from_millis(1));
            }
        })
    }

    #[test]
    fn test_reply_resolves_request() -> Result<(), RequestError> {
        let channel = Arc::new(RequestChannel::new());
        let server = serve_once(Arc::clone(&channel), ack(0));
        let reply = channel.request(vec![0x16, 1], Duration::from_secs(2))?;
        assert_eq!(reply, ack(0));
        assert_eq!(server.join().ok(), Some(vec![0x16, 1]));
        assert!(!channel.is_in_flight());
        Ok(())
    }

    #[test]
    fn test_device_error_fails_request() {
        let channel = Arc::new(RequestChannel::new());
        let _server = serve_once(Arc::clone(&channel), ack(7));
        assert_eq!(
            channel.request(vec![1], Duration::from_secs(2)),
            Err(RequestError::Device { status: 7 })
        );
    }

    #[test]
    fn test_unanswered_request_times_out_and_frees_slot() {
        let channel = RequestChannel::new();
        let started = Instant::now();
        assert_eq!(
            channel.request(vec![1], Duration::from_millis(20)),
            Err(RequestError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!channel.complete(ack(0)));
        assert_eq!(channel.take_pending(), None);
    }

    #[test]
    fn test_reply_before_write_is_unsolicited() {
        let channel = Arc::new(RequestChannel::new());
        let waiter = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.request(vec![0x16, 1, 2], Duration::from_secs(2)))
        };
        while !channel.is_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!channel.complete(ack(0)));
        assert_eq!(channel.take_pending(), Some(vec![0x16, 1, 2]));

        assert!(channel.complete(ack(0)));
        assert_eq!(waiter.join().ok(), Some(Ok(ack(0))));
    }

    #[test]
    fn test_close_wakes_waiter() {
        let channel = Arc::new(RequestChannel::new());
        let waiter = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.request(vec![1], Duration::from_secs(10)))
        };
        while channel.take_pending().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        channel.close();
        assert_eq!(waiter.join().ok(), Some(Err(RequestError::Cancelled)));
        assert_eq!(
            channel.request(vec![2], Duration::from_secs(1)),
            Err(RequestError::Cancelled)
        );
    }

    #[test]
    fn test_second_request_waits_for_first() {
        let channel = Arc::new(RequestChannel::new());
        let first = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.request(vec![1], Duration::from_secs(5)))
        };
        while !channel.is_in_flight() && channel.take_pending().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        let second = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.request(vec![2], Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        assert!(channel.is_in_flight());

        assert!(channel.complete(ack(0)));
        assert_eq!(first.join().ok(), Some(Ok(ack(0))));

        let message = loop {
            if let Some(message) = channel.take_pending() {
                break message;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(message, vec![2]);
        assert!(channel.complete(ack(0)));
        assert_eq!(second.join().ok(), Some(Ok(ack(0))));
    }
}
