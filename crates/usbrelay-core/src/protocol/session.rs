//! Command session
//!
//! Turns "send this frame, get a correlated reply" into a single blocking
//! operation with bounded latency, atop a transport that may drop, delay, or
//! corrupt bytes.
//!
//! The relay protocol has no sequence numbering, so replies can only be
//! correlated by device address against the single pending request. The
//! session therefore allows at most one in-flight command per transport; an
//! internal lock serializes callers, including callers targeting different
//! device addresses on the same physical line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::frame::{Frame, FrameKind};
use super::transport::Transport;
use super::{ProtocolError, SENTINEL};

/// Default per-attempt reply timeout in milliseconds
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 200;

/// Default number of transmissions before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Session timing and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long to wait for a valid matching reply per attempt
    pub reply_timeout: Duration,
    /// Total number of transmissions (first send included) before the
    /// exchange fails with `NoResponse`
    pub max_attempts: u32,
    /// Granularity of the read/cancellation poll loop
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// Cloneable cancellation flag for aborting an in-flight exchange
///
/// Cancellation is sticky: once set, every exchange fails with `Cancelled`
/// until the owner calls [`CancelToken::reset`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the exchange holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the cancellation flag
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct SessionInner {
    transport: Box<dyn Transport>,
    config: SessionConfig,
}

/// Serialized command/response exchanges over one exclusively-owned transport
pub struct CommandSession {
    inner: Mutex<SessionInner>,
}

impl CommandSession {
    /// Create a session owning the given transport
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(SessionInner { transport, config }),
        }
    }

    /// Send a request and wait for its confirmed reply
    ///
    /// Blocks until a valid reply from the request's address arrives, or
    /// until the configured retries are exhausted (`NoResponse`). Concurrent
    /// callers serialize on the session's internal lock.
    pub fn transact(&self, request: &Frame) -> Result<Frame, ProtocolError> {
        self.lock_inner().exchange(request, None)
    }

    /// Like [`CommandSession::transact`], aborting with `Cancelled` as soon
    /// as the token fires
    pub fn transact_with_cancel(
        &self,
        request: &Frame,
        cancel: &CancelToken,
    ) -> Result<Frame, ProtocolError> {
        self.lock_inner().exchange(request, Some(cancel))
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // A poisoned lock means a panic mid-exchange; the transport state is
        // indeterminate either way, so keep going with the data we have.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionInner {
    fn exchange(
        &mut self,
        request: &Frame,
        cancel: Option<&CancelToken>,
    ) -> Result<Frame, ProtocolError> {
        let encoded = request.encode();
        let reply_len = Frame::encoded_len(request.command, FrameKind::Reply);

        for attempt in 1..=self.config.max_attempts {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    self.transport.discard_input()?;
                    return Err(ProtocolError::Cancelled);
                }
            }

            // Stale bytes from an earlier exchange must not complete this one
            self.transport.discard_input()?;
            self.transport.write_all(&encoded)?;
            trace!(
                attempt,
                address = request.address,
                command = ?request.command,
                "frame sent"
            );

            match self.await_reply(request, reply_len, cancel)? {
                Some(reply) => {
                    debug!(
                        attempt,
                        address = reply.address,
                        command = ?reply.command,
                        "reply confirmed"
                    );
                    return Ok(reply);
                }
                None => debug!(
                    attempt,
                    timeout_ms = self.config.reply_timeout.as_millis() as u64,
                    "no valid reply within timeout"
                ),
            }
        }

        Err(ProtocolError::NoResponse {
            attempts: self.config.max_attempts,
        })
    }

    /// Wait out one attempt window, returning the first valid frame that
    /// matches the pending request's address and command
    fn await_reply(
        &mut self,
        request: &Frame,
        reply_len: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<Frame>, ProtocolError> {
        let deadline = Instant::now() + self.config.reply_timeout;
        let mut received: Vec<u8> = Vec::with_capacity(reply_len * 2);
        let mut chunk = [0u8; 64];

        loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    // Late-arriving bytes must not corrupt the next exchange
                    self.transport.discard_input()?;
                    return Err(ProtocolError::Cancelled);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let window = (deadline - now).min(self.config.poll_interval);
            let n = self.transport.read(&mut chunk, window)?;
            if n == 0 {
                continue;
            }
            received.extend_from_slice(&chunk[..n]);

            if let Some(reply) = extract_reply(&mut received, request, reply_len) {
                return Ok(Some(reply));
            }
        }
    }
}

/// Scan accumulated bytes for a valid reply matching the pending request
///
/// Resynchronizes on the sentinel and drops one byte at a time past noise,
/// garbled frames, and frames from other devices or commands. Leaves any
/// incomplete tail in the buffer for the next read.
fn extract_reply(received: &mut Vec<u8>, request: &Frame, reply_len: usize) -> Option<Frame> {
    loop {
        match received.iter().position(|b| *b == SENTINEL) {
            Some(pos) => {
                if pos > 0 {
                    trace!(discarded = pos, "skipping bytes before sentinel");
                    received.drain(..pos);
                }
            }
            None => {
                received.clear();
                return None;
            }
        }

        if received.len() < reply_len {
            return None;
        }

        match Frame::decode(&received[..reply_len], FrameKind::Reply) {
            Ok(frame) if frame.address == request.address && frame.command == request.command => {
                received.drain(..reply_len);
                return Some(frame);
            }
            Ok(frame) => {
                // Another device's frame on the shared line, or a reply to a
                // command nobody is waiting on; not ours to take
                trace!(
                    other = frame.address,
                    command = ?frame.command,
                    "ignoring unmatched reply"
                );
                received.drain(..1);
            }
            Err(err) => {
                trace!(%err, "discarding undecodable bytes");
                received.drain(..1);
            }
        }
    }
}
