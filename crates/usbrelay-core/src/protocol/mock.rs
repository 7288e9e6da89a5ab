//! Mock transport for tests and development
//!
//! Scripted byte-level stand-in for a relay module: each write pops the next
//! queued reply into the readable stream, and everything written is recorded
//! for inspection. Handles are cheap clones sharing the same state, so a test
//! can keep one while the session owns another.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::Transport;

#[derive(Default)]
struct MockInner {
    /// Replies waiting to be released, one per write
    replies: VecDeque<Vec<u8>>,
    /// Bytes currently readable
    pending: VecDeque<u8>,
    /// Everything written, one entry per write call
    writes: Vec<Vec<u8>>,
    /// When set, the next read fails with this error kind
    fail_next_read: Option<io::ErrorKind>,
    /// Cap on bytes returned per read, to exercise partial-read handling
    read_chunk: Option<usize>,
}

/// Mock transport with scripted replies
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    /// Create a mock with no scripted replies (a silent device)
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to become readable after the next unanswered write
    pub fn queue_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.inner.lock().unwrap().replies.push_back(bytes.into());
    }

    /// Make bytes readable immediately, without waiting for a write
    pub fn inject_input(&self, bytes: impl Into<Vec<u8>>) {
        self.inner.lock().unwrap().pending.extend(bytes.into());
    }

    /// Fail the next read with the given error kind
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.inner.lock().unwrap().fail_next_read = Some(kind);
    }

    /// Return at most `n` bytes per read call, simulating a slow line that
    /// delivers frames in fragments
    pub fn set_read_chunk(&self, n: usize) {
        self.inner.lock().unwrap().read_chunk = Some(n);
    }

    /// Everything written so far, one entry per write call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Number of write calls observed
    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().writes.len()
    }

    /// Number of readable bytes not yet consumed
    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.writes.push(bytes.to_vec());
        if let Some(reply) = inner.replies.pop_front() {
            inner.pending.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(kind) = inner.fail_next_read.take() {
                return Err(io::Error::new(kind, "injected read failure"));
            }
            if !inner.pending.is_empty() {
                let cap = inner.read_chunk.unwrap_or(buf.len()).min(buf.len());
                let mut n = 0;
                while n < cap {
                    match inner.pending.pop_front() {
                        Some(b) => {
                            buf[n] = b;
                            n += 1;
                        }
                        None => break,
                    }
                }
                return Ok(n);
            }
        }
        // Nothing buffered: behave like a quiet line for the full window
        std::thread::sleep(timeout);
        Ok(0)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap().pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reply_released_per_write() {
        let mock = MockTransport::new();
        mock.queue_reply(vec![0x01, 0x02]);

        let mut transport = mock.clone();
        assert_eq!(transport.read(&mut [0u8; 8], Duration::ZERO).unwrap(), 0);

        transport.write_all(&[0xaa]).unwrap();
        let mut buf = [0u8; 8];
        let n = transport.read(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02]);
        assert_eq!(mock.writes(), vec![vec![0xaa]]);
    }

    #[test]
    fn test_discard_clears_pending() {
        let mock = MockTransport::new();
        mock.inject_input(vec![1, 2, 3]);
        let mut transport = mock.clone();
        transport.discard_input().unwrap();
        assert_eq!(mock.pending_len(), 0);
    }
}
