//! Scripted in-memory transport
//!
//! Clones share state: hand one clone to the session and keep another to
//! script replies and inspect what was written.

use super::Transport;
use crate::error::{PrintError, PrintResult};
use crate::protocol::frame::{self, ACK, Frame, NAK, STX};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds the reply fields for `(command, request fields)`
pub type Responder = Arc<dyn Fn(u8, &[String]) -> Vec<String> + Send + Sync>;

/// Reply generated for every frame written
#[derive(Clone)]
pub struct AutoReply {
    ack: bool,
    corrupt: bool,
    stale: bool,
    responder: Responder,
}

impl AutoReply {
    /// Clean status words and a numeric field
    pub fn new() -> Self {
        Self {
            ack: false,
            corrupt: false,
            stale: false,
            responder: Arc::new(|_, _| vec!["0000".into(), "0000".into(), "1".into()]),
        }
    }

    /// Send ACK before the reply frame
    pub fn with_ack(mut self) -> Self {
        self.ack = true;
        self
    }

    /// Every reply carries a wrong checksum
    pub fn corrupt(mut self) -> Self {
        self.corrupt = true;
        self
    }

    /// Every reply echoes the wrong sequence number
    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn responder<F>(mut self, f: F) -> Self
    where
        F: Fn(u8, &[String]) -> Vec<String> + Send + Sync + 'static,
    {
        self.responder = Arc::new(f);
        self
    }

    fn reply_to(&self, request: &Frame) -> Vec<u8> {
        let fields = (self.responder)(request.command, &request.fields);
        let seq = if self.stale {
            request.sequence.wrapping_add(1)
        } else {
            request.sequence
        };
        let mut bytes = Vec::new();
        if self.ack {
            bytes.push(ACK);
        }
        let mut reply = frame::encode(seq, request.command, &fields);
        if self.corrupt {
            let n = reply.len();
            reply[n - 1] = if reply[n - 1] == b'0' { b'1' } else { b'0' };
        }
        bytes.extend_from_slice(&reply);
        bytes
    }
}

impl Default for AutoReply {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AutoReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoReply")
            .field("ack", &self.ack)
            .field("corrupt", &self.corrupt)
            .field("stale", &self.stale)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<u8>,
    /// Released into `incoming`, one chunk per frame or NAK written
    on_write: VecDeque<Vec<u8>>,
    auto: Option<AutoReply>,
    writes: Vec<Vec<u8>>,
    last_request: Option<Frame>,
    overlap: bool,
    fail_open: bool,
    open: bool,
    opens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Silent transport: nothing is ever received unless scripted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto(reply: AutoReply) -> Self {
        let t = Self::new();
        t.state.lock().auto = Some(reply);
        t
    }

    pub fn set_auto(&self, reply: Option<AutoReply>) {
        self.state.lock().auto = reply;
    }

    /// Bytes readable right away
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes.iter().copied());
    }

    /// Bytes released by the next frame or NAK written (takes priority over auto)
    pub fn reply_on_write(&self, bytes: Vec<u8>) {
        self.state.lock().on_write.push_back(bytes);
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Every write, frames and control bytes alike
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Decoded frames written, in order
    pub fn frames(&self) -> Vec<Frame> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.first() == Some(&STX))
            .filter_map(|w| frame::decode(w).ok())
            .collect()
    }

    /// Commands of the frames written, in order
    pub fn commands(&self) -> Vec<u8> {
        self.frames().iter().map(|f| f.command).collect()
    }

    /// Single control bytes written (ACK/NAK)
    pub fn control_bytes(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.len() == 1)
            .map(|w| w[0])
            .collect()
    }

    /// A frame was written while the previous reply was still unread
    pub fn overlap_detected(&self) -> bool {
        self.state.lock().overlap
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().opens
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> PrintResult<()> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(PrintError::Connection("mock refused".into()));
        }
        if !state.open {
            state.open = true;
            state.opens += 1;
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        {
            let mut state = self.state.lock();
            if !state.open {
                return Err(PrintError::Connection("mock not open".into()));
            }
            state.writes.push(data.to_vec());

            if data.first() == Some(&STX) {
                if !state.incoming.is_empty() {
                    state.overlap = true;
                }
                let request = frame::decode(data).ok();
                if let Some(chunk) = state.on_write.pop_front() {
                    state.incoming.extend(chunk);
                } else if let (Some(auto), Some(request)) = (state.auto.clone(), request.as_ref()) {
                    let reply = auto.reply_to(request);
                    state.incoming.extend(reply);
                }
                state.last_request = request;
            } else if data == [NAK] {
                // a printer answers NAK by repeating its reply
                if let Some(chunk) = state.on_write.pop_front() {
                    state.incoming.extend(chunk);
                } else if let (Some(auto), Some(request)) =
                    (state.auto.clone(), state.last_request.clone())
                {
                    let reply = auto.reply_to(&request);
                    state.incoming.extend(reply);
                }
            }
        }
        // let other tasks run between a write and its reply
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn read_byte(&mut self, wait: Duration) -> PrintResult<Option<u8>> {
        let next = self.state.lock().incoming.pop_front();
        match next {
            Some(b) => {
                tokio::task::yield_now().await;
                Ok(Some(b))
            }
            None => {
                tokio::time::sleep(wait).await;
                Ok(self.state.lock().incoming.pop_front())
            }
        }
    }

    async fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_reply_echoes_sequence() {
        let mut t = MockTransport::auto(AutoReply::new());
        t.open().await.unwrap();
        t.write_all(&frame::encode(0x33, 0x2a, &["N"])).await.unwrap();

        let mut bytes = Vec::new();
        while let Some(b) = t.read_byte(Duration::from_millis(1)).await.unwrap() {
            bytes.push(b);
        }
        let reply = frame::decode(&bytes).unwrap();
        assert_eq!(reply.sequence, 0x33);
        assert_eq!(reply.command, 0x2a);
        assert_eq!(reply.fields[0], "0000");
    }

    #[tokio::test]
    async fn test_overlap_detection() {
        let mut t = MockTransport::auto(AutoReply::new());
        t.open().await.unwrap();
        t.write_all(&frame::encode(0x20, 0x2a, &["N"])).await.unwrap();
        assert!(!t.overlap_detected());
        t.write_all(&frame::encode(0x21, 0x2a, &["N"])).await.unwrap();
        assert!(t.overlap_detected());
    }

    #[tokio::test]
    async fn test_write_requires_open() {
        let mut t = MockTransport::new();
        assert!(t.write_all(b"x").await.is_err());
        t.fail_open(true);
        assert!(t.open().await.is_err());
    }
}
