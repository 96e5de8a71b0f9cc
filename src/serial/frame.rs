//! Carving JSON messages out of the raw serial byte stream.
//!
//! The firmware terminates nothing: a response is complete when the text
//! collected so far parses as a JSON document. Anything the device prints
//! before the first `{` (boot logs, banners) is dropped.
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};

use super::{Result, SerialInterface};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_CHUNK_SIZE: usize = 1024;

#[derive(Debug)]
pub struct FrameAssembler {
    buffer: String,
    poll_interval: Duration,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_poll_interval(POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            buffer: String::new(),
            poll_interval,
        }
    }

    /// True while no message has been started
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feed one chunk of raw bytes; yields the message once the buffer parses.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. The message starts at
    /// the first `{` ever seen, so a stray brace in pre-message noise will
    /// poison the buffer until the caller resets it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Option<Value> {
        let text = String::from_utf8_lossy(chunk);

        if self.buffer.is_empty() {
            let Some(start) = text.find('{') else {
                if !text.trim().is_empty() {
                    log::debug!("Discarding pre-message output: {:?}", text.trim());
                }
                return None;
            };
            if start > 0 {
                log::debug!("Discarding pre-message output: {:?}", text[..start].trim());
            }
            self.buffer.push_str(&text[start..]);
        } else {
            self.buffer.push_str(&text);
        }

        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(message) => {
                self.buffer.clear();
                Some(message)
            }
            Err(_) => None,
        }
    }

    /// Poll `link` until a full message arrives or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout. Never waits longer than `timeout` plus
    /// one poll interval. Any partial message is discarded on return.
    pub async fn assemble(
        &mut self,
        link: &mut SerialInterface,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        self.reset();
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        while Instant::now() < deadline {
            let read = match link.read_available(&mut chunk).await {
                Ok(read) => read,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            };

            if read == 0 {
                sleep(self.poll_interval).await;
                continue;
            }

            log::debug!("Received {} bytes", read);
            if let Some(message) = self.push_chunk(&chunk[..read]) {
                return Ok(Some(message));
            }
        }

        if !self.buffer.is_empty() {
            log::warn!(
                "Timed out with an incomplete message: {} bytes buffered",
                self.buffer.len()
            );
        }
        self.reset();
        Ok(None)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
