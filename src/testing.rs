//! Scripted stand-ins for the OS serial layer.
//!
//! These drive the protocol engine and the device manager without hardware:
//! a port that plays back byte chunks with delays, a port enumerator that
//! replays snapshots, and a connector that records every open.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::device::manager::Connector;
use crate::device::port_monitor::{PortEnumerator, PortSnapshot};
use crate::serial::{LinkSettings, Result, SerialError, SerialInterface, SerialPortIO};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Chunk(Vec<u8>),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct PortState {
    writes: Vec<String>,
    input_resets: usize,
    closed: usize,
}

/// Shared view of what happened to a `ScriptedPort`, usable after the port moved
#[derive(Debug, Clone, Default)]
pub struct PortLog {
    state: Arc<Mutex<PortState>>,
}

impl PortLog {
    fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn input_resets(&self) -> usize {
        self.lock().input_resets
    }

    /// How many times the port was dropped (closed)
    pub fn closed(&self) -> usize {
        self.lock().closed
    }
}

/// A port that plays back scripted bytes.
///
/// Bytes queued with `queue_*` are "already in flight" when the test starts.
/// Replies registered with `reply_*` are released one per write, which is how
/// a firmware answers commands.
pub struct ScriptedPort {
    pending: VecDeque<ScriptStep>,
    replies: VecDeque<Vec<ScriptStep>>,
    delay_until: Option<Instant>,
    fail_writes: bool,
    log: PortLog,
}

impl ScriptedPort {
    pub fn new() -> (Self, PortLog) {
        let log = PortLog::default();
        let port = Self {
            pending: VecDeque::new(),
            replies: VecDeque::new(),
            delay_until: None,
            fail_writes: false,
            log: log.clone(),
        };
        (port, log)
    }

    pub fn queue_chunk(&mut self, chunk: impl AsRef<[u8]>) {
        self.pending.push_back(ScriptStep::Chunk(chunk.as_ref().to_vec()));
    }

    pub fn queue_delay(&mut self, delay: Duration) {
        self.pending.push_back(ScriptStep::Delay(delay));
    }

    pub fn reply(&mut self, steps: Vec<ScriptStep>) {
        self.replies.push_back(steps);
    }

    /// Reply to the next write with `chunks`, back to back
    pub fn reply_chunks(&mut self, chunks: &[&str]) {
        self.reply(
            chunks
                .iter()
                .map(|c| ScriptStep::Chunk(c.as_bytes().to_vec()))
                .collect(),
        );
    }

    /// Reply to the next write with a successful result carrying `data`
    pub fn reply_success(&mut self, data: serde_json::Value) {
        let body = serde_json::json!({
            "results": [{ "result": { "status": "success", "data": data } }]
        });
        self.reply_chunks(&[&body.to_string()]);
    }

    /// Reply to the next write with a failed result carrying `data`
    pub fn reply_failure(&mut self, data: serde_json::Value) {
        let body = serde_json::json!({
            "results": [{ "result": { "status": "failure", "data": data } }]
        });
        self.reply_chunks(&[&body.to_string()]);
    }

    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }
}

#[async_trait]
impl SerialPortIO for ScriptedPort {
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(SerialError::WriteFailed("write timed out".to_string()));
        }
        self.log
            .lock()
            .writes
            .push(String::from_utf8_lossy(data).into_owned());
        if let Some(reply) = self.replies.pop_front() {
            self.pending.extend(reply);
        }
        Ok(())
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.pending.pop_front() {
                None => return Ok(0),
                Some(ScriptStep::Delay(delay)) => {
                    let until = *self.delay_until.get_or_insert_with(|| Instant::now() + delay);
                    if Instant::now() < until {
                        self.pending.push_front(ScriptStep::Delay(delay));
                        return Ok(0);
                    }
                    self.delay_until = None;
                }
                Some(ScriptStep::Chunk(mut chunk)) => {
                    if chunk.len() > buf.len() {
                        let rest = chunk.split_off(buf.len());
                        self.pending.push_front(ScriptStep::Chunk(rest));
                    }
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    return Ok(chunk.len());
                }
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        self.delay_until = None;
        self.log.lock().input_resets += 1;
        Ok(())
    }
}

impl Drop for ScriptedPort {
    fn drop(&mut self) {
        self.log.lock().closed += 1;
    }
}

/// Replays a fixed sequence of port listings; the last one repeats forever
#[derive(Debug, Clone, Default)]
pub struct ScriptedPorts {
    snapshots: Arc<Mutex<VecDeque<Vec<String>>>>,
}

impl ScriptedPorts {
    pub fn new(snapshots: &[&[&str]]) -> Self {
        let queue = snapshots
            .iter()
            .map(|ports| ports.iter().map(|p| p.to_string()).collect())
            .collect();
        Self {
            snapshots: Arc::new(Mutex::new(queue)),
        }
    }
}

impl PortEnumerator for ScriptedPorts {
    fn snapshot(&self) -> Result<PortSnapshot> {
        let mut queue = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        let ports = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(PortSnapshot::from_ports(ports))
    }
}

#[derive(Default)]
struct ConnectorState {
    prepared: HashMap<String, VecDeque<ScriptedPort>>,
    failing: Vec<String>,
    opened: Vec<(String, PortLog)>,
}

/// Hands out scripted ports and remembers every port it opened
#[derive(Clone, Default)]
pub struct RecordingConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Use `port` for the next open of `port_name`
    pub fn prepare(&self, port_name: &str, port: ScriptedPort) {
        self.lock()
            .prepared
            .entry(port_name.to_string())
            .or_default()
            .push_back(port);
    }

    /// Make every open of `port_name` fail
    pub fn fail(&self, port_name: &str) {
        self.lock().failing.push(port_name.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Log of the most recent port opened under `port_name`
    pub fn log_for(&self, port_name: &str) -> Option<PortLog> {
        self.lock()
            .opened
            .iter()
            .rev()
            .find(|(name, _)| name == port_name)
            .map(|(_, log)| log.clone())
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, port_name: &str) -> Result<SerialInterface> {
        let mut state = self.lock();
        if state.failing.iter().any(|p| p == port_name) {
            return Err(SerialError::ConnectionFailed(format!(
                "{}: No such file or directory",
                port_name
            )));
        }

        let prepared = state
            .prepared
            .get_mut(port_name)
            .and_then(|queue| queue.pop_front());
        let (port, log) = match prepared {
            Some(port) => {
                let log = port.log.clone();
                (port, log)
            }
            None => ScriptedPort::new(),
        };
        state.opened.push((port_name.to_string(), log));
        Ok(SerialInterface::from_io(port_name, Box::new(port), LinkSettings::default()))
    }
}
