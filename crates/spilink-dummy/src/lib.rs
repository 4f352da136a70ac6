//! spilink-dummy - In-memory SPI peripheral emulator for testing
//!
//! This crate provides a dummy backend that pretends to be a set of spidev
//! devices. It records everything written to it and answers reads from a
//! response queue, so code using spilink can be tested without hardware.
//!
//! With loopback enabled the emulated device echoes what it receives, like a
//! controller with `SPI_LOOP` set or a wire between MOSI and MISO.

use spilink_core::{Error, OpenFailure, Result, Segment, SpiBackend, SpiPort, TransferParameters};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Byte returned when no response is queued (idle MISO line)
pub const IDLE_BYTE: u8 = 0xFF;

/// Configuration for the dummy bus
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Paths that can be opened
    pub paths: Vec<String>,
    /// Paths that exist but report busy
    pub busy: Vec<String>,
    /// Largest message in bytes
    pub max_transfer_len: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                "/dev/spidev0.0".to_string(),
                "/dev/spidev0.1".to_string(),
                "/dev/spidev1.0".to_string(),
                "/dev/spidev1.1".to_string(),
            ],
            busy: Vec::new(),
            max_transfer_len: 4096,
        }
    }
}

/// One recorded segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSegment {
    /// Bytes clocked out, if the segment had a write side
    pub written: Option<Vec<u8>>,
    /// Bytes clocked in, if the segment had a read side
    pub read: Option<Vec<u8>>,
}

/// One recorded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    /// Parameters in effect for the message
    pub params: TransferParameters,
    /// Segments, in order
    pub segments: Vec<RecordedSegment>,
}

#[derive(Debug, Default)]
struct DummyState {
    opens: usize,
    closes: usize,
    open_path: Option<String>,
    applied: Vec<TransferParameters>,
    messages: Vec<RecordedMessage>,
    responses: VecDeque<u8>,
    apply_failures: VecDeque<i32>,
    fail_next_exchange: Option<i32>,
}

/// Shared view of the emulated device, for inspection and fault injection
#[derive(Debug, Clone, Default)]
pub struct DummyProbe {
    state: Arc<Mutex<DummyState>>,
}

impl DummyProbe {
    fn lock(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue bytes to be clocked in by later reads
    pub fn queue_response(&self, bytes: &[u8]) {
        self.lock().responses.extend(bytes.iter().copied());
    }

    /// Make the next parameter update fail with the given OS code
    ///
    /// Calls queue up: calling this twice fails the next two updates.
    pub fn fail_next_apply(&self, code: i32) {
        self.lock().apply_failures.push_back(code);
    }

    /// Make the next transfer fail with the given OS code
    pub fn fail_next_exchange(&self, code: i32) {
        self.lock().fail_next_exchange = Some(code);
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Number of closes
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Path currently open, if any
    pub fn open_path(&self) -> Option<String> {
        self.lock().open_path.clone()
    }

    /// Every parameter set the device accepted, oldest first
    pub fn applied(&self) -> Vec<TransferParameters> {
        self.lock().applied.clone()
    }

    /// Every message performed, oldest first
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.lock().messages.clone()
    }

    /// All bytes clocked out, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.lock()
            .messages
            .iter()
            .flat_map(|m| m.segments.iter())
            .filter_map(|s| s.written.as_deref())
            .flatten()
            .copied()
            .collect()
    }
}

/// Dummy SPI backend
///
/// Only one path may be open at a time; a second open reports busy.
#[derive(Debug, Clone, Default)]
pub struct DummyBus {
    config: DummyConfig,
    probe: DummyProbe,
}

impl DummyBus {
    /// Create a dummy bus with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            probe: DummyProbe::default(),
        }
    }

    /// Create a dummy bus with the default device paths
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Handle for inspecting the emulated device
    pub fn probe(&self) -> DummyProbe {
        self.probe.clone()
    }
}

impl SpiBackend for DummyBus {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn open_port(&mut self, path: &str) -> Result<Box<dyn SpiPort>> {
        let open_failed = |cause| Error::DeviceOpen {
            path: path.to_string(),
            cause,
        };

        if self.config.busy.iter().any(|p| p == path) {
            return Err(open_failed(OpenFailure::Busy));
        }
        if !self.config.paths.iter().any(|p| p == path) {
            return Err(open_failed(OpenFailure::NotFound));
        }

        let mut state = self.probe.lock();
        if state.open_path.is_some() {
            return Err(open_failed(OpenFailure::Busy));
        }
        state.opens += 1;
        state.open_path = Some(path.to_string());
        drop(state);

        log::debug!("dummy: Opened {}", path);
        Ok(Box::new(DummyPort {
            probe: self.probe.clone(),
            max_transfer_len: self.config.max_transfer_len,
        }))
    }
}

struct DummyPort {
    probe: DummyProbe,
    max_transfer_len: usize,
}

impl SpiPort for DummyPort {
    fn apply(&mut self, params: &TransferParameters) -> Result<()> {
        let mut state = self.probe.lock();
        if let Some(code) = state.apply_failures.pop_front() {
            return Err(Error::Configure {
                setting: "mode",
                code,
            });
        }
        log::debug!("dummy: Parameters {}", params);
        state.applied.push(*params);
        Ok(())
    }

    fn exchange(
        &mut self,
        segments: &mut [Segment<'_>],
        params: &TransferParameters,
    ) -> Result<()> {
        let mut state = self.probe.lock();
        if let Some(code) = state.fail_next_exchange.take() {
            return Err(Error::Transfer { code });
        }

        let mut recorded = Vec::with_capacity(segments.len());
        for seg in segments.iter_mut() {
            let (tx, rx) = seg.split_mut();
            let written = tx.map(|w| w.to_vec());
            let read = match rx {
                Some(buf) => {
                    match tx {
                        Some(w) if params.loopback() => buf.copy_from_slice(w),
                        _ => {
                            for b in buf.iter_mut() {
                                *b = state.responses.pop_front().unwrap_or(IDLE_BYTE);
                            }
                        }
                    }
                    Some(buf.to_vec())
                }
                None => None,
            };
            recorded.push(RecordedSegment { written, read });
        }

        log::trace!("dummy: Message of {} segment(s)", recorded.len());
        state.messages.push(RecordedMessage {
            params: *params,
            segments: recorded,
        });
        Ok(())
    }

    fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.probe.lock();
        state.closes += 1;
        if let Some(path) = state.open_path.take() {
            log::debug!("dummy: Closed {}", path);
        }
        Ok(())
    }
}
