//! In-memory serial link.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use latch_core::constants::BITS_PER_BYTE;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::link::SerialLink;
use crate::{HardwareError, Result};

/// Default transmit buffer of a throttled link.
const DEFAULT_OUTPUT_BUFFER: u64 = 64;

#[derive(Debug, Default)]
struct LinkState {
    open: bool,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    write_capacity: Option<usize>,
    line_rate: Option<u32>,
    output_buffer: Option<u64>,
    /// When the last accepted byte leaves the simulated line.
    drained_at: Option<Instant>,
    fail_open: bool,
    fail_read: bool,
    fail_write: bool,
    open_count: usize,
    write_calls: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LinkState>,
    written: Notify,
}

/// Nanoseconds one byte occupies on the line, times `baud`.
const BYTE_TIME_SCALE: u128 = BITS_PER_BYTE as u128 * 1_000_000_000;

impl LinkState {
    /// Accepted bytes still waiting in the transmit buffer.
    fn queued(&self) -> u64 {
        match (self.line_rate, self.drained_at) {
            (Some(baud), Some(at)) if baud > 0 => {
                let left = at.saturating_duration_since(Instant::now()).as_nanos();
                (left * u128::from(baud)).div_ceil(BYTE_TIME_SCALE) as u64
            }
            _ => 0,
        }
    }

    fn transmit_time(baud: u32, bytes: usize) -> Duration {
        let nanos = bytes as u128 * BYTE_TIME_SCALE / u128::from(baud.max(1));
        Duration::from_nanos(nanos as u64)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`SerialLink`] over in-memory buffers.
///
/// Bytes injected through the [`MemoryLinkHandle`] become readable; bytes
/// written are recorded for inspection. Failures and partial writes can be
/// switched on at any time.
///
/// # Examples
///
/// ```
/// use latch_hardware::link::SerialLink;
/// use latch_hardware::mock::MemoryLink;
///
/// let (mut link, handle) = MemoryLink::new("reader");
/// link.open().unwrap();
///
/// handle.inject(b"p\n");
/// let mut buf = [0u8; 8];
/// assert_eq!(link.read(&mut buf).unwrap(), 2);
///
/// handle.set_write_capacity(Some(1));
/// assert_eq!(link.write(b"P\n").unwrap(), 1);
/// assert_eq!(handle.written(), b"P");
/// ```
#[derive(Debug)]
pub struct MemoryLink {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryLink {
    /// Create a closed link and its control handle.
    pub fn new(name: impl Into<String>) -> (Self, MemoryLinkHandle) {
        let shared = Arc::new(Shared::default());
        let link = Self {
            name: name.into(),
            shared: Arc::clone(&shared),
        };
        (link, MemoryLinkHandle { shared })
    }
}

impl SerialLink for MemoryLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.open {
            return Ok(());
        }
        if state.fail_open {
            return Err(HardwareError::port_open(&self.name, "device unavailable"));
        }
        state.open = true;
        state.open_count += 1;
        state.drained_at = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(HardwareError::not_open(&self.name));
        }
        if state.fail_read {
            state.open = false;
            return Err(HardwareError::read(&self.name, "device unplugged"));
        }

        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let accepted = {
            let mut state = self.shared.lock();
            if !state.open {
                return Err(HardwareError::not_open(&self.name));
            }
            if state.fail_write {
                state.open = false;
                return Err(HardwareError::write(&self.name, "device unplugged"));
            }

            state.write_calls += 1;
            let mut accepted = state
                .write_capacity
                .map_or(data.len(), |cap| cap.min(data.len()));
            if let Some(baud) = state.line_rate {
                let buffer = state.output_buffer.unwrap_or(DEFAULT_OUTPUT_BUFFER);
                let room = buffer.saturating_sub(state.queued());
                accepted = accepted.min(room as usize);

                let now = Instant::now();
                let start = state.drained_at.map_or(now, |at| at.max(now));
                state.drained_at = Some(start + LinkState::transmit_time(baud, accepted));
            }
            state.tx.extend_from_slice(&data[..accepted]);
            accepted
        };

        if accepted > 0 {
            self.shared.written.notify_one();
        }
        Ok(accepted)
    }

    fn pending_output(&mut self) -> Result<u64> {
        let state = self.shared.lock();
        if !state.open {
            return Err(HardwareError::not_open(&self.name));
        }
        Ok(state.queued())
    }

    fn discard_output(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(HardwareError::not_open(&self.name));
        }
        let keep = state.tx.len().saturating_sub(state.queued() as usize);
        state.tx.truncate(keep);
        state.drained_at = None;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.shared.lock();
        state.open = false;
        state.rx.clear();
    }
}

/// Control handle for a [`MemoryLink`].
#[derive(Debug, Clone)]
pub struct MemoryLinkHandle {
    shared: Arc<Shared>,
}

impl MemoryLinkHandle {
    /// Make bytes available to the link's reader.
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().rx.extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared.lock().tx.clone()
    }

    /// Everything written so far, clearing the record.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().tx)
    }

    /// Wait until the link accepts at least one byte.
    pub async fn wait_written(&self) {
        self.shared.written.notified().await;
    }

    /// Check whether the driver holds the link open.
    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// How many times the link was opened.
    pub fn open_count(&self) -> usize {
        self.shared.lock().open_count
    }

    /// How many write calls were accepted.
    pub fn write_calls(&self) -> usize {
        self.shared.lock().write_calls
    }

    /// Limit bytes accepted per write call; `None` accepts everything.
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.shared.lock().write_capacity = capacity;
    }

    /// Clock written bytes out like a real line at `baud` (10 bits per
    /// byte) behind a bounded transmit buffer. `None` sends instantly.
    ///
    /// [`written`](MemoryLinkHandle::written) includes bytes still in the
    /// buffer; discarded ones are removed.
    pub fn set_line_rate(&self, baud: Option<u32>) {
        self.shared.lock().line_rate = baud;
    }

    /// Size of the transmit buffer used with a line rate.
    pub fn set_output_buffer(&self, bytes: u64) {
        self.shared.lock().output_buffer = Some(bytes);
    }

    /// Make `open` fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.lock().fail_open = fail;
    }

    /// Make reads fail (closing the link).
    pub fn set_fail_read(&self, fail: bool) {
        self.shared.lock().fail_read = fail;
    }

    /// Make writes fail (closing the link).
    pub fn set_fail_write(&self, fail: bool) {
        self.shared.lock().fail_write = fail;
    }

    /// Simulate unplugging: every operation fails until [`reconnect`].
    ///
    /// [`reconnect`]: MemoryLinkHandle::reconnect
    pub fn disconnect(&self) {
        let mut state = self.shared.lock();
        state.fail_open = true;
        state.fail_read = true;
        state.fail_write = true;
    }

    /// Undo [`disconnect`](MemoryLinkHandle::disconnect).
    pub fn reconnect(&self) {
        let mut state = self.shared.lock();
        state.fail_open = false;
        state.fail_read = false;
        state.fail_write = false;
    }
}
