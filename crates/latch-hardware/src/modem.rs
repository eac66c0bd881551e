//! Cellular modem driver.
//!
//! The modem is only used to see who is calling. Each incoming call produces
//! one `+CLIP` line per ring; the driver folds those into a single
//! ring-start/ring-end pair and hangs up on request. A silent line is probed
//! with `AT`, and a missing device is rediscovered (including the USB mode
//! switch some modems need) on the next poll.

use std::time::Duration;

use bytes::BytesMut;
use latch_core::constants::{
    DEFAULT_MODEM_POLL_INTERVAL, DEFAULT_RING_TIMEOUT, MODEM_READ_INTERVAL, MODEM_TICK_INTERVAL,
};
use latch_core::settings::ModemSettings;
use latch_protocol::{ModemCodec, ModemLine, parse_line};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, warn};

use crate::discovery::{DeviceDiscovery, DeviceStatus};
use crate::events::{EventSender, ModemEvent, emit};
use crate::link::SerialLink;
use crate::log_once::LogOnce;
use crate::HardwareError;

const READ_CHUNK: usize = 1024;

/// Modem driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    /// Replaces the leading `0` of national caller numbers.
    pub country_prefix: String,

    /// Probe (or reopen) after this long without a received line.
    pub poll_interval: Duration,

    /// End a ring after this long without a caller-ID refresh.
    pub ring_timeout: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            country_prefix: "+358".to_string(),
            poll_interval: DEFAULT_MODEM_POLL_INTERVAL,
            ring_timeout: DEFAULT_RING_TIMEOUT,
        }
    }
}

impl From<&ModemSettings> for ModemConfig {
    fn from(settings: &ModemSettings) -> Self {
        Self {
            country_prefix: settings.default_country_prefix.clone(),
            poll_interval: settings.poll_interval(),
            ring_timeout: settings.ring_timeout(),
        }
    }
}

/// Incoming call state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RingState {
    pub ringing: bool,

    /// Caller number; `None` while idle or when the caller hid it.
    pub number: Option<String>,
}

#[derive(Debug)]
enum ModemCommand {
    Hangup,
}

/// Cloneable handle to a running [`ModemController`].
#[derive(Debug, Clone)]
pub struct ModemHandle {
    commands: mpsc::UnboundedSender<ModemCommand>,
    ring: watch::Receiver<RingState>,
}

impl ModemHandle {
    /// Hang up the current call. Does nothing while idle.
    pub fn hangup(&self) {
        let _ = self.commands.send(ModemCommand::Hangup);
    }

    /// Current ring state.
    pub fn ring_state(&self) -> RingState {
        self.ring.borrow().clone()
    }

    /// Watch ring state changes.
    pub fn subscribe(&self) -> watch::Receiver<RingState> {
        self.ring.clone()
    }
}

/// Modem driver task.
pub struct ModemController<L, D> {
    link: L,
    discovery: D,
    config: ModemConfig,
    events: EventSender,
    commands: mpsc::UnboundedReceiver<ModemCommand>,
    ring: watch::Sender<RingState>,
    codec: ModemCodec,
    rx_buf: BytesMut,
    last_line: Option<Instant>,
    last_ring: Option<Instant>,
    open_errors: LogOnce,
}

impl<L: SerialLink, D: DeviceDiscovery> ModemController<L, D> {
    pub fn new(link: L, discovery: D, config: ModemConfig, events: EventSender) -> (Self, ModemHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (ring, ring_rx) = watch::channel(RingState::default());

        let controller = Self {
            link,
            discovery,
            config,
            events,
            commands,
            ring,
            codec: ModemCodec::new(),
            rx_buf: BytesMut::with_capacity(READ_CHUNK),
            last_line: None,
            last_ring: None,
            open_errors: LogOnce::new(),
        };
        let handle = ModemHandle {
            commands: commands_tx,
            ring: ring_rx,
        };
        (controller, handle)
    }

    /// Serve the modem until every handle is dropped.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(MODEM_TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut read_tick = tokio::time::interval(MODEM_READ_INTERVAL);
        read_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ModemCommand::Hangup) => self.hangup(),
                    None => break,
                },
                _ = tick.tick() => self.poll(),
                _ = read_tick.tick(), if self.link.is_open() => self.read_lines(),
            }
        }

        self.close_port();
    }

    fn poll(&mut self) {
        let now = Instant::now();

        let silent = self
            .last_line
            .is_none_or(|at| now.duration_since(at) >= self.config.poll_interval);
        if silent {
            if self.link.is_open() {
                self.send("AT");
            } else {
                self.open_port();
            }
        }

        let ring_stale = self
            .last_ring
            .is_some_and(|at| now.duration_since(at) >= self.config.ring_timeout);
        if self.ring.borrow().ringing && ring_stale {
            debug!("No caller ID refresh, ending ring");
            self.ring_end();
        }
    }

    fn open_port(&mut self) {
        self.close_port();

        match self.discovery.probe() {
            DeviceStatus::Present => {}
            DeviceStatus::WrongMode => {
                info!("Modem in storage mode, switching");
                if let Err(e) = self.discovery.mode_switch() {
                    self.log_open_error(&e);
                }
                return;
            }
            DeviceStatus::Absent => {
                let e = HardwareError::device_not_found(self.link.name());
                self.log_open_error(&e);
                return;
            }
        }

        if let Err(e) = self.link.open() {
            self.log_open_error(&e);
            return;
        }

        info!(device = %self.link.name(), "Modem port opened");
        self.open_errors.clear();
        self.last_line = None;
        self.rx_buf.clear();

        self.send("AT");
        self.send("AT+CLIP=1");
    }

    fn log_open_error(&mut self, e: &HardwareError) {
        if self.open_errors.check(e) {
            error!(error = %e, "Failed to open modem");
        }
    }

    fn close_port(&mut self) {
        self.ring_end();
        if self.link.is_open() {
            debug!(device = %self.link.name(), "Closing modem port");
        }
        self.link.close();
    }

    fn send(&mut self, command: &str) {
        let mut frame = BytesMut::new();
        if let Err(e) = self.codec.encode(command, &mut frame) {
            warn!(command, error = %e, "Failed to encode modem command");
            return;
        }

        match self.link.write(&frame) {
            Ok(n) if n == frame.len() => {}
            Ok(n) => {
                debug!(command, written = n, "Short write to modem");
                self.close_port();
            }
            Err(e) => {
                debug!(command, error = %e, "Modem write error");
                self.close_port();
            }
        }
    }

    fn hangup(&mut self) {
        if self.ring.borrow().ringing {
            info!("Hanging up");
            self.send("ATH");
        }
    }

    fn read_lines(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.link.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "Modem read error");
                    self.close_port();
                    return;
                }
            }
        }

        loop {
            match self.codec.decode(&mut self.rx_buf) {
                Ok(Some(line)) => {
                    self.last_line = Some(Instant::now());
                    if !line.is_empty() {
                        self.process_line(&line);
                    }
                }
                Ok(None) => break,
                Err(e) => warn!(error = %e, "Discarding modem input"),
            }
        }
    }

    fn process_line(&mut self, line: &str) {
        let parsed = match parse_line(line, &self.config.country_prefix) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(line, error = %e, "Error processing modem line");
                return;
            }
        };

        match parsed {
            ModemLine::Rssi(rssi) => emit(&self.events, ModemEvent::SignalStrength(rssi)),
            ModemLine::CallerId(number) => {
                let is_new = {
                    let ring = self.ring.borrow();
                    !ring.ringing || ring.number != number
                };
                if is_new {
                    info!(number = ?number, "Incoming call");
                    self.ring.send_replace(RingState {
                        ringing: true,
                        number: number.clone(),
                    });
                    emit(&self.events, ModemEvent::RingStart(number));
                }
                self.last_ring = Some(Instant::now());
            }
            ModemLine::CallEnded => self.ring_end(),
            ModemLine::Other(_) => {}
        }
    }

    fn ring_end(&mut self) {
        if !self.ring.borrow().ringing {
            return;
        }
        self.ring.send_replace(RingState::default());
        self.last_ring = None;
        info!("Call ended");
        emit(&self.events, ModemEvent::RingEnd);
    }
}
