//! Lock actuator driver.
//!
//! The lock relay is wired to a serial TX line and stays energized while
//! data is being clocked out. An unlock therefore streams a fixed number of
//! filler bytes, computed from the baud rate, and the pulse ends by itself
//! when the last byte has left the transmit buffer. `lock()` cuts it short
//! by discarding whatever is still buffered and closing the port.
//!
//! ```text
//! Locked ──unlock(d)──► Unlocking ──budget sent / lock() / error──► Locked
//! ```
//!
//! The door switch is sampled on a fixed interval by the same task and
//! reported on edges only.

use std::time::Duration;

use latch_core::constants::{
    BITS_PER_BYTE, DEFAULT_LOCK_BAUD_RATE, DEFAULT_SENSOR_POLL_INTERVAL, LOCK_FILLER_BYTE,
    LOCK_WRITE_CHUNK, MAX_UNLOCK_DURATION,
};
use latch_core::DoorState;
use latch_core::settings::DoorSettings;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::events::{DoorEvent, EventSender, emit};
use crate::link::SerialLink;
use crate::log_once::LogOnce;
use crate::sensor::DoorSensor;
use crate::{HardwareError, Result};

/// Pause between write attempts while the device buffer is full.
const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Number of filler bytes that keep the relay energized for `duration`.
///
/// ```
/// use std::time::Duration;
/// use latch_hardware::lock::pulse_bytes;
///
/// assert_eq!(pulse_bytes(9600, Duration::from_secs(10)), 9600);
/// assert_eq!(pulse_bytes(9600, Duration::from_millis(1500)), 1440);
/// ```
pub fn pulse_bytes(baud_rate: u32, duration: Duration) -> u64 {
    let bytes_per_second = f64::from(baud_rate) / f64::from(BITS_PER_BYTE);
    (bytes_per_second * duration.as_secs_f64()) as u64
}

/// Lock driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Baud rate of the relay line.
    pub baud_rate: u32,

    /// Door switch sampling interval.
    pub sensor_poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_LOCK_BAUD_RATE,
            sensor_poll_interval: DEFAULT_SENSOR_POLL_INTERVAL,
        }
    }
}

impl From<&DoorSettings> for LockConfig {
    fn from(settings: &DoorSettings) -> Self {
        Self {
            baud_rate: settings.baud_rate,
            sensor_poll_interval: settings.sensor_poll_interval(),
        }
    }
}

/// A granted unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockSession {
    /// Monotonically increasing session number.
    pub id: u64,

    /// Requested duration.
    pub duration: Duration,

    /// When the pulse is expected to end.
    pub expires_at: Instant,

    /// Filler bytes budgeted for the pulse.
    pub bytes: u64,
}

#[derive(Debug)]
enum LockCommand {
    Unlock {
        duration: Duration,
        reply: oneshot::Sender<Result<UnlockSession>>,
    },
    Lock,
}

/// Cloneable handle to a running [`LockActuator`].
#[derive(Debug, Clone)]
pub struct LockHandle {
    commands: mpsc::UnboundedSender<LockCommand>,
    state: watch::Receiver<DoorState>,
}

impl LockHandle {
    /// Energize the lock for `duration`.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::InvalidDuration`] unless `0 < duration < 30 s`.
    /// - [`HardwareError::AlreadyUnlocked`] while a session is running; the
    ///   running session is not extended.
    /// - A transport error if the relay line cannot be opened or written.
    ///   The lock is left locked.
    pub async fn unlock(&self, duration: Duration) -> Result<UnlockSession> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(LockCommand::Unlock { duration, reply })
            .map_err(|_| HardwareError::disconnected("lock actuator"))?;
        response
            .await
            .map_err(|_| HardwareError::disconnected("lock actuator"))?
    }

    /// Relock immediately.
    pub fn lock(&self) {
        let _ = self.commands.send(LockCommand::Lock);
    }

    /// Current door state.
    pub fn state(&self) -> DoorState {
        *self.state.borrow()
    }

    /// Watch door state changes.
    pub fn subscribe(&self) -> watch::Receiver<DoorState> {
        self.state.clone()
    }
}

struct Pulse {
    id: u64,
    bytes_left: u64,
}

/// Lock relay and door switch driver task.
pub struct LockActuator<L, S> {
    link: L,
    sensor: S,
    config: LockConfig,
    events: EventSender,
    commands: mpsc::UnboundedReceiver<LockCommand>,
    state: watch::Sender<DoorState>,
    pulse: Option<Pulse>,
    next_session_id: u64,
    sensor_errors: LogOnce,
}

impl<L: SerialLink, S: DoorSensor> LockActuator<L, S> {
    /// Create the driver and its handle. Nothing happens until [`run`].
    ///
    /// [`run`]: LockActuator::run
    pub fn new(link: L, sensor: S, config: LockConfig, events: EventSender) -> (Self, LockHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(DoorState::default());

        let actuator = Self {
            link,
            sensor,
            config,
            events,
            commands,
            state,
            pulse: None,
            next_session_id: 0,
            sensor_errors: LogOnce::new(),
        };
        let handle = LockHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (actuator, handle)
    }

    /// Drive the relay and sample the switch until every handle is dropped.
    pub async fn run(mut self) {
        let mut sensor_tick = tokio::time::interval(self.config.sensor_poll_interval);
        sensor_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(LockCommand::Unlock { duration, reply }) => {
                        let result = self.unlock(duration);
                        let _ = reply.send(result);
                    }
                    Some(LockCommand::Lock) => self.lock(),
                    None => break,
                },
                _ = sensor_tick.tick() => self.poll_sensor(),
                _ = tokio::time::sleep(WRITE_RETRY_INTERVAL), if self.pulse.is_some() => {
                    // Failures are logged and relock inside pump.
                    let _ = self.pump();
                }
            }
        }

        self.close_port();
    }

    fn unlock(&mut self, duration: Duration) -> Result<UnlockSession> {
        if duration.is_zero() {
            warn!(?duration, "Invalid unlock duration");
            return Err(HardwareError::InvalidDuration { duration });
        }
        if duration >= MAX_UNLOCK_DURATION {
            error!(?duration, "Unlock duration too long");
            return Err(HardwareError::InvalidDuration { duration });
        }
        if self.state.borrow().is_unlocked {
            warn!("Door already unlocked");
            return Err(HardwareError::AlreadyUnlocked);
        }

        let bytes = pulse_bytes(self.config.baud_rate, duration);

        self.link.close();
        if let Err(e) = self.link.open() {
            error!(device = %self.link.name(), error = %e, "Failed to unlock door");
            self.close_port();
            return Err(e);
        }

        self.next_session_id += 1;
        let session = UnlockSession {
            id: self.next_session_id,
            duration,
            expires_at: Instant::now() + duration,
            bytes,
        };
        self.pulse = Some(Pulse {
            id: session.id,
            bytes_left: bytes,
        });
        self.set_unlocked(true);

        self.pump()?;

        info!(session = session.id, ?duration, bytes, "Lock energized");
        Ok(session)
    }

    fn lock(&mut self) {
        if self.pulse.is_some() {
            info!("Locking door immediately");
        }
        self.close_port();
    }

    /// Push as much of the remaining budget as the line accepts. The pulse
    /// ends (and the port closes) once the budget is written and the
    /// transmit buffer has drained.
    fn pump(&mut self) -> Result<()> {
        let Some(pulse) = self.pulse.as_mut() else {
            return Ok(());
        };

        while pulse.bytes_left > 0 {
            let chunk = pulse.bytes_left.min(LOCK_WRITE_CHUNK as u64) as usize;
            let filler = [LOCK_FILLER_BYTE; LOCK_WRITE_CHUNK];

            match self.link.write(&filler[..chunk]) {
                Ok(0) => return Ok(()),
                Ok(written) => pulse.bytes_left -= written as u64,
                Err(e) => {
                    error!(session = pulse.id, error = %e, "Error writing to lock relay");
                    self.close_port();
                    return Err(e);
                }
            }
        }

        match self.link.pending_output() {
            Ok(0) => {}
            Ok(_) => return Ok(()),
            Err(e) => {
                error!(session = pulse.id, error = %e, "Error reading lock relay buffer");
                self.close_port();
                return Err(e);
            }
        }

        info!(session = pulse.id, "Lock pulse finished");
        self.close_port();
        Ok(())
    }

    /// End any pulse: drop buffered filler so the relay releases now, then
    /// close the line.
    fn close_port(&mut self) {
        if self.pulse.take().is_some()
            && self.link.is_open()
            && let Err(e) = self.link.discard_output()
        {
            warn!(device = %self.link.name(), error = %e, "Failed to discard lock relay buffer");
        }
        self.link.close();
        self.set_unlocked(false);
    }

    fn poll_sensor(&mut self) {
        match self.sensor.is_open() {
            Ok(is_open) => {
                self.sensor_errors.clear();
                self.set_open(is_open);
            }
            Err(e) => {
                if self.sensor_errors.check(&e) {
                    error!(error = %e, "Failed to read door switch");
                }
            }
        }
    }

    fn set_unlocked(&mut self, is_unlocked: bool) {
        let changed = self.state.send_if_modified(|state| {
            let changed = state.is_unlocked != is_unlocked;
            state.is_unlocked = is_unlocked;
            changed
        });
        if changed {
            emit(&self.events, DoorEvent::UnlockedChanged(is_unlocked));
        }
    }

    fn set_open(&mut self, is_open: bool) {
        let changed = self.state.send_if_modified(|state| {
            let changed = state.is_open != is_open;
            state.is_open = is_open;
            changed
        });
        if changed {
            emit(&self.events, DoorEvent::OpenChanged(is_open));
        }
    }
}
