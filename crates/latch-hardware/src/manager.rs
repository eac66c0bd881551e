//! Driver task supervision.
//!
//! Every driver runs in its own task and reports into one shared event
//! channel. The manager collects the drivers, spawns them together and hands
//! back the event stream for the orchestrator plus a handle that can stop
//! them.
//!
//! ```text
//! ┌──────────┐
//! │ Lock     │──────►┌─────────────────┐
//! └──────────┘       │                 │
//! ┌──────────┐       │  Event Channel  │
//! │ Modem    │──────►│  (mpsc)         │──────► Orchestrator
//! └──────────┘       │                 │
//! ┌──────────┐       │                 │
//! │ Terminal │──────►└─────────────────┘
//! └──────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::discovery::DeviceDiscovery;
use crate::events::{EventReceiver, EventSender, event_channel};
use crate::link::SerialLink;
use crate::lock::LockActuator;
use crate::modem::ModemController;
use crate::sensor::DoorSensor;
use crate::terminal::TerminalLink;

type DriverFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Which driver a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Lock,
    Modem,
    Terminal,

    /// Simulated device firmware.
    Simulator,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => write!(f, "lock"),
            Self::Modem => write!(f, "modem"),
            Self::Terminal => write!(f, "terminal"),
            Self::Simulator => write!(f, "simulator"),
        }
    }
}

/// How a driver task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    /// Returned after its handles were dropped.
    Finished,
    /// Aborted during shutdown.
    Cancelled,
    Panicked,
}

fn classify(result: std::result::Result<DriverKind, JoinError>) -> TaskTermination {
    match result {
        Ok(_) => TaskTermination::Finished,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panicked,
    }
}

/// Collects drivers before they are started.
///
/// # Examples
///
/// ```
/// use latch_hardware::lock::{LockActuator, LockConfig};
/// use latch_hardware::manager::DriverManager;
/// use latch_hardware::mock::{MemoryLink, MockSensor};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut manager = DriverManager::new();
///
/// let (link, _link) = MemoryLink::new("lock");
/// let (sensor, _sensor) = MockSensor::new();
/// let (lock, lock_handle) =
///     LockActuator::new(link, sensor, LockConfig::default(), manager.events());
/// manager.register_lock(lock);
///
/// let (_events, drivers) = manager.start();
/// assert!(!lock_handle.state().is_unlocked);
/// drivers.shutdown().await;
/// # }
/// ```
pub struct DriverManager {
    events_tx: EventSender,
    events_rx: EventReceiver,
    drivers: Vec<(DriverKind, DriverFuture)>,
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverManager {
    pub fn new() -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            events_tx,
            events_rx,
            drivers: Vec::new(),
        }
    }

    /// Sender to pass to driver constructors.
    pub fn events(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn register_lock<L: SerialLink, S: DoorSensor>(&mut self, actuator: LockActuator<L, S>) {
        self.register(DriverKind::Lock, actuator.run());
    }

    pub fn register_modem<L: SerialLink, D: DeviceDiscovery>(
        &mut self,
        controller: ModemController<L, D>,
    ) {
        self.register(DriverKind::Modem, controller.run());
    }

    pub fn register_terminal<L: SerialLink>(&mut self, terminal: TerminalLink<L>) {
        self.register(DriverKind::Terminal, terminal.run());
    }

    /// Register any other long-running task, such as simulated firmware.
    pub fn register(&mut self, kind: DriverKind, task: impl Future<Output = ()> + Send + 'static) {
        self.drivers.push((kind, Box::pin(task)));
    }

    /// Spawn every registered driver.
    ///
    /// The event stream ends once every driver has stopped.
    pub fn start(self) -> (EventReceiver, DriverTasks) {
        let mut tasks = JoinSet::new();
        for (kind, driver) in self.drivers {
            debug!(driver = %kind, "Starting driver");
            tasks.spawn(async move {
                driver.await;
                kind
            });
        }
        (self.events_rx, DriverTasks { tasks })
    }
}

/// Running driver tasks.
pub struct DriverTasks {
    tasks: JoinSet<DriverKind>,
}

impl DriverTasks {
    /// Number of drivers still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until any driver stops. Drivers only stop on their own when
    /// their handles are dropped, so this normally never resolves while the
    /// orchestrator runs.
    pub async fn stopped(&mut self) -> Option<DriverKind> {
        loop {
            match self.tasks.join_next().await? {
                Ok(kind) => {
                    warn!(driver = %kind, "Driver stopped");
                    return Some(kind);
                }
                Err(e) if e.is_panic() => error!(error = %e, "Driver panicked"),
                Err(_) => {}
            }
        }
    }

    /// Abort every driver and wait for them to end.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();

        let mut panics = 0;
        while let Some(result) = self.tasks.join_next().await {
            if classify(result) == TaskTermination::Panicked {
                panics += 1;
            }
        }

        if panics > 0 {
            error!(panics, "Drivers panicked before shutdown");
        } else {
            debug!("Drivers stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DoorEvent, HardwareEvent};
    use crate::lock::{LockConfig, LockHandle};
    use crate::mock::{MemoryLink, MockSensor, MockSensorHandle};
    use std::time::Duration;

    fn lock_manager() -> (DriverManager, LockHandle, MockSensorHandle) {
        let mut manager = DriverManager::new();
        let (link, _link) = MemoryLink::new("lock");
        let (sensor, sensor_handle) = MockSensor::new();
        let (lock, handle) = LockActuator::new(link, sensor, LockConfig::default(), manager.events());
        manager.register_lock(lock);
        (manager, handle, sensor_handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_through_manager() {
        let (manager, _lock, sensor) = lock_manager();
        let (mut events, drivers) = manager.start();

        sensor.set_open(true);
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(HardwareEvent::Door(DoorEvent::OpenChanged(true))));

        drivers.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_stops_when_handles_dropped() {
        let (manager, lock, _sensor) = lock_manager();
        let (_events, mut drivers) = manager.start();
        assert_eq!(drivers.len(), 1);

        drop(lock);
        assert_eq!(drivers.stopped().await, Some(DriverKind::Lock));
        assert!(drivers.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_drivers() {
        let (events, drivers) = DriverManager::new().start();
        drivers.shutdown().await;
        drop(events);
    }

    #[tokio::test]
    async fn test_event_stream_ends_after_shutdown() {
        let (manager, _lock, _sensor) = lock_manager();
        let (mut events, drivers) = manager.start();
        drivers.shutdown().await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let mut manager = DriverManager::new();
        manager.register(DriverKind::Simulator, async { panic!("firmware crashed") });
        manager.register(DriverKind::Simulator, std::future::pending());
        let (_events, drivers) = manager.start();

        tokio::task::yield_now().await;
        drivers.shutdown().await;
    }
}
