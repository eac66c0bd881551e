pub mod check_config;
pub mod run;
pub mod simulate;
pub mod test_lock;
pub mod test_modem;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use latch_controller::{
    Devices, LogNotifier, LogSpeaker, Orchestrator, OrchestratorConfig, OrchestratorHandle,
};
use latch_core::Settings;
use latch_hardware::{
    DriverManager, DriverTasks, EventSender, LockActuator, LockConfig, LockHandle, ModemConfig,
    ModemController, ModemHandle, SerialPortConfig, SerialPortLink, SysfsGpioSensor,
    SysfsUsbDiscovery,
};
use latch_storage::MemoryRoster;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Load a configuration file that must exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| format!("failed to load configuration {}", path.display()))
}

/// Load a configuration file, using the defaults when there is none.
pub fn load_settings_or_default(path: &Path) -> Result<Settings> {
    if path.exists() {
        load_settings(path)
    } else {
        info!(path = %path.display(), "No configuration file, using defaults");
        Ok(Settings::default())
    }
}

/// Lock actuator on the configured relay line and door switch.
pub fn lock_actuator(
    settings: &Settings,
    events: EventSender,
) -> (LockActuator<SerialPortLink, SysfsGpioSensor>, LockHandle) {
    let door = &settings.door;
    let link = SerialPortLink::new(SerialPortConfig::new(&door.lock_serial_device, door.baud_rate));
    let sensor = SysfsGpioSensor::new(&door.switch_gpio_path, door.switch_open_level);
    LockActuator::new(link, sensor, LockConfig::from(door), events)
}

/// Modem controller on the configured control port.
pub fn modem_controller(
    settings: &Settings,
    events: EventSender,
) -> (ModemController<SerialPortLink, SysfsUsbDiscovery>, ModemHandle) {
    let modem = &settings.modem;
    let link = SerialPortLink::new(
        SerialPortConfig::new(&modem.serial_port, modem.baud_rate).with_modem_control(),
    );
    let discovery = SysfsUsbDiscovery::new(
        &modem.serial_port,
        modem.mode_switch_usb_id.clone(),
        modem.mode_switch_command.clone(),
    );
    ModemController::new(link, discovery, ModemConfig::from(modem), events)
}

/// A started controller: drivers plus the orchestrator task.
pub struct Controller {
    drivers: DriverTasks,
    orchestrator: JoinHandle<()>,
    handle: OrchestratorHandle,
}

impl Controller {
    /// Start the registered drivers and the orchestrator on top of them.
    pub fn start(
        settings: &Settings,
        manager: DriverManager,
        devices: Devices,
        roster: MemoryRoster,
    ) -> Self {
        let (orchestrator, handle) = Orchestrator::new(
            OrchestratorConfig::from(settings),
            devices,
            roster,
            Arc::new(LogNotifier),
            Arc::new(LogSpeaker),
        );

        let (events, drivers) = manager.start();
        let orchestrator = tokio::spawn(orchestrator.run(events));
        info!(drivers = drivers.len(), "Controller started");

        Self {
            drivers,
            orchestrator,
            handle,
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    /// Run until `stop` resolves or a task ends, then shut everything down.
    pub async fn run_until(mut self, stop: impl Future) {
        tokio::select! {
            _ = stop => info!("Shutting down"),
            stopped = self.drivers.stopped() => {
                if let Some(kind) = stopped {
                    warn!(driver = %kind, "Driver ended, shutting down");
                }
            }
            _ = &mut self.orchestrator => warn!("Orchestrator ended, shutting down"),
        }

        self.orchestrator.abort();
        self.drivers.shutdown().await;
    }
}
