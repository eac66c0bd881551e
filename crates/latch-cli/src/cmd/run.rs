use std::sync::Arc;

use anyhow::{Context, Result};
use latch_controller::Devices;
use latch_core::Settings;
use latch_hardware::{
    DriverManager, FeedbackPlayer, SerialPortConfig, SerialPortLink, TerminalConfig,
    TerminalHandle, TerminalLink,
};
use latch_storage::MemoryRoster;
use tracing::{info, warn};

use super::{Controller, lock_actuator, modem_controller};

pub async fn run(settings: &Settings) -> Result<()> {
    let roster = MemoryRoster::open(&settings.roster.path).with_context(|| {
        format!("failed to load roster {}", settings.roster.path.display())
    })?;
    info!(members = roster.len(), "Roster ready");

    let mut manager = DriverManager::new();

    let (actuator, lock) = lock_actuator(settings, manager.events());
    manager.register_lock(actuator);

    let (controller, modem) = modem_controller(settings, manager.events());
    manager.register_modem(controller);

    let terminal = match &settings.reader.serial_port {
        Some(port) => {
            let link = SerialPortLink::new(SerialPortConfig::new(port, settings.reader.baud_rate));
            let (link, handle) =
                TerminalLink::new(link, TerminalConfig::from(&settings.reader), manager.events());
            manager.register_terminal(link);
            handle
        }
        None => {
            warn!("No reader terminal configured");
            TerminalHandle::disconnected()
        }
    };

    let devices = Devices {
        lock,
        modem,
        feedback: FeedbackPlayer::new(Arc::new(terminal)),
    };

    Controller::start(settings, manager, devices, roster)
        .run_until(tokio::signal::ctrl_c())
        .await;
    Ok(())
}
