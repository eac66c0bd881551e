use anyhow::Result;
use latch_core::Settings;
use latch_hardware::events::event_channel;
use tracing::info;

use super::modem_controller;

pub async fn run(settings: &Settings) -> Result<()> {
    let (events_tx, mut events) = event_channel();
    let (controller, modem) = modem_controller(settings, events_tx);
    let task = tokio::spawn(controller.run());
    info!(port = %settings.modem.serial_port, "Watching modem, Ctrl-C to stop");

    loop {
        tokio::select! {
            Some(event) = events.recv() => info!(?event, ring = ?modem.ring_state(), "Modem event"),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    task.abort();
    Ok(())
}
