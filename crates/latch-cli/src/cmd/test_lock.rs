use std::time::Duration;

use anyhow::{Context, Result};
use latch_core::Settings;
use latch_hardware::events::event_channel;
use tokio::time::sleep_until;
use tracing::info;

use super::lock_actuator;

/// Time to keep watching the door switch after the pulse ends.
const LINGER: Duration = Duration::from_secs(1);

pub async fn run(settings: &Settings, seconds: f64) -> Result<()> {
    let duration = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid unlock duration {seconds}"))?;

    let (events_tx, mut events) = event_channel();
    let (actuator, lock) = lock_actuator(settings, events_tx);
    let task = tokio::spawn(actuator.run());

    let session = lock.unlock(duration).await.context("unlock failed")?;
    info!(session = session.id, bytes = session.bytes, ?duration, "Unlocked");

    let deadline = session.expires_at + LINGER;
    loop {
        tokio::select! {
            Some(event) = events.recv() => info!(?event, "Door event"),
            _ = sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                lock.lock();
                break;
            }
        }
    }

    info!(state = ?lock.state(), "Done");
    drop(lock);
    task.await.context("lock task failed")?;
    Ok(())
}
