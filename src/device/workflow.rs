//! Multi-step session workflows built on the connection manager.
//!
//! These are the places a reboot happens, so they are also where a lost
//! device is an error: carrying on with a stale binding is never safe.
use tokio::time::sleep;

use crate::serial::CommandClient;
use super::manager::{Connector, DeviceManager};
use super::port_monitor::{PortChangeDetector, PortEnumerator};
use super::{DeviceError, DeviceMode, Result};

/// Make sure the bound device runs in `desired` mode, switching and
/// rebooting it if needed, and return the (possibly re-bound) client.
pub async fn ensure_mode<'m, C, E>(
    manager: &'m mut DeviceManager<C>,
    enumerator: &E,
    desired: DeviceMode,
) -> Result<&'m mut CommandClient>
where
    C: Connector,
    E: PortEnumerator,
{
    if !desired.is_switchable() {
        return Err(DeviceError::UnsupportedMode(desired.to_string()));
    }

    let current = manager.get_device(None).await?.get_device_mode().await?;
    if current == desired {
        log::debug!("Device already in {} mode", desired);
        return manager.get_device(None).await;
    }

    log::info!("Switching device from {} to {} mode", current, desired);
    let settle = manager.settle_duration();
    let bound = &mut *manager;
    let (outcome, change) = PortChangeDetector::scope(enumerator, move || async move {
        let client = bound.get_device(None).await?;
        client.switch_mode(desired).await?;

        log::info!("Rebooting the board after changing mode");
        if let Err(e) = client.restart_device().await {
            // the board often drops the link before answering
            log::debug!("No clean answer to restart_device: {}", e);
        }

        log::info!("Waiting {:?} for the device to boot in {} mode", settle, desired);
        sleep(settle).await;
        Ok::<(), DeviceError>(())
    })
    .await?;
    outcome?;

    let new_port = change.new_port().ok_or(DeviceError::NoNewPort)?;
    manager.get_device(Some(&new_port)).await
}

/// Restart the bound device and follow it to a new port if it comes back
/// under one. Returns `true` if the manager was re-bound.
pub async fn restart_and_follow<C, E>(manager: &mut DeviceManager<C>, enumerator: &E) -> Result<bool>
where
    C: Connector,
    E: PortEnumerator,
{
    let settle = manager.settle_duration();
    let bound = &mut *manager;
    let (outcome, change) = PortChangeDetector::scope(enumerator, move || async move {
        let client = bound.get_device(None).await?;
        if let Err(e) = client.restart_device().await {
            log::debug!("No clean answer to restart_device: {}", e);
        }
        sleep(settle).await;
        Ok::<(), DeviceError>(())
    })
    .await?;
    outcome?;

    match change.new_port() {
        Some(port) => {
            manager.get_device(Some(&port)).await?;
            Ok(true)
        }
        None => {
            log::debug!("Device came back on the same port");
            Ok(false)
        }
    }
}

/// End-of-session cleanup: reset all config, restart, release the port
pub async fn cleanup_session<C: Connector>(manager: &mut DeviceManager<C>) -> Result<()> {
    log::info!("Cleanup: resetting the config and restarting device");
    let result = async {
        let client = manager.get_device(None).await?;
        client.reset_config("all").await?;
        if let Err(e) = client.restart_device().await {
            log::debug!("No clean answer to restart_device: {}", e);
        }
        Ok::<(), DeviceError>(())
    }
    .await;

    manager.teardown();
    result
}
