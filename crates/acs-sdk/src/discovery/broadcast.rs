//! Vendor broadcast discovery through live native sessions

use acs_core::{DiscoveredDevice, DiscoverySource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BootstrapHost;
use crate::error::{SdkError, SdkResult};
use crate::gateway::SdkGateway;
use crate::native::SearchedDevice;

/// Session opened only for a search, logged out when dropped
struct BootstrapSession {
    gateway: SdkGateway,
    handle: i32,
}

impl Drop for BootstrapSession {
    fn drop(&mut self) {
        debug!(handle = self.handle, "Closing bootstrap session");
        self.gateway.logout_blocking(self.handle);
    }
}

/// Search once per distinct session, or through a bootstrap session
///
/// With no sessions and no bootstrap host there is nothing to search from and
/// the result is empty.
pub(crate) async fn search(
    gateway: &SdkGateway,
    mut handles: Vec<i32>,
    bootstrap: Option<BootstrapHost>,
    cancel: &CancellationToken,
) -> SdkResult<Vec<DiscoveredDevice>> {
    handles.sort_unstable();
    handles.dedup();

    if handles.is_empty() && bootstrap.is_none() {
        info!("No live session and no bootstrap host, skipping broadcast discovery");
        return Ok(Vec::new());
    }

    let gateway = gateway.clone();
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || -> SdkResult<Vec<DiscoveredDevice>> {
        let _bootstrap = match (handles.is_empty(), bootstrap) {
            (true, Some(host)) => {
                let outcome = gateway.login_blocking(host.ip, host.port)?;
                handles.push(outcome.handle);
                Some(BootstrapSession {
                    gateway: gateway.clone(),
                    handle: outcome.handle,
                })
            }
            _ => None,
        };

        let mut found = Vec::new();
        for handle in handles {
            if cancel.is_cancelled() {
                debug!("Broadcast discovery cancelled");
                break;
            }
            match gateway.search_blocking(handle) {
                Ok(devices) => found.extend(devices.into_iter().map(to_discovered)),
                Err(e) => warn!(handle, error = %e, "Device search failed on session"),
            }
        }
        Ok(found)
    })
    .await
    .map_err(|e| SdkError::Unavailable(format!("device search task failed: {}", e)))?
}

fn to_discovered(device: SearchedDevice) -> DiscoveredDevice {
    let synthesized = DiscoveredDevice::synthesized_id(device.ip, device.port);
    DiscoveredDevice {
        id: device.serial_number.unwrap_or_else(|| synthesized.clone()),
        name: device
            .name
            .or_else(|| device.model.clone())
            .unwrap_or(synthesized),
        ip: device.ip,
        port: device.port,
        model: device.model,
        auth_required: false,
        source: DiscoverySource::Broadcast,
    }
}
