use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::model::Intent;
use crate::state::Hub;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Cleans up disconnect intents targeting patches that are no longer
/// connected (spec §4.3 Janitor task). Runs alongside the connection
/// workers on the same cooperative runtime.
pub struct Janitor {
    hub: Arc<Hub>,
}

impl Janitor {
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    pub async fn run_forever(&self) {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;
            self.sweep();
        }
    }

    pub fn sweep(&self) {
        let stale: Vec<_> = self.hub.mac_address_update.with(|map| {
            map.iter()
                .filter(|(_, intent)| **intent == Intent::Disconnect)
                .map(|(&patch, _)| patch)
                .filter(|patch_id| self.hub.connected_devices.get_cloned(patch_id).is_none())
                .collect()
        });

        for patch_id in stale {
            self.hub.mac_address_update.remove(&patch_id);
            info!(%patch_id, "janitor removed stale disconnect intent");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::PatchId;

    #[test]
    fn sweep_removes_disconnect_intent_for_absent_patch() {
        let hub = Arc::new(Hub::new());
        let patch_id = PatchId::from_u48(1);
        hub.mac_address_update.insert(patch_id, Intent::Disconnect);

        Janitor::new(hub.clone()).sweep();

        assert!(hub.mac_address_update.get_cloned(&patch_id).is_none());
    }

    #[test]
    fn sweep_keeps_disconnect_intent_for_connected_patch() {
        let hub = Arc::new(Hub::new());
        let patch_id = PatchId::from_u48(1);
        hub.mac_address_update.insert(patch_id, Intent::Disconnect);
        hub.connected_devices.insert(patch_id, "1.0.0".to_string());

        Janitor::new(hub.clone()).sweep();

        assert_eq!(
            Some(Intent::Disconnect),
            hub.mac_address_update.get_cloned(&patch_id)
        );
    }
}
