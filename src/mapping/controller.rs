use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::MappingError;
use crate::mapping::backend::MappingBackend;
use crate::mapping::events::ControlEvent;
use crate::model::{PatchId, PatientId};
use crate::state::Hub;

/// Mapping controller: seeds the initial roster, then applies live
/// control-plane updates to the shared mailboxes (spec §4.2).
pub struct MappingController<B> {
    hub: Arc<Hub>,
    backend: B,
}

impl<B: MappingBackend> MappingController<B> {
    pub fn new(hub: Arc<Hub>, backend: B) -> Self {
        Self { hub, backend }
    }

    /// Runs the initial fetch, seeding `patient_mapping` and queuing a
    /// `Connect` intent for every bound patch (spec §4.2 Initial fetch).
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<(), MappingError> {
        let roster = self.backend.fetch_initial_roster().await?;

        for (patch_id, patient_id) in roster.patient_mapping {
            self.hub.connect_patient(patch_id, patient_id);
        }
        *self.hub.dynamic_config.write() = roster.dynamic_config;
        self.hub.set_smartpatch_config(roster.smartpatch_config);

        info!(
            patients = self.hub.patient_mapping.len(),
            "seeded initial patient mapping"
        );
        Ok(())
    }

    /// Blocks on the next control-plane event and applies it. Intended
    /// to be called in a loop by the mapping thread.
    #[instrument(skip(self))]
    pub async fn run_once(&mut self) -> Result<(), MappingError> {
        let event = self.backend.next_event().await?;
        self.apply(event);
        Ok(())
    }

    fn apply(&self, event: ControlEvent) {
        match event {
            ControlEvent::Connected {
                patient_id,
                patch_id,
            } => self.handle_connected(patient_id, patch_id),
            ControlEvent::Disconnected { patch_id } => self.handle_disconnected(patch_id),
            ControlEvent::SmartPatchConfig { byte } => {
                self.hub.set_smartpatch_config(byte);
            }
            ControlEvent::BaseStationFlag { key, value } => {
                let applied = self.hub.dynamic_config.write().apply_named(&key, value);
                if applied {
                    info!(key, value, "base-station configuration updated, restart required to apply");
                } else {
                    warn!(key, "unrecognised base-station configuration key, ignored");
                }
            }
            ControlEvent::Other { topic } => {
                warn!(topic, "ignoring unrecognised control-plane event");
            }
        }
    }

    /// Binds `patch_id` to `patient_id`, evicting any older patch bound
    /// to the same patient first (spec §3 Invariant 3, §4.2 `Connected`).
    fn handle_connected(&self, patient_id: PatientId, patch_id: PatchId) {
        let stale: Vec<PatchId> = self.hub.patient_mapping.with(|map| {
            map.iter()
                .filter(|(_, bound)| **bound == patient_id)
                .map(|(&patch, _)| patch)
                .collect()
        });

        for old_patch_id in stale {
            self.hub.patient_mapping.remove(&old_patch_id);
            self.hub
                .mac_address_update
                .insert(old_patch_id, crate::model::Intent::Disconnect);
            info!(%old_patch_id, %patient_id, "evicting stale patch binding for patient");
        }

        self.hub.connect_patient(patch_id, patient_id);
    }

    fn handle_disconnected(&self, patch_id: Option<PatchId>) {
        match patch_id {
            Some(patch_id) => self.hub.disconnect_patient(patch_id, false),
            None => {
                // Sentinel "disconnected" payload: nothing was connected
                // under this key, so there is nothing to tear down.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mapping::backend::fake::FakeBackend;
    use crate::mapping::backend::InitialRoster;
    use crate::model::Intent;

    fn patch(n: u64) -> PatchId {
        PatchId::from_u48(n)
    }

    #[tokio::test]
    async fn bootstrap_seeds_mapping_and_connect_intents() {
        let hub = Arc::new(Hub::new());
        let backend = FakeBackend {
            roster: InitialRoster {
                patient_mapping: vec![(patch(1), PatientId::new("p-1"))],
                ..InitialRoster::default()
            },
            events: VecDeque::new(),
        };
        let controller = MappingController::new(hub.clone(), backend);
        controller.bootstrap().await.expect("bootstrap succeeds");

        assert_eq!(Some(PatientId::new("p-1")), hub.patient_mapping.get_cloned(&patch(1)));
        assert_eq!(Some(Intent::Connect), hub.mac_address_update.get_cloned(&patch(1)));
    }

    #[tokio::test]
    async fn connected_event_evicts_previous_patch_for_same_patient() {
        let hub = Arc::new(Hub::new());
        hub.connect_patient(patch(1), PatientId::new("p-1"));
        hub.mac_address_update.remove(&patch(1));

        let backend = FakeBackend {
            roster: InitialRoster::default(),
            events: VecDeque::from(vec![ControlEvent::Connected {
                patient_id: PatientId::new("p-1"),
                patch_id: patch(2),
            }]),
        };
        let mut controller = MappingController::new(hub.clone(), backend);
        controller.run_once().await.expect("event applies");

        assert!(hub.patient_mapping.get_cloned(&patch(1)).is_none());
        assert_eq!(Some(Intent::Disconnect), hub.mac_address_update.get_cloned(&patch(1)));
        assert_eq!(Some(PatientId::new("p-1")), hub.patient_mapping.get_cloned(&patch(2)));
        assert_eq!(Some(Intent::Connect), hub.mac_address_update.get_cloned(&patch(2)));
    }

    #[tokio::test]
    async fn base_station_flag_update_mutates_dynamic_config() {
        let hub = Arc::new(Hub::new());
        let backend = FakeBackend {
            roster: InitialRoster::default(),
            events: VecDeque::from(vec![ControlEvent::BaseStationFlag {
                key: "saveRawData".to_string(),
                value: true,
            }]),
        };
        let mut controller = MappingController::new(hub.clone(), backend);
        controller.run_once().await.expect("event applies");

        assert!(hub.dynamic_config.read().save_raw_data);
    }
}
