use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::DynamicConfig;
use crate::model::{Intent, PatchId, PatientId, ProcessedRecord, RawSample};
use crate::state::mailbox::Mailbox;

/// The six mailboxes mediating every stage of the pipeline (spec §4.1).
///
/// Held behind an `Arc` and cloned cheaply into each of the five logical
/// threads; each field is independently lock-guarded so unrelated stages
/// never contend on the same lock. The one cross-mailbox invariant —
/// `patient_mapping` locked before `mac_address_update` on the connect
/// path — is enforced by [`Hub::connect_patient`] rather than left to
/// caller discipline.
#[derive(Debug, Default)]
pub struct Hub {
    pub mac_address_update: Mailbox<PatchId, Intent>,
    pub patient_mapping: Mailbox<PatchId, PatientId>,
    smartpatch_config: AtomicU8,
    /// When the current `smartpatch_config` byte was set, used to
    /// enforce the 30s propagation window before it is cleared (spec
    /// §4.3 Per-second housekeeping).
    config_set_at: Mutex<Option<Instant>>,
    pub connected_devices: Mailbox<PatchId, String>,
    pub unprocessed_data: Mailbox<PatchId, Vec<RawSample>>,
    pub processed_data: Mailbox<PatchId, Vec<ProcessedRecord>>,
    /// The five live-updatable boolean flags (spec §4.2, §4.5). Seeded
    /// from [`crate::config::RuntimeConfig`] at startup; the mapping
    /// controller updates this copy on a control-plane event but, per
    /// spec, logs that a restart is required rather than having other
    /// stages react to it mid-run.
    pub dynamic_config: RwLock<DynamicConfig>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dynamic_config(dynamic_config: DynamicConfig) -> Self {
        Self {
            dynamic_config: RwLock::new(dynamic_config),
            ..Self::default()
        }
    }

    pub fn smartpatch_config(&self) -> u8 {
        self.smartpatch_config.load(Ordering::Acquire)
    }

    pub fn set_smartpatch_config(&self, byte: u8) {
        self.smartpatch_config.store(byte, Ordering::Release);
        *self.config_set_at.lock() = if byte == 0 { None } else { Some(Instant::now()) };
    }

    /// Clears the pending config byte if the 30s propagation window has
    /// elapsed since it was set. Any worker observing this during its
    /// per-second housekeeping may be the one that performs the clear;
    /// the check is idempotent so a race just means two workers both see
    /// it already cleared (spec §4.3: "cleared exactly once by whichever
    /// worker finishes last").
    pub fn clear_smartpatch_config_if_expired(&self, window: std::time::Duration) {
        let mut set_at = self.config_set_at.lock();
        if let Some(when) = *set_at {
            if when.elapsed() >= window {
                self.smartpatch_config.store(0, Ordering::Release);
                *set_at = None;
            }
        }
    }

    /// Seeds or refreshes a patient binding and queues the patch for
    /// connection, holding `patient_mapping` before `mac_address_update`
    /// per the fixed lock order (spec §4.1, §4.2 `Connected`).
    pub fn connect_patient(&self, patch_id: PatchId, patient_id: PatientId) {
        self.patient_mapping.insert(patch_id, patient_id);
        self.mac_address_update.insert(patch_id, Intent::Connect);
    }

    /// Tears down a patient binding (spec §4.2 `Disconnected`).
    ///
    /// `patient_mapping` is always cleared; a disconnect intent is only
    /// queued when `patch_id` is a real identifier, mirroring the
    /// original design's sentinel `"disconnected"` patch id that carries
    /// no connection to tear down.
    pub fn disconnect_patient(&self, patch_id: PatchId, is_sentinel: bool) {
        self.patient_mapping.remove(&patch_id);
        if !is_sentinel {
            self.mac_address_update.insert(patch_id, Intent::Disconnect);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn connect_patient_seeds_both_mailboxes() {
        let hub = Hub::new();
        let patch = PatchId::from_u48(1);
        hub.connect_patient(patch, PatientId::new("p-1"));
        assert_eq!(
            Some(PatientId::new("p-1")),
            hub.patient_mapping.get_cloned(&patch)
        );
        assert_eq!(Some(Intent::Connect), hub.mac_address_update.get_cloned(&patch));
    }

    #[test]
    fn disconnect_sentinel_clears_mapping_without_intent() {
        let hub = Hub::new();
        let patch = PatchId::from_u48(2);
        hub.connect_patient(patch, PatientId::new("p-2"));
        hub.mac_address_update.remove(&patch);
        hub.disconnect_patient(patch, true);
        assert!(hub.patient_mapping.get_cloned(&patch).is_none());
        assert!(hub.mac_address_update.get_cloned(&patch).is_none());
    }
}
