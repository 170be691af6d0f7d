use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{PatchId, PatientId, ProcessedRecord};
use crate::sink::telemetry_client::{append_csv_row, MqttTelemetryPublisher};
use crate::state::Hub;

/// Trailing record appended to each published batch so the backend can
/// see the firmware version alongside the datapoints it produced (spec
/// §4.5 Remote mode: "append the current firmware version ... as a
/// trailing record").
#[derive(Debug, Serialize)]
struct FirmwareTrailer {
    #[serde(rename = "firmwareVersion")]
    firmware_version: String,
}

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const PUBLISH_DELAY: Duration = Duration::from_millis(2);

/// Sink stage: drains `processed_data` and routes each record to the
/// upstream telemetry transport, to local CSV backup, or both-neither
/// ("silent mode") depending on the two governing flags, evaluated once
/// at startup (spec §4.5).
pub struct SinkStage {
    hub: Arc<Hub>,
    publisher: Option<MqttTelemetryPublisher>,
    data_log_root: PathBuf,
    publish_to_thingsboard: bool,
    local_data_logging: bool,
}

impl SinkStage {
    #[must_use]
    pub fn new(
        hub: Arc<Hub>,
        publisher: Option<MqttTelemetryPublisher>,
        data_log_root: PathBuf,
    ) -> Self {
        let flags = *hub.dynamic_config.read();
        if !flags.publish_to_thingsboard && !flags.local_data_logging {
            warn!(
                "silent mode: neither publishToThingsboard nor localDataLogging is set, \
                 processed data will accumulate in memory until the process runs out of it"
            );
        }

        Self {
            publish_to_thingsboard: flags.publish_to_thingsboard,
            local_data_logging: flags.local_data_logging,
            hub,
            publisher,
            data_log_root,
        }
    }

    pub async fn run_forever(&self) {
        loop {
            self.run_tick().await;
            tokio::time::sleep(TICK_INTERVAL).await;
        }
    }

    pub async fn run_tick(&self) {
        if !self.publish_to_thingsboard && !self.local_data_logging {
            // Silent mode: intentionally do not drain processed_data, so
            // it accumulates exactly as the original design's degraded
            // mode does rather than silently discarding output.
            return;
        }
        if self.hub.processed_data.is_empty() {
            return;
        }
        let batch = self.hub.processed_data.take();

        for (patch_id, records) in batch {
            let Some(patient_id) = self.hub.patient_mapping.get_cloned(&patch_id) else {
                debug!(%patch_id, "no patient binding, dropping processed batch");
                continue;
            };

            if self.publish_to_thingsboard {
                self.publish_batch(patch_id, &patient_id, records).await;
            } else if self.local_data_logging {
                self.log_batch_locally(patch_id, records);
            }
        }
    }

    async fn publish_batch(
        &self,
        patch_id: PatchId,
        patient_id: &PatientId,
        records: Vec<ProcessedRecord>,
    ) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        for record in &records {
            if let Err(error) = publisher.publish(patient_id, record).await {
                warn!(%patch_id, %error, "failed to publish telemetry record");
            }
            tokio::time::sleep(PUBLISH_DELAY).await;
        }

        if let Some(firmware_version) = self.hub.connected_devices.get_cloned(&patch_id) {
            let trailer = FirmwareTrailer { firmware_version };
            if let Err(error) = publisher.publish(patient_id, &trailer).await {
                warn!(%patch_id, %error, "failed to publish firmware trailer record");
            }
        }
    }

    fn log_batch_locally(&self, patch_id: PatchId, records: Vec<ProcessedRecord>) {
        for record in &records {
            let serialized = match serde_json::to_string(record) {
                Ok(line) => line,
                Err(error) => {
                    warn!(%patch_id, %error, "failed to serialise datapoint for local log");
                    continue;
                }
            };
            if let Err(error) = append_csv_row(&self.data_log_root, &patch_id.to_string(), &serialized) {
                warn!(%patch_id, %error, "failed to append local backup row");
            }
        }
    }
}

/// Parallel raw-passthrough worker (spec §4.5 Raw passthrough).
///
/// Reads `unprocessed_data` without clearing it, so it coexists with the
/// DSP stage (which owns clearing that mailbox) at the cost of possible
/// duplication. This is a documented hazard of the original design, not
/// a bug: the DSP stage may drain the same rows in the same window this
/// worker reads them in.
pub struct RawSinkStage {
    hub: Arc<Hub>,
    publisher: Option<MqttTelemetryPublisher>,
    raw_log_root: PathBuf,
    publish_raw_data: bool,
}

impl RawSinkStage {
    #[must_use]
    pub fn new(hub: Arc<Hub>, publisher: Option<MqttTelemetryPublisher>, raw_log_root: PathBuf) -> Self {
        warn!(
            "raw-passthrough sink reads unprocessed_data without clearing it; \
             rows may be duplicated against the DSP stage's own consumption"
        );
        let publish_raw_data = hub.dynamic_config.read().publish_raw_data;
        Self {
            hub,
            publisher,
            raw_log_root,
            publish_raw_data,
        }
    }

    pub async fn run_forever(&self) {
        loop {
            self.run_tick().await;
            tokio::time::sleep(TICK_INTERVAL).await;
        }
    }

    pub async fn run_tick(&self) {
        let snapshot = self.hub.unprocessed_data.snapshot();
        for (patch_id, samples) in snapshot {
            let Some(patient_id) = self.hub.patient_mapping.get_cloned(&patch_id) else {
                continue;
            };

            if self.publish_raw_data {
                let Some(publisher) = &self.publisher else {
                    continue;
                };
                // Raw passthrough publishes through the same telemetry
                // topic as processed data, under a credential suffixed
                // " Raw Data" rather than a distinct topic.
                let raw_credential = PatientId::new(format!("{patient_id} Raw Data"));
                for sample in &samples {
                    if let Err(error) = publisher.publish(&raw_credential, sample).await {
                        warn!(%patch_id, %error, "failed to publish raw sample");
                    }
                    tokio::time::sleep(PUBLISH_DELAY).await;
                }
            } else {
                for sample in &samples {
                    let serialized = match serde_json::to_string(sample) {
                        Ok(line) => line,
                        Err(error) => {
                            warn!(%patch_id, %error, "failed to serialise raw sample");
                            continue;
                        }
                    };
                    if let Err(error) =
                        append_csv_row(&self.raw_log_root, &patch_id.to_string(), &serialized)
                    {
                        warn!(%patch_id, %error, "failed to append raw backup row");
                    }
                }
            }
        }
    }
}
