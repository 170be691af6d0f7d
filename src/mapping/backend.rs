use async_trait::async_trait;

use crate::config::DynamicConfig;
use crate::error::MappingError;
use crate::mapping::events::ControlEvent;
use crate::model::{PatchId, PatientId};

/// Initial roster snapshot fetched once at startup (spec §4.2 Initial
/// fetch).
#[derive(Debug, Clone, Default)]
pub struct InitialRoster {
    pub patient_mapping: Vec<(PatchId, PatientId)>,
    pub dynamic_config: DynamicConfig,
    pub smartpatch_config: u8,
}

/// Abstracts the remote control plane so the mapping controller can be
/// driven by a real ThingsBoard-style backend or by a fixture in tests
/// (spec §4.2, §6 Runtime configuration).
#[async_trait]
pub trait MappingBackend: Send + Sync {
    /// Fetches the patient roster, existing patch bindings, and pending
    /// configuration from the remote backend (spec §B Supplemented
    /// features: remote config fetch on startup).
    async fn fetch_initial_roster(&self) -> Result<InitialRoster, MappingError>;

    /// Blocks until the next control-plane event is available.
    async fn next_event(&mut self) -> Result<ControlEvent, MappingError>;
}

pub mod thingsboard {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
    use tracing::{debug, warn};

    use super::{InitialRoster, MappingBackend};
    use crate::config::DynamicConfig;
    use crate::error::MappingError;
    use crate::mapping::events::{self, ControlEvent};
    use crate::model::{PatchId, PatientId};

    const UPDATE_TOPICS: &[&str] = &[
        "Connected",
        "Disconnected",
        "SmartPatchConfig",
        "publishToThingsboard",
        "saveRawData",
        "publishRawData",
        "processData",
        "localDataLogging",
    ];

    /// Live [`MappingBackend`] talking to a ThingsBoard-style server: REST
    /// for the one-shot roster fetch, MQTT attribute subscriptions for
    /// live updates.
    pub struct ThingsboardBackend {
        http: Client,
        api_url: String,
        basestation_name: String,
        credentials: (String, String),
        max_patients: usize,
        mqtt_client: AsyncClient,
        mqtt_event_loop: EventLoop,
    }

    impl ThingsboardBackend {
        pub fn new(
            api_url: impl Into<String>,
            basestation_name: impl Into<String>,
            credentials: (String, String),
            broker_host: &str,
            broker_port: u16,
            max_patients: usize,
        ) -> Self {
            let basestation_name = basestation_name.into();
            let mut mqtt_options =
                MqttOptions::new(basestation_name.clone(), broker_host, broker_port);
            mqtt_options.set_keep_alive(Duration::from_secs(30));

            let (mqtt_client, mqtt_event_loop) = AsyncClient::new(mqtt_options, 16);

            Self {
                http: Client::new(),
                api_url: api_url.into(),
                basestation_name,
                credentials,
                max_patients,
                mqtt_client,
                mqtt_event_loop,
            }
        }

        async fn subscribe_update_topics(&self) -> Result<(), MappingError> {
            for topic in UPDATE_TOPICS {
                self.mqtt_client
                    .subscribe(*topic, QoS::AtLeastOnce)
                    .await
                    .map_err(|e| MappingError::Backend(e.into()))?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MappingBackend for ThingsboardBackend {
        async fn fetch_initial_roster(&self) -> Result<InitialRoster, MappingError> {
            let roster_url = format!(
                "{}/api/basestation/{}/roster?max={}",
                self.api_url, self.basestation_name, self.max_patients
            );
            let response = self
                .http
                .get(&roster_url)
                .basic_auth(&self.credentials.0, Some(&self.credentials.1))
                .send()
                .await
                .map_err(|e| MappingError::Backend(e.into()))?;

            let body: RosterResponse = response
                .json()
                .await
                .map_err(|e| MappingError::Backend(e.into()))?;

            self.subscribe_update_topics().await?;

            let mut patient_mapping = Vec::with_capacity(body.patients.len());
            for entry in body.patients {
                match PatchId::parse(&entry.patch_id) {
                    Ok(patch_id) => {
                        patient_mapping.push((patch_id, PatientId::new(entry.patient_id)));
                    }
                    Err(error) => {
                        warn!(%error, patch_id = %entry.patch_id, "skipping malformed roster entry");
                    }
                }
            }

            Ok(InitialRoster {
                patient_mapping,
                dynamic_config: body.config.unwrap_or_default(),
                smartpatch_config: body.smartpatch_config.unwrap_or(0),
            })
        }

        async fn next_event(&mut self) -> Result<ControlEvent, MappingError> {
            loop {
                let notification = self
                    .mqtt_event_loop
                    .poll()
                    .await
                    .map_err(|e| MappingError::Backend(e.into()))?;

                if let Event::Incoming(Packet::Publish(publish)) = notification {
                    debug!(topic = %publish.topic, "control-plane publish");
                    return Ok(events::parse(&publish.topic, &publish.payload));
                }
            }
        }
    }

    #[derive(serde::Deserialize)]
    struct RosterEntry {
        patient_id: String,
        patch_id: String,
    }

    #[derive(serde::Deserialize)]
    struct RosterResponse {
        patients: Vec<RosterEntry>,
        config: Option<DynamicConfig>,
        smartpatch_config: Option<u8>,
    }
}

#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::{InitialRoster, MappingBackend};
    use crate::error::MappingError;
    use crate::mapping::events::ControlEvent;

    /// Deterministic in-memory backend for controller tests.
    #[derive(Default)]
    pub struct FakeBackend {
        pub roster: InitialRoster,
        pub events: VecDeque<ControlEvent>,
    }

    #[async_trait]
    impl MappingBackend for FakeBackend {
        async fn fetch_initial_roster(&self) -> Result<InitialRoster, MappingError> {
            Ok(self.roster.clone())
        }

        async fn next_event(&mut self) -> Result<ControlEvent, MappingError> {
            self.events
                .pop_front()
                .ok_or_else(|| MappingError::Backend(anyhow::anyhow!("no more fake events")))
        }
    }
}
