use serde::Deserialize;

use crate::model::{PatchId, PatientId};

/// One control-plane event as delivered by the remote backend (spec §4.2
/// table). Named discriminants replace the original dynamic payload
/// dicts; an unrecognised topic decodes to [`ControlEvent::Other`]
/// rather than failing the subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Connected {
        patient_id: PatientId,
        patch_id: PatchId,
    },
    /// `patch_id` is `None` for the sentinel `"disconnected"` payload,
    /// which carries no connection to tear down.
    Disconnected {
        patch_id: Option<PatchId>,
    },
    SmartPatchConfig {
        byte: u8,
    },
    BaseStationFlag {
        key: String,
        value: bool,
    },
    Other {
        topic: String,
    },
}

/// Sentinel patch id string used by the control plane for a disconnect
/// notification that does not target a live connection (spec §4.2
/// `Disconnected`: "if `patch_id != "disconnected"`").
pub const DISCONNECTED_SENTINEL: &str = "disconnected";

const BASE_STATION_FLAG_KEYS: &[&str] = &[
    "publishToThingsboard",
    "saveRawData",
    "publishRawData",
    "processData",
    "localDataLogging",
];

#[derive(Debug, Deserialize)]
struct ConnectedPayload {
    patient_id: String,
    patch_id: String,
}

#[derive(Debug, Deserialize)]
struct DisconnectedPayload {
    patch_id: String,
}

/// Parses one raw MQTT attribute-update message into a [`ControlEvent`].
pub fn parse(topic: &str, payload: &[u8]) -> ControlEvent {
    match topic {
        "Connected" => match serde_json::from_slice::<ConnectedPayload>(payload) {
            Ok(body) => match PatchId::parse(&body.patch_id) {
                Ok(patch_id) => ControlEvent::Connected {
                    patient_id: PatientId::new(body.patient_id),
                    patch_id,
                },
                Err(_) => ControlEvent::Other {
                    topic: topic.to_string(),
                },
            },
            Err(_) => ControlEvent::Other {
                topic: topic.to_string(),
            },
        },
        "Disconnected" => match serde_json::from_slice::<DisconnectedPayload>(payload) {
            Ok(body) if body.patch_id == DISCONNECTED_SENTINEL => {
                ControlEvent::Disconnected { patch_id: None }
            }
            Ok(body) => match PatchId::parse(&body.patch_id) {
                Ok(patch_id) => ControlEvent::Disconnected {
                    patch_id: Some(patch_id),
                },
                Err(_) => ControlEvent::Other {
                    topic: topic.to_string(),
                },
            },
            Err(_) => ControlEvent::Other {
                topic: topic.to_string(),
            },
        },
        "SmartPatchConfig" => match payload.first() {
            Some(&byte) => ControlEvent::SmartPatchConfig { byte },
            None => ControlEvent::Other {
                topic: topic.to_string(),
            },
        },
        key if BASE_STATION_FLAG_KEYS.contains(&key) => {
            let value = matches!(payload, b"true" | b"1");
            ControlEvent::BaseStationFlag {
                key: key.to_string(),
                value,
            }
        }
        other => ControlEvent::Other {
            topic: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_connected_event() {
        let payload = br#"{"patient_id":"p-1","patch_id":"AA:BB:CC:DD:EE:01"}"#;
        let event = parse("Connected", payload);
        assert_eq!(
            ControlEvent::Connected {
                patient_id: PatientId::new("p-1"),
                patch_id: PatchId::parse("AA:BB:CC:DD:EE:01").unwrap(),
            },
            event
        );
    }

    #[test]
    fn disconnected_sentinel_has_no_real_patch() {
        let payload = br#"{"patch_id":"disconnected"}"#;
        let event = parse("Disconnected", payload);
        assert_eq!(ControlEvent::Disconnected { patch_id: None }, event);
    }

    #[test]
    fn unknown_topic_becomes_other() {
        let event = parse("SomeFutureTopic", b"{}");
        assert_eq!(
            ControlEvent::Other {
                topic: "SomeFutureTopic".to_string()
            },
            event
        );
    }
}
