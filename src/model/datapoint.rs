use serde::Serialize;

/// Per-datapoint physiological summary emitted by the DSP stage (spec
/// §3 `Datapoint`, §4.4f). Field names match the camelCase keys the
/// upstream telemetry protocol expects (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapoint {
    pub ts: i64,
    pub values: DatapointValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatapointValues {
    #[serde(rename = "firmwareVersion")]
    pub firmware_version: String,
    #[serde(rename = "batteryPercentage")]
    pub battery_percentage: f64,
    pub temperature: f64,
    pub heartrate: f64,
    #[serde(rename = "respirationRate")]
    pub respiration_rate: f64,
    #[serde(rename = "bloodOxygenation")]
    pub blood_oxygenation: f64,
    #[serde(rename = "activityLevel")]
    pub activity_level: u8,
}

impl Datapoint {
    #[must_use]
    pub fn new(ts: i64, values: DatapointValues) -> Self {
        Self { ts, values }
    }
}
