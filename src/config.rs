use std::path::PathBuf;

use clap::Parser;

/// Static launch-time settings for the base station (spec §6 Runtime
/// configuration). Everything here is fixed for the process lifetime;
/// the five dynamic flags live in [`DynamicConfig`] instead.
#[derive(Debug, Clone, Parser)]
#[command(name = "basestation", about = "SmartPatch base station")]
pub struct RuntimeConfig {
    /// Human-readable name this base station identifies itself as.
    #[arg(long, env = "BASESTATION_NAME", default_value = "basestation-01")]
    pub name: String,

    /// Upstream telemetry backend host.
    #[arg(long, env = "BASESTATION_HOST", default_value = "localhost")]
    pub host: String,

    /// Upstream telemetry backend MQTT port.
    #[arg(long, env = "BASESTATION_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Maximum number of concurrently connected patches (M).
    #[arg(long, default_value_t = 10)]
    pub max_patches: usize,

    /// BLE connect timeout, in seconds.
    #[arg(long, default_value_t = 60)]
    pub connect_timeout_secs: u64,

    /// Interval between janitor sweeps, in seconds.
    #[arg(long, default_value_t = 30)]
    pub janitor_interval_secs: u64,

    /// DSP tick interval for pass-through mode, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub dsp_tick_millis: u64,

    /// DSP tick interval for compute mode, in milliseconds. Signal
    /// processing runs far less often than the pass-through forward,
    /// matching the original design's once-per-second compute loop.
    #[arg(long, default_value_t = 1000)]
    pub dsp_compute_tick_millis: u64,

    /// Sink tick interval, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub sink_tick_millis: u64,

    /// Delay between successive MQTT publishes within one sink tick, in
    /// milliseconds.
    #[arg(long, default_value_t = 2)]
    pub publish_delay_millis: u64,

    /// Directory holding per-patch local backup CSVs.
    #[arg(long, default_value = "./data")]
    pub data_log_root: PathBuf,

    /// Directory holding per-patch raw-passthrough CSVs.
    #[arg(long, default_value = "./data/raw")]
    pub raw_log_root: PathBuf,

    #[command(flatten)]
    pub window_caps: WindowCaps,

    #[command(flatten)]
    pub flags: DynamicConfig,
}

/// Per-channel rolling-window capacities (spec §3 `PatchWindow`, §4.4g).
#[derive(Debug, Clone, Copy, Parser)]
pub struct WindowCaps {
    #[arg(long, default_value_t = 5000)]
    pub ppg: usize,
    #[arg(long, default_value_t = 2000)]
    pub imu: usize,
    #[arg(long, default_value_t = 200)]
    pub temperature: usize,
    #[arg(long, default_value_t = 200)]
    pub voltage: usize,
    #[arg(long, default_value_t = 200)]
    pub activity: usize,
    #[arg(long, default_value_t = 200)]
    pub heartrate_history: usize,
    #[arg(long, default_value_t = 200)]
    pub spo2_history: usize,
}

impl Default for WindowCaps {
    fn default() -> Self {
        Self {
            ppg: 5000,
            imu: 2000,
            temperature: 200,
            voltage: 200,
            activity: 200,
            heartrate_history: 200,
            spo2_history: 200,
        }
    }
}

/// The five base-station boolean configuration keys (spec §4.5, §6). These
/// are seeded at startup from the remote backend and may be flipped live
/// via the control-plane subscription, but per spec a live toggle only
/// takes effect after a restart — the mapping controller logs that
/// requirement rather than hot-swapping behaviour.
#[derive(Debug, Clone, Copy, Parser, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicConfig {
    /// Publish processed datapoints to the upstream telemetry backend.
    #[arg(long, default_value_t = true)]
    pub publish_to_thingsboard: bool,

    /// Run the DSP stage; when false it degenerates to a raw passthrough.
    #[arg(long, default_value_t = true)]
    pub process_data: bool,

    /// Write processed datapoints to local per-patch CSV files.
    #[arg(long, default_value_t = false)]
    pub local_data_logging: bool,

    /// Run the raw-passthrough sink worker alongside DSP.
    #[arg(long, default_value_t = false)]
    pub save_raw_data: bool,

    /// Publish raw-passthrough rows upstream instead of writing them
    /// locally; only consulted when `save_raw_data` is set.
    #[arg(long, default_value_t = false)]
    pub publish_raw_data: bool,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            publish_to_thingsboard: true,
            process_data: true,
            local_data_logging: false,
            save_raw_data: false,
            publish_raw_data: false,
        }
    }
}

impl DynamicConfig {
    /// True when neither telemetry publishing nor local logging is
    /// enabled — the degraded "silent mode" the sink stage must warn
    /// loudly about at startup (spec §4.5, §7).
    #[must_use]
    pub fn is_silent(self) -> bool {
        !self.publish_to_thingsboard && !self.local_data_logging
    }

    /// Applies a named boolean control-plane update in place, returning
    /// whether the key was recognised (spec §4.2 control-plane topics).
    pub fn apply_named(&mut self, key: &str, value: bool) -> bool {
        match key {
            "publishToThingsboard" => self.publish_to_thingsboard = value,
            "saveRawData" => self.save_raw_data = value,
            "publishRawData" => self.publish_raw_data = value,
            "processData" => self.process_data = value,
            "localDataLogging" => self.local_data_logging = value,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn silent_mode_requires_both_sinks_disabled() {
        let mut cfg = DynamicConfig {
            publish_to_thingsboard: false,
            local_data_logging: false,
            ..DynamicConfig::default()
        };
        assert!(cfg.is_silent());
        cfg.local_data_logging = true;
        assert!(!cfg.is_silent());
    }

    #[test]
    fn apply_named_updates_known_keys_only() {
        let mut cfg = DynamicConfig::default();
        assert!(cfg.apply_named("saveRawData", true));
        assert_eq!(true, cfg.save_raw_data);
        assert!(!cfg.apply_named("unknownKey", true));
    }
}
