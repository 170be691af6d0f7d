use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::config::WindowCaps;
use crate::dsp::butterworth::BandPass;
use crate::dsp::fft::Spectrum;
use crate::dsp::window::WindowStore;
use crate::dsp::{battery, imu, pulse, spo2};
use crate::model::{Characteristic, Datapoint, DatapointValues, PatchId, ProcessedRecord, RawSample};
use crate::state::Hub;

/// Sample rate of the PPG/IMU streams, used to size the analysis window
/// and convert FFT bins back to Hz (spec §4.4b: `SAMPLE_LENGTH = 2000` at
/// 100 Hz = 20 s).
const SAMPLE_RATE_HZ: f64 = 100.0;
const SAMPLE_LENGTH: usize = 2000;
const ANALYSIS_WINDOW_SECONDS: f64 = SAMPLE_LENGTH as f64 / SAMPLE_RATE_HZ;

const PRIMARY_BAND_HZ: (f64, f64) = (0.7, 3.5);
const SECONDARY_BAND_HZ: (f64, f64) = (0.05, 3.5);

/// Cooperative single-task DSP loop (spec §4.4).
///
/// Drains `unprocessed_data` once per tick, maintains rolling per-patch
/// windows, and either runs the full signal-processing pipeline or
/// degenerates to a verbatim passthrough depending on `processData`.
pub struct DspStage {
    hub: Arc<Hub>,
    windows: WindowStore,
    caps: WindowCaps,
    started_at: Instant,
}

impl DspStage {
    #[must_use]
    pub fn new(hub: Arc<Hub>, caps: WindowCaps) -> Self {
        Self {
            hub,
            windows: WindowStore::new(),
            caps,
            started_at: Instant::now(),
        }
    }

    /// Runs the cooperative loop until the process is asked to stop.
    /// Callers own the cancellation signal; this only ever returns early
    /// via `select!` at the call site, not internally.
    pub async fn run_tick(&mut self) {
        let process_data = self.hub.dynamic_config.read().process_data;
        if !process_data {
            // Pass-through mode has no warmup in the original design;
            // only compute mode sleeps out the startup window.
            self.run_passthrough_tick();
            return;
        }

        if self.cold_starting() {
            debug!("dsp stage still warming up, skipping tick");
            return;
        }

        self.run_compute_tick();
    }

    /// First 30 s after startup: sleep, do nothing, let rolling windows
    /// accumulate (spec §4.4 Cold start).
    fn cold_starting(&self) -> bool {
        self.started_at.elapsed() < Duration::from_secs(30)
    }

    #[instrument(skip(self))]
    fn run_compute_tick(&mut self) {
        let batch = self.hub.unprocessed_data.take();

        for (patch_id, samples) in batch {
            if samples.is_empty() {
                continue;
            }
            let current_ts = samples.last().map(|s| s.ts_ms).unwrap_or_default();
            self.process_patch(patch_id, &samples, current_ts);
        }
    }

    /// Pass-through mode: forward whatever is pending verbatim without
    /// any computation (spec §4.4 Pass-through mode).
    fn run_passthrough_tick(&mut self) {
        let batch = self.hub.unprocessed_data.take();
        for (patch_id, samples) in batch {
            if samples.is_empty() {
                continue;
            }
            let records: Vec<ProcessedRecord> =
                samples.into_iter().map(ProcessedRecord::from).collect();
            self.hub.processed_data.with(|map| {
                map.entry(patch_id).or_default().extend(records);
            });
        }
    }

    #[instrument(skip(self, samples), fields(patch_id = %patch_id, n = samples.len()))]
    fn process_patch(&mut self, patch_id: PatchId, samples: &[RawSample], current_ts: i64) {
        let window = self.windows.entry(patch_id);

        for sample in samples {
            match sample.characteristic {
                Characteristic::Ppg => append_ppg_rows(window, &sample.values),
                Characteristic::Imu => append_imu_rows(window, &sample.values),
                Characteristic::Temperature => {
                    if let Some(&raw) = sample.values.first() {
                        window.temperature.push(raw as f64 / 200.0);
                    }
                }
                Characteristic::Voltage => {
                    if let Some(&raw) = sample.values.first() {
                        window.voltage.push(raw as f64);
                    }
                }
                Characteristic::Audio | Characteristic::Current => {
                    debug!(characteristic = %sample.characteristic, "channel carries no DSP consumer");
                }
            }
        }

        let imu_converted_len_before = window.imu_converted.len();
        for &row in window.imu_raw.iter().skip(imu_converted_len_before) {
            window.imu_converted.push(imu::convert_row(row));
        }

        let activity = {
            let recent_start = window
                .imu_converted
                .len()
                .saturating_sub(imu::ACTIVITY_WINDOW);
            imu::activity_level(&window.imu_converted[recent_start..], imu::ACTIVITY_THRESHOLD)
        };
        window.activity.push(activity);

        let battery_percentage = window
            .voltage
            .last()
            .map_or(battery::DEFAULT_PERCENTAGE, |&v| {
                battery::percentage_from_millivolts(v)
            });

        let ppg_analysis = analyze_ppg(window);

        let Some(ppg_analysis) = ppg_analysis else {
            debug!(patch_id = %patch_id, "insufficient ppg history yet, skipping datapoint");
            self.windows.entry(patch_id).trim(self.caps);
            return;
        };

        window.heartrate_history.push(ppg_analysis.heartrate);
        window.spo2_history.push(ppg_analysis.spo2);

        let pulse = match run_pulse_analysis(window) {
            Ok(pulse) => pulse,
            Err(error) => {
                warn!(patch_id = %patch_id, %error, "rejecting unusable signal, no datapoint emitted");
                self.windows.entry(patch_id).trim(self.caps);
                return;
            }
        };

        let firmware_version = self
            .hub
            .connected_devices
            .get_cloned(&patch_id)
            .unwrap_or_else(|| "unknown".to_string());
        let temperature = window.temperature.last().copied().unwrap_or_default();

        let datapoint = Datapoint::new(
            current_ts,
            DatapointValues {
                firmware_version,
                battery_percentage,
                temperature,
                heartrate: ppg_analysis.heartrate,
                respiration_rate: pulse.breathing_rate_bpm,
                blood_oxygenation: ppg_analysis.spo2,
                activity_level: activity,
            },
        );

        self.hub.processed_data.with(|map| {
            map.entry(patch_id)
                .or_default()
                .push(ProcessedRecord::from(datapoint));
        });

        self.windows.entry(patch_id).trim(self.caps);
    }
}

fn append_ppg_rows(window: &mut crate::dsp::window::PatchWindow, values: &[i64]) {
    for chunk in values.chunks_exact(3) {
        window.ppg.push([chunk[0] as f64, chunk[1] as f64, chunk[2] as f64]);
    }
}

fn append_imu_rows(window: &mut crate::dsp::window::PatchWindow, values: &[i64]) {
    for chunk in values.chunks_exact(6) {
        window.imu_raw.push([
            chunk[0] as f64,
            chunk[1] as f64,
            chunk[2] as f64,
            chunk[3] as f64,
            chunk[4] as f64,
            chunk[5] as f64,
        ]);
    }
}

struct PpgAnalysis {
    heartrate: f64,
    spo2: f64,
}

/// Heart rate + SpO₂ from the last [`SAMPLE_LENGTH`] PPG rows (spec
/// §4.4b). Returns `None` until that much history has accumulated.
fn analyze_ppg(window: &crate::dsp::window::PatchWindow) -> Option<PpgAnalysis> {
    if window.ppg.len() < SAMPLE_LENGTH {
        return None;
    }
    let recent = &window.ppg[window.ppg.len() - SAMPLE_LENGTH..];

    let red: Vec<f64> = recent.iter().map(|row| row[0]).collect();
    let ir: Vec<f64> = recent.iter().map(|row| row[1]).collect();
    let green: Vec<f64> = recent.iter().map(|row| row[2]).collect();

    let mut filter = BandPass::design(PRIMARY_BAND_HZ.0, PRIMARY_BAND_HZ.1, SAMPLE_RATE_HZ)?;
    let filtered_green = filter.apply(&green);

    let spectrum = Spectrum::analyze(&filtered_green, SAMPLE_RATE_HZ);
    let lo_index = (0.75 * ANALYSIS_WINDOW_SECONDS) as usize;
    let hi_index = (3.5 * ANALYSIS_WINDOW_SECONDS) as usize;
    let hr_bin = spectrum.dominant_bin(lo_index, hi_index);
    let dominant_hz = spectrum.bin_frequency_hz(hr_bin);
    let heartrate = (60.0 * dominant_hz).round();

    let red_spectrum = Spectrum::analyze(&red, SAMPLE_RATE_HZ);
    let ir_spectrum = Spectrum::analyze(&ir, SAMPLE_RATE_HZ);
    let ac_red = red_spectrum.magnitude(hr_bin);
    let ac_ir = ir_spectrum.magnitude(hr_bin);
    let dc_red = red.iter().sum::<f64>() / red.len() as f64;
    let dc_ir = ir.iter().sum::<f64>() / ir.len() as f64;
    let spo2_value = spo2::blood_oxygenation(ac_red, dc_red, ac_ir, dc_ir);

    Some(PpgAnalysis {
        heartrate,
        spo2: spo2_value,
    })
}

/// Secondary HR/RMSSD/respiration rate over the last 2000 green-channel
/// samples band-passed `[0.05, 3.5] Hz` (spec §4.4e).
fn run_pulse_analysis(
    window: &crate::dsp::window::PatchWindow,
) -> Result<pulse::PulseSummary, pulse::PulseError> {
    let recent = &window.ppg[window.ppg.len() - SAMPLE_LENGTH..];
    let green: Vec<f64> = recent.iter().map(|row| row[2]).collect();

    let mut filter = BandPass::design(SECONDARY_BAND_HZ.0, SECONDARY_BAND_HZ.1, SAMPLE_RATE_HZ)
        .expect("static band parameters always produce a valid design");
    let filtered = filter.apply(&green);

    pulse::analyze(&filtered, SAMPLE_RATE_HZ)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::PatientId;

    fn synthetic_green_samples(bpm: f64) -> Vec<RawSample> {
        let freq_hz = bpm / 60.0;
        (0..SAMPLE_LENGTH)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE_HZ;
                let green = (2.0 * std::f64::consts::PI * freq_hz * t).sin() * 1000.0;
                RawSample::new(i as i64 * 10, Characteristic::Ppg, vec![500, 500, green as i64])
            })
            .collect()
    }

    #[test]
    fn heart_rate_tracks_synthetic_tone() {
        let hub = Arc::new(Hub::new());
        hub.connected_devices.insert(PatchId::from_u48(1), "1.0.0".to_string());
        let mut stage = DspStage::new(hub.clone(), WindowCaps::default());
        stage.started_at = Instant::now() - Duration::from_secs(31);

        let samples = synthetic_green_samples(72.0);
        stage.process_patch(PatchId::from_u48(1), &samples, 12345);

        let datapoints = hub.processed_data.take();
        let records = datapoints.get(&PatchId::from_u48(1));
        assert!(records.is_some());
        if let Some(ProcessedRecord::Datapoint(dp)) = records.and_then(|r| r.first()) {
            assert!((dp.values.heartrate - 72.0).abs() <= 3.0, "hr = {}", dp.values.heartrate);
        }
    }

    #[test]
    fn passthrough_mode_forwards_raw_samples_unmodified() {
        let hub = Arc::new(Hub::new());
        hub.dynamic_config.write().process_data = false;
        let patch = PatchId::from_u48(7);
        hub.patient_mapping.insert(patch, PatientId::new("p-7"));
        hub.unprocessed_data.insert(
            patch,
            vec![RawSample::new(1, Characteristic::Voltage, vec![3700])],
        );

        let mut stage = DspStage::new(hub.clone(), WindowCaps::default());
        stage.run_passthrough_tick();

        let processed = hub.processed_data.take();
        assert_eq!(
            Some(&vec![ProcessedRecord::Raw(RawSample::new(
                1,
                Characteristic::Voltage,
                vec![3700]
            ))]),
            processed.get(&patch)
        );
    }
}
