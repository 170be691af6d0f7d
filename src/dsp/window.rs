use std::collections::HashMap;

use crate::config::WindowCaps;
use crate::model::PatchId;

/// Per-patch rolling buffers the DSP stage maintains across ticks (spec
/// §3 `PatchWindow`). Created lazily on first sample, trimmed to half its
/// cap whenever a channel overflows (spec §4.4g).
#[derive(Debug, Default, Clone)]
pub struct PatchWindow {
    pub ppg: Vec<[f64; 3]>,
    pub imu_raw: Vec<[f64; 6]>,
    pub imu_converted: Vec<[f64; 6]>,
    pub temperature: Vec<f64>,
    pub voltage: Vec<f64>,
    pub activity: Vec<u8>,
    pub heartrate_history: Vec<f64>,
    pub spo2_history: Vec<f64>,
}

impl PatchWindow {
    /// Retains the newest `cap / 2` elements of any channel that exceeds
    /// its configured cap.
    pub fn trim(&mut self, caps: WindowCaps) {
        trim_vec(&mut self.ppg, caps.ppg);
        trim_vec(&mut self.imu_raw, caps.imu);
        trim_vec(&mut self.imu_converted, caps.imu);
        trim_vec(&mut self.temperature, caps.temperature);
        trim_vec(&mut self.voltage, caps.voltage);
        trim_vec(&mut self.activity, caps.activity);
        trim_vec(&mut self.heartrate_history, caps.heartrate_history);
        trim_vec(&mut self.spo2_history, caps.spo2_history);
    }
}

fn trim_vec<T>(buf: &mut Vec<T>, cap: usize) {
    if buf.len() > cap {
        let keep = cap / 2;
        let drop = buf.len() - keep;
        buf.drain(0..drop);
    }
}

/// Per-patch window storage owned by the DSP stage, keyed by [`PatchId`].
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: HashMap<PatchId, PatchWindow>,
}

impl WindowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, patch_id: PatchId) -> &mut PatchWindow {
        self.windows.entry(patch_id).or_default()
    }

    pub fn get(&self, patch_id: PatchId) -> Option<&PatchWindow> {
        self.windows.get(&patch_id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn trim_keeps_newest_half() {
        let mut window = PatchWindow {
            temperature: (0..10).map(f64::from).collect(),
            ..PatchWindow::default()
        };
        let mut caps = WindowCaps::default();
        caps.temperature = 8;
        window.trim(caps);
        assert_eq!(4, window.temperature.len());
        assert_eq!(vec![6.0, 7.0, 8.0, 9.0], window.temperature);
    }
}
