/// Blood-oxygen saturation via the Ratio-of-Ratios formula (spec §4.4b).
///
/// `ac_red`/`ac_ir` are the FFT magnitudes of the red and infrared PPG
/// channels at the detected heart-rate bin; `dc_red`/`dc_ir` are the
/// arithmetic means of the raw last-2000-row red and ir columns.
#[must_use]
pub fn blood_oxygenation(ac_red: f64, dc_red: f64, ac_ir: f64, dc_ir: f64) -> f64 {
    let ratio = (ac_red / dc_red) / (ac_ir / dc_ir);
    let spo2 = 1.5958422 * ratio * ratio - 34.6596622 * ratio + 112.6898759;
    spo2.round().min(100.0)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn ratio_of_one_gives_eighty() {
        let spo2 = blood_oxygenation(1.0, 1.0, 1.0, 1.0);
        assert_relative_eq!(80.0, spo2);
    }

    #[test]
    fn low_ratio_clips_to_one_hundred() {
        let spo2 = blood_oxygenation(0.3, 1.0, 1.0, 1.0);
        assert_relative_eq!(100.0, spo2);
    }
}
