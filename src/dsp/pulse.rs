use thiserror::Error;

/// Secondary heart-rate/variability/respiration estimate produced by
/// peak-detecting the band-passed green channel (spec §4.4e).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseSummary {
    pub bpm: f64,
    pub rmssd_ms: f64,
    pub breathing_rate_bpm: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PulseError {
    #[error("fewer than {required} peaks detected, cannot estimate pulse")]
    TooFewPeaks { required: usize },
}

/// Minimum number of detected beats below which the signal is rejected
/// as unusable rather than emitting an unreliable estimate (spec §4.4e:
/// "the whole per-patch iteration is skipped and logged").
const MIN_PEAKS: usize = 3;

/// Estimates heart rate, RMSSD, and breathing rate from a band-passed
/// PPG green channel.
///
/// There is no off-the-shelf peak-detection crate in this workspace's
/// dependency stack equivalent to a dedicated pulse-analysis library, so
/// peaks are found directly: a sample is a peak when it exceeds both
/// neighbours and the signal's standard deviation above the mean, with a
/// refractory gap enforcing at most one peak per ~0.33 s (180 BPM cap).
pub fn analyze(filtered_green: &[f64], sample_rate_hz: f64) -> Result<PulseSummary, PulseError> {
    let peaks = find_peaks(filtered_green, sample_rate_hz);
    if peaks.len() < MIN_PEAKS {
        return Err(PulseError::TooFewPeaks {
            required: MIN_PEAKS,
        });
    }

    let intervals_s: Vec<f64> = peaks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 / sample_rate_hz)
        .collect();

    let mean_interval_s = intervals_s.iter().sum::<f64>() / intervals_s.len() as f64;
    let bpm = 60.0 / mean_interval_s;

    let rmssd_ms = successive_diff_rms(&intervals_s) * 1000.0;
    let breathing_rate_bpm = respiration_from_intervals(&intervals_s);

    Ok(PulseSummary {
        bpm,
        rmssd_ms,
        breathing_rate_bpm,
    })
}

fn find_peaks(signal: &[f64], sample_rate_hz: f64) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }

    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    let variance = signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / signal.len() as f64;
    let threshold = mean + variance.sqrt();

    let refractory = (sample_rate_hz / 3.0) as usize;
    let mut peaks = Vec::new();
    let mut last_peak: Option<usize> = None;

    for i in 1..signal.len() - 1 {
        let is_local_max = signal[i] > signal[i - 1] && signal[i] > signal[i + 1];
        if !is_local_max || signal[i] <= threshold {
            continue;
        }
        if let Some(last) = last_peak {
            if i - last < refractory {
                continue;
            }
        }
        peaks.push(i);
        last_peak = Some(i);
    }

    peaks
}

/// Root-mean-square of successive differences between beat-to-beat
/// intervals, the standard heart-rate-variability statistic.
fn successive_diff_rms(intervals_s: &[f64]) -> f64 {
    if intervals_s.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = intervals_s.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let mean_sq = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
    mean_sq.sqrt()
}

/// Breathing modulates beat-to-beat interval length (respiratory sinus
/// arrhythmia); approximate breathing rate from the dominant slow
/// oscillation frequency of the interval series.
fn respiration_from_intervals(intervals_s: &[f64]) -> f64 {
    if intervals_s.len() < 2 {
        return 0.0;
    }
    let mean = intervals_s.iter().sum::<f64>() / intervals_s.len() as f64;
    let crossings = intervals_s
        .windows(2)
        .filter(|pair| (pair[0] - mean) * (pair[1] - mean) < 0.0)
        .count();
    let total_s: f64 = intervals_s.iter().sum();
    if total_s <= 0.0 {
        return 0.0;
    }
    (crossings as f64 / 2.0) / (total_s / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_pulse(sample_rate_hz: f64, bpm: f64, seconds: f64) -> Vec<f64> {
        let freq_hz = bpm / 60.0;
        let n = (sample_rate_hz * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn rejects_short_silent_signal() {
        let flat = vec![0.0; 50];
        assert_eq!(
            Err(PulseError::TooFewPeaks { required: MIN_PEAKS }),
            analyze(&flat, 100.0)
        );
    }

    #[test]
    fn estimates_bpm_close_to_synthetic_rate() {
        let signal = synthetic_pulse(100.0, 72.0, 20.0);
        let summary = analyze(&signal, 100.0).expect("enough peaks");
        assert!((summary.bpm - 72.0).abs() < 5.0, "bpm was {}", summary.bpm);
    }
}
