use num_complex::Complex64;
use rustfft::FftPlanner;

/// Result of running an FFT over a windowed signal: the full complex
/// spectrum plus the sample count used, needed to map bin index back to
/// frequency (`bin / (n / sample_rate_hz)`).
pub struct Spectrum {
    pub bins: Vec<Complex64>,
    pub n: usize,
    pub sample_rate_hz: f64,
}

impl Spectrum {
    /// Runs a forward FFT over `samples` (spec §4.4b).
    pub fn analyze(samples: &[f64], sample_rate_hz: f64) -> Self {
        let n = samples.len();
        let mut buffer: Vec<Complex64> = samples.iter().map(|&s| Complex64::new(s, 0.0)).collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        Self {
            bins: buffer,
            n,
            sample_rate_hz,
        }
    }

    /// Magnitude of bin `index`.
    #[must_use]
    pub fn magnitude(&self, index: usize) -> f64 {
        self.bins[index].norm()
    }

    /// Index of the bin with the largest magnitude within
    /// `[lo_index, hi_index)`.
    #[must_use]
    pub fn dominant_bin(&self, lo_index: usize, hi_index: usize) -> usize {
        let hi_index = hi_index.min(self.bins.len());
        let lo_index = lo_index.min(hi_index);
        (lo_index..hi_index)
            .max_by(|&a, &b| {
                self.magnitude(a)
                    .partial_cmp(&self.magnitude(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(lo_index)
    }

    /// Converts a bin index to its frequency in Hz.
    #[must_use]
    pub fn bin_frequency_hz(&self, index: usize) -> f64 {
        index as f64 * self.sample_rate_hz / self.n as f64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn dominant_bin_finds_known_tone() {
        let sample_rate_hz = 100.0;
        let n = 2000;
        let freq_hz = 1.2;
        let samples: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect();

        let spectrum = Spectrum::analyze(&samples, sample_rate_hz);
        let t = n as f64 / sample_rate_hz;
        let lo = (0.75 * t) as usize;
        let hi = (3.5 * t) as usize;
        let bin = spectrum.dominant_bin(lo, hi);
        let detected_hz = spectrum.bin_frequency_hz(bin);

        assert_relative_eq!(freq_hz, detected_hz, epsilon = 0.05);
    }
}
