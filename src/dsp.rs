//! Shared DSP primitives: sine sampling, same-length convolution, RMS.

use std::f64::consts::PI;

/// Sample `amplitude * sin(2π·frequency·t + phase)` at each time in `times`.
pub fn sample_sine(times: &[f64], amplitude: f64, frequency: f64, phase: f64) -> Vec<f64> {
    times
        .iter()
        .map(|&t| amplitude * (2.0 * PI * frequency * t + phase).sin())
        .collect()
}

/// Discrete convolution cropped to the length of `signal`, centered on the
/// full result. Matches numpy's `convolve(signal, kernel, mode="same")` when
/// the kernel is not longer than the signal; samples outside the signal
/// count as zero.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let m = kernel.len();
    if n == 0 || m == 0 {
        return vec![0.0; n];
    }
    let offset = (m - 1) / 2;
    (0..n)
        .map(|i| {
            // full[k] = Σ_j signal[k - j] * kernel[j], sampled at k = i + offset
            let k = i + offset;
            let j_min = k.saturating_sub(n - 1);
            let j_max = k.min(m - 1);
            (j_min..=j_max).map(|j| signal[k - j] * kernel[j]).sum()
        })
        .collect()
}

/// Element-wise sum of two equally long buffers.
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Root mean square of a buffer.
pub fn compute_rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f64).sqrt()
}

/// RMS of `a - b` over the common length.
pub fn rms_difference(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum / n as f64).sqrt()
}
