//! Smoothing filters applied to the observed signal.
//!
//! - [`ButterworthLowpass`]: digital Butterworth low-pass designed as
//!   second-order sections and run forward-backward (zero phase)
//! - [`MovingAverage`]: centered same-length convolution with a uniform kernel
//!
//! [`FilterStage`] chains the active ones, Butterworth first.

use crate::config::{ButterworthConfig, MovingAverageConfig};
use crate::dsp;
use crate::error::{Result, SignalError};
use crate::types::{FilterKind, FilterSelection};
use log::debug;
use sci_rs::signal::filter::design::{
    iirfilter_dyn, DigitalFilter, FilterBandType, FilterOutputType, FilterType, Sos,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;

/// A length-preserving transform of a whole signal.
pub trait Filter: Send + Sync {
    fn kind(&self) -> FilterKind;

    /// Filter `signal`; the result always has the input's length.
    fn apply(&self, signal: &[f64]) -> Result<Vec<f64>>;
}

// ─── Butterworth ────────────────────────────────────────────────────────────

/// Butterworth low-pass, zero-phase.
///
/// The design normalizes the cutoff to Nyquist (`cutoff / (0.5 * fs)`) and
/// keeps the coefficients as second-order sections; `apply` runs them
/// forward then backward so the output is not shifted in time.
#[derive(Debug, Clone)]
pub struct ButterworthLowpass {
    order: usize,
    cutoff_hz: f64,
    sample_rate_hz: f64,
    sos: Vec<Sos<f64>>,
}

impl ButterworthLowpass {
    pub fn new(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self> {
        if order == 0 {
            return Err(SignalError::parameter("order", 0.0, "must be at least 1"));
        }
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(SignalError::parameter("sample_rate_hz", sample_rate_hz, "must be positive"));
        }
        let nyquist = sample_rate_hz / 2.0;
        let cutoff_norm = cutoff_hz / nyquist;
        if !cutoff_norm.is_finite() || cutoff_norm <= 0.0 || cutoff_norm >= 1.0 {
            return Err(SignalError::parameter(
                "cutoff_hz",
                cutoff_hz,
                "must lie strictly between 0 and the Nyquist frequency",
            ));
        }

        let design = iirfilter_dyn(
            order,
            vec![cutoff_norm],
            None,                          // rp (not used for Butterworth)
            None,                          // rs (not used for Butterworth)
            Some(FilterBandType::Lowpass),
            Some(FilterType::Butterworth),
            Some(false),                   // digital
            Some(FilterOutputType::Sos),
            None,                          // fs (already normalized)
        );
        let sos = match design {
            DigitalFilter::Sos(sos_filter) => sos_filter.sos,
            _ => {
                return Err(SignalError::FilterDesign(
                    "expected second-order sections from iirfilter_dyn".into(),
                ))
            }
        };
        debug!(
            "Butterworth low-pass: order {}, cutoff {} Hz @ {} Hz ({} sections)",
            order,
            cutoff_hz,
            sample_rate_hz,
            sos.len()
        );

        Ok(Self {
            order,
            cutoff_hz,
            sample_rate_hz,
            sos,
        })
    }

    pub fn from_config(config: &ButterworthConfig) -> Result<Self> {
        Self::new(config.order, config.cutoff_hz, config.sample_rate_hz)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Cutoff as a fraction of Nyquist.
    pub fn normalized_cutoff(&self) -> f64 {
        self.cutoff_hz / (0.5 * self.sample_rate_hz)
    }

    /// Samples of odd extension added on each side by forward-backward
    /// filtering. Inputs must be strictly longer than this.
    pub fn edge_padding(&self) -> usize {
        3 * (2 * self.sos.len() + 1)
    }
}

impl Filter for ButterworthLowpass {
    fn kind(&self) -> FilterKind {
        FilterKind::Butterworth
    }

    fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
        if signal.is_empty() {
            return Ok(Vec::new());
        }
        let padding = self.edge_padding();
        if signal.len() <= padding {
            return Err(SignalError::InvalidInput(format!(
                "Butterworth filtering needs more than {} samples, got {}",
                padding,
                signal.len()
            )));
        }
        Ok(sosfiltfilt_dyn(signal.iter(), &self.sos))
    }
}

// ─── Moving average ─────────────────────────────────────────────────────────

/// Uniform moving average over `window` samples, centered, zero-padded at
/// the edges so the output keeps the input length.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    kernel: Vec<f64>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(SignalError::parameter("window", 0.0, "must be at least 1"));
        }
        Ok(Self {
            kernel: vec![1.0 / window as f64; window],
        })
    }

    pub fn from_config(config: &MovingAverageConfig) -> Result<Self> {
        Self::new(config.window)
    }

    pub fn window(&self) -> usize {
        self.kernel.len()
    }
}

impl Filter for MovingAverage {
    fn kind(&self) -> FilterKind {
        FilterKind::MovingAverage
    }

    fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
        if signal.is_empty() {
            return Ok(Vec::new());
        }
        if signal.len() < self.window() {
            return Err(SignalError::InvalidInput(format!(
                "moving average window {} is longer than the signal ({} samples)",
                self.window(),
                signal.len()
            )));
        }
        Ok(dsp::convolve_same(signal, &self.kernel))
    }
}

// ─── Filter stage ───────────────────────────────────────────────────────────

/// One filter of each kind, applied according to a [`FilterSelection`].
#[derive(Debug, Clone)]
pub struct FilterStage {
    butterworth: ButterworthLowpass,
    moving_average: MovingAverage,
}

impl FilterStage {
    pub fn new(butterworth: ButterworthLowpass, moving_average: MovingAverage) -> Self {
        Self {
            butterworth,
            moving_average,
        }
    }

    pub fn from_config(butterworth: &ButterworthConfig, moving_average: &MovingAverageConfig) -> Result<Self> {
        Ok(Self::new(
            ButterworthLowpass::from_config(butterworth)?,
            MovingAverage::from_config(moving_average)?,
        ))
    }

    pub fn filter(&self, kind: FilterKind) -> &dyn Filter {
        match kind {
            FilterKind::Butterworth => &self.butterworth,
            FilterKind::MovingAverage => &self.moving_average,
        }
    }

    pub fn butterworth(&self) -> &ButterworthLowpass {
        &self.butterworth
    }

    pub fn moving_average(&self) -> &MovingAverage {
        &self.moving_average
    }

    /// Shortest signal every filter accepts.
    pub fn min_len(&self) -> usize {
        (self.butterworth.edge_padding() + 1).max(self.moving_average.window())
    }

    /// Reject grids too short for either filter, so a filter never fails
    /// after a noise vector was drawn for the same cycle.
    pub fn check_len(&self, len: usize) -> Result<()> {
        let needed = self.min_len();
        if len < needed {
            return Err(SignalError::InvalidInput(format!(
                "grid of {} samples is too short for the filters (need at least {})",
                len, needed
            )));
        }
        Ok(())
    }

    /// Run the selected filters in chain order, each feeding the next.
    /// With nothing selected the input is returned unchanged.
    pub fn apply(&self, selection: &FilterSelection, signal: &[f64]) -> Result<Vec<f64>> {
        let mut out = signal.to_vec();
        for kind in selection.active() {
            out = self.filter(kind).apply(&out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::{correlation_lag, sine_wave};
    use crate::dsp::{compute_rms, rms_difference};

    fn butter() -> ButterworthLowpass {
        ButterworthLowpass::new(4, 3.0, 500.0).unwrap()
    }

    #[test]
    fn test_butterworth_preserves_length() {
        let filter = butter();
        for n in [filter.edge_padding() + 1, 100, 1000, 4321] {
            let input = sine_wave(1.0, 1.0, 500.0, n);
            assert_eq!(filter.apply(&input).unwrap().len(), n);
        }
    }

    #[test]
    fn test_butterworth_rejects_short_signal() {
        let filter = butter();
        let input = vec![0.5; filter.edge_padding()];
        assert!(matches!(filter.apply(&input), Err(SignalError::InvalidInput(_))));
        assert!(filter.apply(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_butterworth_zero_phase() {
        // 2 Hz at 500 Hz: one period is 250 samples; the window below spans
        // whole periods so the correlation peak sits on the true lag.
        let filter = butter();
        let input = sine_wave(2.0, 1.0, 500.0, 1000);
        let output = filter.apply(&input).unwrap();
        assert_eq!(correlation_lag(&input, &output, 125, 875, 20), 0);
    }

    #[test]
    fn test_butterworth_passes_slow_tone() {
        let filter = butter();
        let input = sine_wave(0.5, 1.0, 500.0, 2000);
        let output = filter.apply(&input).unwrap();
        // Skip the edges where the filter state is still settling
        let err = rms_difference(&input[300..1700], &output[300..1700]);
        assert!(err < 0.01, "slow tone distorted: rms error {}", err);
    }

    #[test]
    fn test_butterworth_rejects_fast_tone() {
        let filter = butter();
        let input = sine_wave(60.0, 1.0, 500.0, 1000);
        let output = filter.apply(&input).unwrap();
        let rms = compute_rms(&output[300..700]);
        assert!(rms < 0.01, "60 Hz tone leaked: rms {}", rms);
    }

    #[test]
    fn test_butterworth_invalid_design() {
        assert!(ButterworthLowpass::new(0, 3.0, 500.0).is_err());
        assert!(ButterworthLowpass::new(4, 250.0, 500.0).is_err());
        assert!(ButterworthLowpass::new(4, -1.0, 500.0).is_err());
        assert!(ButterworthLowpass::new(4, 3.0, 0.0).is_err());
    }

    #[test]
    fn test_normalized_cutoff() {
        assert!((butter().normalized_cutoff() - 0.012).abs() < 1e-15);
        let browser = ButterworthLowpass::new(4, 3.0, 100.0).unwrap();
        assert!((browser.normalized_cutoff() - 0.06).abs() < 1e-15);
    }

    #[test]
    fn test_moving_average_edges_zero_padded() {
        let filter = MovingAverage::new(10).unwrap();
        let out = filter.apply(&[1.0; 20]).unwrap();
        assert_eq!(out.len(), 20);
        // window covers x[i-5..=i+4]
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!((out[10] - 1.0).abs() < 1e-12);
        assert!((out[19] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_preserves_length() {
        let filter = MovingAverage::new(10).unwrap();
        for n in [10, 11, 999, 1000] {
            let input = sine_wave(3.0, 1.0, 100.0, n);
            assert_eq!(filter.apply(&input).unwrap().len(), n);
        }
    }

    #[test]
    fn test_moving_average_rejects_short_signal() {
        let filter = MovingAverage::new(10).unwrap();
        assert!(matches!(filter.apply(&[1.0; 9]), Err(SignalError::InvalidInput(_))));
        assert!(MovingAverage::new(0).is_err());
    }

    #[test]
    fn test_stage_empty_selection_is_identity() {
        let stage = FilterStage::new(butter(), MovingAverage::new(10).unwrap());
        let input = sine_wave(2.0, 1.0, 500.0, 200);
        assert_eq!(stage.apply(&FilterSelection::none(), &input).unwrap(), input);
    }

    #[test]
    fn test_stage_chains_butterworth_then_average() {
        let stage = FilterStage::new(butter(), MovingAverage::new(10).unwrap());
        let input: Vec<f64> = sine_wave(2.0, 1.0, 500.0, 500)
            .iter()
            .zip(sine_wave(40.0, 0.3, 500.0, 500))
            .map(|(a, b)| a + b)
            .collect();
        let both = FilterSelection {
            butterworth: true,
            moving_average: true,
        };
        let expected = stage
            .moving_average()
            .apply(&stage.butterworth().apply(&input).unwrap())
            .unwrap();
        assert_eq!(stage.apply(&both, &input).unwrap(), expected);
    }

    #[test]
    fn test_stage_min_len_covers_both_filters() {
        let stage = FilterStage::new(butter(), MovingAverage::new(10).unwrap());
        assert_eq!(stage.min_len(), butter().edge_padding() + 1);
        assert!(stage.check_len(stage.min_len() - 1).is_err());
        let all = FilterSelection {
            butterworth: true,
            moving_average: true,
        };
        let input = sine_wave(1.0, 1.0, 500.0, stage.min_len());
        assert!(stage.check_len(input.len()).is_ok());
        assert_eq!(stage.apply(&all, &input).unwrap().len(), input.len());

        let wide = FilterStage::new(butter(), MovingAverage::new(40).unwrap());
        assert_eq!(wide.min_len(), 40);
        assert!(matches!(wide.check_len(39), Err(SignalError::InvalidInput(_))));
    }
}
