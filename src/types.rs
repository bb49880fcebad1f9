use crate::error::{Result, SignalError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::time::Instant;

// ─── Signal parameters ──────────────────────────────────────────────────────

/// Inclusive range a slider exposes for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const AMPLITUDE_RANGE: ParameterRange = ParameterRange { name: "amplitude", min: 0.1, max: 5.0 };
pub const FREQUENCY_RANGE: ParameterRange = ParameterRange { name: "frequency", min: 0.1, max: 10.0 };
pub const PHASE_RANGE: ParameterRange = ParameterRange { name: "phase", min: 0.0, max: 2.0 * PI };
pub const NOISE_MEAN_RANGE: ParameterRange = ParameterRange { name: "noise_mean", min: -1.0, max: 1.0 };
pub const NOISE_VARIANCE_RANGE: ParameterRange =
    ParameterRange { name: "noise_variance", min: 0.01, max: 1.0 };

/// UI ranges in field order. Callers are expected to stay inside them;
/// the pipeline itself only rejects negative variance and non-finite values.
pub const PARAMETER_RANGES: [ParameterRange; 5] = [
    AMPLITUDE_RANGE,
    FREQUENCY_RANGE,
    PHASE_RANGE,
    NOISE_MEAN_RANGE,
    NOISE_VARIANCE_RANGE,
];

/// Everything that shapes one evaluation of the harmonic + noise signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalParameters {
    pub amplitude: f64,
    /// Cycles per unit of grid time
    pub frequency: f64,
    /// Radians
    pub phase: f64,
    pub noise_mean: f64,
    /// Variance of the additive noise, not its standard deviation
    pub noise_variance: f64,
}

impl SignalParameters {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("amplitude", self.amplitude),
            ("frequency", self.frequency),
            ("phase", self.phase),
            ("noise_mean", self.noise_mean),
            ("noise_variance", self.noise_variance),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(SignalError::parameter(name, value, "must be finite"));
            }
        }
        if self.noise_variance < 0.0 {
            return Err(SignalError::parameter(
                "noise_variance",
                self.noise_variance,
                "must not be negative",
            ));
        }
        Ok(())
    }

    /// Copy with every field pulled into its slider range.
    pub fn clamped(&self) -> Self {
        Self {
            amplitude: AMPLITUDE_RANGE.clamp(self.amplitude),
            frequency: FREQUENCY_RANGE.clamp(self.frequency),
            phase: PHASE_RANGE.clamp(self.phase),
            noise_mean: NOISE_MEAN_RANGE.clamp(self.noise_mean),
            noise_variance: NOISE_VARIANCE_RANGE.clamp(self.noise_variance),
        }
    }
}

impl Default for SignalParameters {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            frequency: 2.0,
            phase: 0.0,
            noise_mean: 0.0,
            noise_variance: 0.1,
        }
    }
}

impl fmt::Display for SignalParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={:.2} f={:.2} φ={:.2}  noise μ={:+.2} σ²={:.3}",
            self.amplitude, self.frequency, self.phase, self.noise_mean, self.noise_variance,
        )
    }
}

// ─── Sample grid ────────────────────────────────────────────────────────────

/// Evenly spaced sample times over `[start, end]`, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleGrid {
    pub samples: usize,
    pub start: f64,
    pub end: f64,
}

impl SampleGrid {
    pub fn new(samples: usize, start: f64, end: f64) -> Result<Self> {
        let grid = Self { samples, start, end };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(SignalError::parameter("samples", 0.0, "grid needs at least one sample"));
        }
        if !self.start.is_finite() {
            return Err(SignalError::parameter("start", self.start, "must be finite"));
        }
        if !self.end.is_finite() {
            return Err(SignalError::parameter("end", self.end, "must be finite"));
        }
        if self.end < self.start {
            return Err(SignalError::parameter("end", self.end, "must not precede start"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Distance between neighbouring samples (0 for a one-sample grid).
    pub fn step(&self) -> f64 {
        if self.samples < 2 {
            0.0
        } else {
            (self.end - self.start) / (self.samples - 1) as f64
        }
    }

    pub fn time_at(&self, index: usize) -> f64 {
        if self.samples > 1 && index + 1 == self.samples {
            // Land exactly on the upper bound
            self.end
        } else {
            self.start + index as f64 * self.step()
        }
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.samples).map(|i| self.time_at(i)).collect()
    }
}

// ─── Filters and control state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Zero-phase Butterworth low-pass
    Butterworth,
    /// Centered uniform moving average
    MovingAverage,
}

impl FilterKind {
    /// Order in which active filters are chained.
    pub const CHAIN_ORDER: [FilterKind; 2] = [FilterKind::Butterworth, FilterKind::MovingAverage];

    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::Butterworth => "butterworth",
            FilterKind::MovingAverage => "moving-average",
        }
    }
}

/// Which smoothing stages are switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub butterworth: bool,
    pub moving_average: bool,
}

impl FilterSelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Butterworth => self.butterworth,
            FilterKind::MovingAverage => self.moving_average,
        }
    }

    pub fn set(&mut self, kind: FilterKind, enabled: bool) {
        match kind {
            FilterKind::Butterworth => self.butterworth = enabled,
            FilterKind::MovingAverage => self.moving_average = enabled,
        }
    }

    /// Active filters in chain order.
    pub fn active(&self) -> impl Iterator<Item = FilterKind> + '_ {
        FilterKind::CHAIN_ORDER
            .into_iter()
            .filter(move |kind| self.is_enabled(*kind))
    }

    pub fn is_empty(&self) -> bool {
        !self.butterworth && !self.moving_average
    }
}

impl fmt::Display for FilterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "off");
        }
        let labels: Vec<&str> = self.active().map(|k| k.label()).collect();
        write!(f, "{}", labels.join(" → "))
    }
}

/// Full state behind one redraw: slider values plus checkbox states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub params: SignalParameters,
    pub show_noise: bool,
    pub filters: FilterSelection,
}

impl ControlState {
    /// Noise shown, smoothing off.
    pub fn with_params(params: SignalParameters) -> Self {
        Self {
            params,
            show_noise: true,
            filters: FilterSelection::none(),
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::with_params(SignalParameters::default())
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

/// One user interaction, as forwarded by a presentation adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum ControlEvent {
    SetAmplitude(f64),
    SetFrequency(f64),
    SetPhase(f64),
    SetNoiseMean(f64),
    SetNoiseVariance(f64),
    ShowNoise(bool),
    EnableFilter { kind: FilterKind, enabled: bool },
    Replace(ControlState),
    Reset,
}

impl ControlEvent {
    /// State after applying this event to `state`. `Reset` yields `defaults`.
    pub fn apply_to(&self, state: &ControlState, defaults: &ControlState) -> ControlState {
        let mut next = *state;
        match *self {
            ControlEvent::SetAmplitude(v) => next.params.amplitude = v,
            ControlEvent::SetFrequency(v) => next.params.frequency = v,
            ControlEvent::SetPhase(v) => next.params.phase = v,
            ControlEvent::SetNoiseMean(v) => next.params.noise_mean = v,
            ControlEvent::SetNoiseVariance(v) => next.params.noise_variance = v,
            ControlEvent::ShowNoise(on) => next.show_noise = on,
            ControlEvent::EnableFilter { kind, enabled } => next.filters.set(kind, enabled),
            ControlEvent::Replace(replacement) => next = replacement,
            ControlEvent::Reset => next = *defaults,
        }
        next
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::SetAmplitude(v) => write!(f, "amplitude → {:.3}", v),
            ControlEvent::SetFrequency(v) => write!(f, "frequency → {:.3}", v),
            ControlEvent::SetPhase(v) => write!(f, "phase → {:.3}", v),
            ControlEvent::SetNoiseMean(v) => write!(f, "noise mean → {:.3}", v),
            ControlEvent::SetNoiseVariance(v) => write!(f, "noise variance → {:.3}", v),
            ControlEvent::ShowNoise(on) => write!(f, "show noise {}", if *on { "on" } else { "off" }),
            ControlEvent::EnableFilter { kind, enabled } => {
                write!(f, "{} {}", kind.label(), if *enabled { "on" } else { "off" })
            }
            ControlEvent::Replace(_) => write!(f, "replace state"),
            ControlEvent::Reset => write!(f, "reset"),
        }
    }
}

// ─── Render frame ───────────────────────────────────────────────────────────

/// What happened to the noise realization during one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseStatus {
    /// Noise display off; the cache was not touched
    Disabled,
    /// Cached vector reused unchanged
    Reused,
    /// Fresh vector drawn and stored
    Regenerated,
}

/// Three curves plus the state that produced them.
/// Produced by the coordinator, consumed by logger, console and WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFrame {
    /// Monotonic per-session frame counter, starting at 0
    pub sequence: u64,
    pub timestamp_us: u64,
    pub state: ControlState,
    pub noise: NoiseStatus,
    pub time: Vec<f64>,
    pub pure: Vec<f64>,
    pub observed: Vec<f64>,
    /// Active filter chain applied to `observed`; equals `observed` when none is active
    pub filtered: Vec<f64>,
}

impl RenderFrame {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

impl fmt::Display for RenderFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noise = match self.noise {
            NoiseStatus::Disabled => "off",
            NoiseStatus::Reused => "hit",
            NoiseStatus::Regenerated => "miss",
        };
        write!(
            f,
            "#{:<5} t={:>10}µs  {}  noise={:<4} filters={}",
            self.sequence, self.timestamp_us, self.state.params, noise, self.state.filters,
        )
    }
}

// ─── Compact serialization ──────────────────────────────────────────────────

/// Short-key representation for WS streaming and JSONL logging.
/// Field mapping: n=sequence, t=timestamp_us, c=state, x=noise status,
/// g=[grid start, grid end], p=pure, o=observed, f=filtered.
/// The time axis is implied by `g` and the curve length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactFrame {
    pub n: u64,
    pub t: u64,
    pub c: ControlState,
    pub x: NoiseStatus,
    pub g: [f64; 2],
    pub p: Vec<f64>,
    pub o: Vec<f64>,
    pub f: Vec<f64>,
}

impl From<&RenderFrame> for CompactFrame {
    fn from(frame: &RenderFrame) -> Self {
        let start = frame.time.first().copied().unwrap_or(0.0);
        let end = frame.time.last().copied().unwrap_or(start);
        Self {
            n: frame.sequence,
            t: frame.timestamp_us,
            c: frame.state,
            x: frame.noise,
            g: [start, end],
            p: frame.pure.clone(),
            o: frame.observed.clone(),
            f: frame.filtered.clone(),
        }
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for one control session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
