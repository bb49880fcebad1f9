use crate::types::*;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Plays scripted slider drags and checkbox clicks into the coordinator,
/// the way a user would operate the widget, so the whole pipeline can run
/// without any UI.
pub struct Simulator {
    tx: Sender<ControlEvent>,
    defaults: ControlState,
    rate_hz: u32,
    paced: bool,
    sent: u64,
}

impl Simulator {
    /// `rate_hz` is how many control events per second a drag produces.
    pub fn new(tx: Sender<ControlEvent>, defaults: ControlState, rate_hz: u32) -> Self {
        Self {
            tx,
            defaults,
            rate_hz: rate_hz.max(1),
            paced: true,
            sent: 0,
        }
    }

    /// Emit events back to back instead of sleeping between them.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Run the named demo sequence to completion and return how many events
    /// were sent. Unknown names fall back to `tour`. Blocks the calling thread.
    pub fn run(&mut self, demo: &str) -> u64 {
        let gestures = match demo_sequence(demo) {
            Some(g) => g,
            None => {
                warn!("Unknown demo '{}', playing 'tour'", demo);
                tour_sequence()
            }
        };
        info!("Simulator starting '{}' ({} gestures)...", demo, gestures.len());

        let mut state = self.defaults;
        for gesture in &gestures {
            if !self.execute(gesture, &mut state) {
                warn!("Coordinator gone, stopping simulator");
                break;
            }
        }

        info!("Demo sequence complete: {} events sent", self.sent);
        self.sent
    }

    /// Returns false once the receiving side has hung up.
    fn execute(&mut self, gesture: &Gesture, state: &mut ControlState) -> bool {
        match gesture {
            Gesture::Hold { ms } => {
                info!("  hold {}ms", ms);
                if self.paced {
                    thread::sleep(Duration::from_millis(*ms as u64));
                }
                true
            }

            Gesture::Drag { slider, to, ms } => {
                let from = slider.get(state);
                info!("  drag {} {:.3} → {:.3} over {}ms", slider.name(), from, to, ms);
                let ticks = self.ticks(*ms);
                for i in 0..ticks {
                    let t = (i + 1) as f64 / ticks as f64;
                    let value = if i + 1 == ticks { *to } else { lerp(from, *to, smoothstep(t)) };
                    slider.set(state, value);
                    if !self.emit(slider.event(value)) {
                        return false;
                    }
                }
                true
            }

            Gesture::ShowNoise(on) => {
                info!("  noise {}", if *on { "on" } else { "off" });
                state.show_noise = *on;
                self.emit(ControlEvent::ShowNoise(*on))
            }

            Gesture::Filter { kind, enabled } => {
                info!("  {} {}", kind.label(), if *enabled { "on" } else { "off" });
                state.filters.set(*kind, *enabled);
                self.emit(ControlEvent::EnableFilter {
                    kind: *kind,
                    enabled: *enabled,
                })
            }

            Gesture::Reset => {
                info!("  reset");
                *state = self.defaults;
                self.emit(ControlEvent::Reset)
            }
        }
    }

    fn ticks(&self, ms: u32) -> u64 {
        (ms as u64 * self.rate_hz as u64 / 1000).max(1)
    }

    fn emit(&mut self, event: ControlEvent) -> bool {
        if self.tx.send(event).is_err() {
            return false;
        }
        self.sent += 1;
        if self.paced {
            thread::sleep(Duration::from_micros(1_000_000 / self.rate_hz as u64));
        }
        true
    }
}

// ─── Gesture types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slider {
    Amplitude,
    Frequency,
    Phase,
    NoiseMean,
    NoiseVariance,
}

impl Slider {
    pub fn name(&self) -> &'static str {
        self.range().name
    }

    pub fn range(&self) -> ParameterRange {
        match self {
            Slider::Amplitude => AMPLITUDE_RANGE,
            Slider::Frequency => FREQUENCY_RANGE,
            Slider::Phase => PHASE_RANGE,
            Slider::NoiseMean => NOISE_MEAN_RANGE,
            Slider::NoiseVariance => NOISE_VARIANCE_RANGE,
        }
    }

    fn get(&self, state: &ControlState) -> f64 {
        let p = &state.params;
        match self {
            Slider::Amplitude => p.amplitude,
            Slider::Frequency => p.frequency,
            Slider::Phase => p.phase,
            Slider::NoiseMean => p.noise_mean,
            Slider::NoiseVariance => p.noise_variance,
        }
    }

    fn set(&self, state: &mut ControlState, value: f64) {
        let p = &mut state.params;
        match self {
            Slider::Amplitude => p.amplitude = value,
            Slider::Frequency => p.frequency = value,
            Slider::Phase => p.phase = value,
            Slider::NoiseMean => p.noise_mean = value,
            Slider::NoiseVariance => p.noise_variance = value,
        }
    }

    fn event(&self, value: f64) -> ControlEvent {
        match self {
            Slider::Amplitude => ControlEvent::SetAmplitude(value),
            Slider::Frequency => ControlEvent::SetFrequency(value),
            Slider::Phase => ControlEvent::SetPhase(value),
            Slider::NoiseMean => ControlEvent::SetNoiseMean(value),
            Slider::NoiseVariance => ControlEvent::SetNoiseVariance(value),
        }
    }
}

#[derive(Debug, Clone)]
enum Gesture {
    Hold { ms: u32 },
    Drag { slider: Slider, to: f64, ms: u32 },
    ShowNoise(bool),
    Filter { kind: FilterKind, enabled: bool },
    Reset,
}

pub const DEMO_NAMES: [&str; 4] = ["drag", "noise", "filters", "tour"];

fn demo_sequence(name: &str) -> Option<Vec<Gesture>> {
    match name {
        "drag" => Some(drag_sequence()),
        "noise" => Some(noise_sequence()),
        "filters" => Some(filter_sequence()),
        "tour" => Some(tour_sequence()),
        _ => None,
    }
}

/// Harmonic sliders only: every frame reuses the cached noise.
fn drag_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Hold { ms: 200 },
        Gesture::Drag { slider: Slider::Amplitude, to: 3.0, ms: 600 },
        Gesture::Drag { slider: Slider::Frequency, to: 5.0, ms: 800 },
        Gesture::Drag { slider: Slider::Phase, to: PI, ms: 500 },
        Gesture::Hold { ms: 300 },
        Gesture::Drag { slider: Slider::Amplitude, to: 1.0, ms: 400 },
        Gesture::Drag { slider: Slider::Frequency, to: 2.0, ms: 400 },
        Gesture::Drag { slider: Slider::Phase, to: 0.0, ms: 400 },
    ]
}

/// Noise sliders: each step draws a fresh realization.
fn noise_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Hold { ms: 200 },
        Gesture::Drag { slider: Slider::NoiseVariance, to: 0.6, ms: 500 },
        Gesture::Drag { slider: Slider::NoiseMean, to: 0.5, ms: 400 },
        Gesture::Hold { ms: 300 },
        Gesture::ShowNoise(false),
        Gesture::Drag { slider: Slider::Amplitude, to: 2.0, ms: 300 },
        Gesture::ShowNoise(true),
        Gesture::Drag { slider: Slider::NoiseMean, to: 0.0, ms: 400 },
        Gesture::Drag { slider: Slider::NoiseVariance, to: 0.05, ms: 500 },
    ]
}

/// Smoothing stages on a noisy signal, alone and chained.
fn filter_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Hold { ms: 200 },
        Gesture::Filter { kind: FilterKind::Butterworth, enabled: true },
        Gesture::Hold { ms: 500 },
        Gesture::Drag { slider: Slider::Frequency, to: 4.0, ms: 500 },
        Gesture::Filter { kind: FilterKind::MovingAverage, enabled: true },
        Gesture::Hold { ms: 500 },
        Gesture::Filter { kind: FilterKind::Butterworth, enabled: false },
        Gesture::Drag { slider: Slider::NoiseVariance, to: 0.8, ms: 400 },
        Gesture::Hold { ms: 500 },
        Gesture::Filter { kind: FilterKind::MovingAverage, enabled: false },
    ]
}

/// Everything above, finished with a reset.
fn tour_sequence() -> Vec<Gesture> {
    let mut gestures = drag_sequence();
    gestures.extend(noise_sequence());
    gestures.extend(filter_sequence());
    gestures.push(Gesture::Hold { ms: 300 });
    gestures.push(Gesture::Reset);
    gestures.push(Gesture::Hold { ms: 500 });
    gestures
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
