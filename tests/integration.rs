//! End-to-end integration tests for the noisy-harmonic pipeline.
//!
//! These tests exercise the full data flow:
//!   Simulator / script → ControlEvent channel → Coordinator → RenderFrame channel → assertions
//!
//! The coordinator owns the session's generator and noise cache, so every
//! frame can be checked against the cache rules: harmonic sliders reuse the
//! shown noise, noise sliders redraw it.

use crossbeam_channel::bounded;
use std::io::Cursor;
use std::thread;
use std::time::Duration;

use noisy_harmonic::config::{PipelineConfig, Preset};
use noisy_harmonic::coordinator::Coordinator;
use noisy_harmonic::generator::SignalGenerator;
use noisy_harmonic::script::ScriptReader;
use noisy_harmonic::simulator::Simulator;
use noisy_harmonic::types::*;

// ─── Helpers ───────────────────────────────────────────────────────────────

fn seeded(preset: Preset, seed: u64) -> PipelineConfig {
    let mut config = PipelineConfig::preset(preset);
    config.seed = Some(seed);
    config
}

/// Run a coordinator in a background thread, feeding it a sequence of events.
/// Collects output frames (initial frame first) until the input channel closes.
fn run_pipeline(config: PipelineConfig, events: Vec<ControlEvent>) -> Vec<RenderFrame> {
    let (input_tx, input_rx) = bounded::<ControlEvent>(4096);
    let (frame_tx, frame_rx) = bounded::<RenderFrame>(4096);

    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            let mut coord = Coordinator::new(&config).unwrap();
            coord.run(input_rx, &[frame_tx]);
        })
        .unwrap();

    for event in events {
        input_tx.send(event).unwrap();
    }
    drop(input_tx);

    let mut frames = Vec::new();
    while let Ok(f) = frame_rx.recv_timeout(Duration::from_millis(2000)) {
        frames.push(f);
    }

    let _ = coord_handle.join();
    frames
}

fn noise_of(frame: &RenderFrame) -> Vec<f64> {
    frame
        .observed
        .iter()
        .zip(&frame.pure)
        .map(|(o, p)| o - p)
        .collect()
}

// ─── Cache behaviour ───────────────────────────────────────────────────────

#[test]
fn test_end_to_end_cache_hit_then_frequency_change() {
    let params = SignalParameters {
        amplitude: 1.0,
        frequency: 2.0,
        phase: 0.0,
        noise_mean: 0.0,
        noise_variance: 0.1,
    };
    let grid = SampleGrid::new(1000, 0.0, 2.0).unwrap();
    let mut gen = SignalGenerator::with_seed(grid, 2024);

    let first = gen.generate(&params, true).unwrap();
    let second = gen.generate(&params, true).unwrap();
    assert_eq!(first.observed, second.observed, "same parameters must hit the cache");
    assert_eq!(second.noise, NoiseStatus::Reused);

    let noise = gen.cached_noise().unwrap().to_vec();
    let faster = SignalParameters {
        frequency: 3.0,
        ..params
    };
    let third = gen.generate(&faster, true).unwrap();
    assert_eq!(third.noise, NoiseStatus::Reused);
    assert_ne!(third.pure, first.pure);
    for i in 0..noise.len() {
        assert_eq!(third.observed[i], third.pure[i] + noise[i], "sample {}", i);
    }
}

#[test]
fn test_harmonic_drags_keep_noise_through_pipeline() {
    let frames = run_pipeline(
        seeded(Preset::Desktop, 1),
        vec![
            ControlEvent::SetAmplitude(2.0),
            ControlEvent::SetFrequency(4.5),
            ControlEvent::SetPhase(1.2),
        ],
    );
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0].noise, NoiseStatus::Regenerated);

    let reference = noise_of(&frames[0]);
    for frame in &frames[1..] {
        assert_eq!(frame.noise, NoiseStatus::Reused);
        for (a, b) in noise_of(frame).iter().zip(&reference) {
            // observed - pure carries one rounding of the addition
            assert!((a - b).abs() < 1e-12);
        }
    }
    assert_eq!(frames[3].state.params.phase, 1.2);
}

#[test]
fn test_variance_change_redraws_through_pipeline() {
    let frames = run_pipeline(
        seeded(Preset::Desktop, 2),
        vec![
            ControlEvent::SetNoiseVariance(0.4),
            ControlEvent::SetNoiseMean(0.5),
        ],
    );
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.noise == NoiseStatus::Regenerated));
    assert_ne!(noise_of(&frames[0]), noise_of(&frames[1]));

    let mean: f64 = noise_of(&frames[2]).iter().sum::<f64>() / 1000.0;
    assert!((mean - 0.5).abs() < 0.1, "mean {}", mean);
}

#[test]
fn test_rejected_event_emits_no_frame() {
    let frames = run_pipeline(
        seeded(Preset::Desktop, 3),
        vec![
            ControlEvent::SetNoiseVariance(-0.5),
            ControlEvent::SetAmplitude(2.0),
        ],
    );
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].sequence, 1);
    assert_eq!(frames[1].state.params.noise_variance, 0.1);
    assert_eq!(frames[1].noise, NoiseStatus::Reused);
}

// ─── Reset ─────────────────────────────────────────────────────────────────

#[test]
fn test_reset_after_variance_drift_redraws() {
    for preset in [Preset::Desktop, Preset::Browser] {
        let config = seeded(preset, 4);
        let defaults = config.defaults;
        let frames = run_pipeline(
            config,
            vec![
                ControlEvent::SetAmplitude(3.3),
                ControlEvent::SetNoiseVariance(0.7),
                ControlEvent::EnableFilter {
                    kind: FilterKind::MovingAverage,
                    enabled: true,
                },
                ControlEvent::ShowNoise(false),
                ControlEvent::Reset,
            ],
        );
        let last = frames.last().unwrap();
        assert_eq!(last.state, defaults);
        assert!(last.state.show_noise);
        assert!(last.state.filters.is_empty());
        assert_eq!(last.state.params.amplitude, 1.0);
        assert_eq!(last.state.params.frequency, 2.0);
        assert_eq!(last.state.params.phase, 0.0);
        assert_eq!(last.state.params.noise_mean, 0.0);
        // Cache holds the 0.7 realization, so the default pair misses
        assert_eq!(last.noise, NoiseStatus::Regenerated);
        assert_eq!(last.filtered, last.observed);
    }
}

#[test]
fn test_reset_after_amplitude_drift_keeps_noise() {
    let frames = run_pipeline(
        seeded(Preset::Browser, 5),
        vec![
            ControlEvent::SetAmplitude(4.0),
            ControlEvent::SetFrequency(0.5),
            ControlEvent::Reset,
        ],
    );
    let first = &frames[0];
    let last = frames.last().unwrap();
    assert_eq!(last.state.params.noise_variance, 0.2);
    assert_eq!(last.noise, NoiseStatus::Reused);
    assert_eq!(last.observed, first.observed);
}

// ─── Properties ────────────────────────────────────────────────────────────

#[test]
fn test_pure_is_deterministic_across_sessions() {
    let events = vec![
        ControlEvent::SetFrequency(7.0),
        ControlEvent::SetNoiseVariance(0.9),
        ControlEvent::SetPhase(2.0),
    ];
    let a = run_pipeline(seeded(Preset::Desktop, 6), events.clone());
    let b = run_pipeline(seeded(Preset::Desktop, 7), events);
    assert_eq!(a.len(), b.len());
    for (fa, fb) in a.iter().zip(&b) {
        assert_eq!(fa.pure, fb.pure);
        assert_eq!(fa.time, fb.time);
    }
    assert_ne!(a[2].observed, b[2].observed, "different seeds, different noise");
}

#[test]
fn test_filters_preserve_length_and_smooth() {
    let frames = run_pipeline(
        seeded(Preset::Desktop, 8),
        vec![
            ControlEvent::EnableFilter {
                kind: FilterKind::Butterworth,
                enabled: true,
            },
            ControlEvent::EnableFilter {
                kind: FilterKind::MovingAverage,
                enabled: true,
            },
        ],
    );
    assert_eq!(frames.len(), 3);
    let rms = |a: &[f64], b: &[f64]| -> f64 {
        (a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64).sqrt()
    };
    for frame in &frames[1..] {
        assert_eq!(frame.filtered.len(), 1000);
        assert_eq!(frame.observed, frames[0].observed);
        assert!(rms(&frame.filtered, &frame.pure) < rms(&frame.observed, &frame.pure));
    }
}

// ─── Control sources ───────────────────────────────────────────────────────

#[test]
fn test_simulator_drives_coordinator() {
    let config = seeded(Preset::Desktop, 9);
    let defaults = config.defaults;
    let (input_tx, input_rx) = bounded::<ControlEvent>(64);
    let (frame_tx, frame_rx) = bounded::<RenderFrame>(8192);

    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            let mut coord = Coordinator::new(&config).unwrap();
            coord.run(input_rx, &[frame_tx]);
        })
        .unwrap();

    let sim_handle = thread::Builder::new()
        .name("test-simulator".into())
        .spawn(move || Simulator::new(input_tx, defaults, 50).unpaced().run("drag"))
        .unwrap();

    let sent = sim_handle.join().unwrap();
    let _ = coord_handle.join();
    let frames: Vec<RenderFrame> = frame_rx.try_iter().collect();

    assert_eq!(frames.len() as u64, sent + 1);
    // The drag demo only moves harmonic sliders
    assert!(frames[1..].iter().all(|f| f.noise == NoiseStatus::Reused));
    let last = frames.last().unwrap();
    assert_eq!(last.state.params.amplitude, 1.0);
    assert_eq!(last.state.params.frequency, 2.0);
    assert_eq!(last.state.params.phase, 0.0);
}

#[test]
fn test_script_replays_into_coordinator() {
    let script = [
        r#"{"format":"noisy-harmonic-script","name":"smoke"}"#,
        r#"{"event":"set_amplitude","value":2.0}"#,
        r#"{"event":"enable_filter","value":{"kind":"butterworth","enabled":true}}"#,
        r#"not an event"#,
        r#"{"event":"set_noise_variance","value":0.3}"#,
        r#"{"event":"reset"}"#,
    ]
    .join("\n");
    let events = ScriptReader::open(Cursor::new(script)).unwrap().read_all();
    assert_eq!(events.len(), 4);

    let frames = run_pipeline(seeded(Preset::Desktop, 10), events);
    let status: Vec<NoiseStatus> = frames.iter().map(|f| f.noise).collect();
    assert_eq!(
        status,
        vec![
            NoiseStatus::Regenerated,
            NoiseStatus::Reused,
            NoiseStatus::Reused,
            NoiseStatus::Regenerated,
            NoiseStatus::Regenerated,
        ]
    );
    assert!(frames[2].state.filters.is_enabled(FilterKind::Butterworth));
    assert!(frames[4].state.filters.is_empty());
}
