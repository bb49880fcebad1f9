use crate::dsp;
use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Renders a live ASCII dashboard of the control session.
pub struct ConsoleDisplay {
    rx: Receiver<RenderFrame>,
    update_hz: u32,
}

/// Numbers shown for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    /// RMS of `observed - pure`, i.e. of the injected noise
    pub noise_rms: f64,
    /// RMS of `filtered - pure`
    pub residual_rms: f64,
    pub peak: f64,
}

impl FrameSummary {
    pub fn of(frame: &RenderFrame) -> Self {
        Self {
            noise_rms: dsp::rms_difference(&frame.observed, &frame.pure),
            residual_rms: dsp::rms_difference(&frame.filtered, &frame.pure),
            peak: frame.observed.iter().fold(0.0_f64, |m, v| m.max(v.abs())),
        }
    }
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<RenderFrame>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    /// Redraw at most `update_hz` times a second; the newest frame wins.
    pub fn run(&self) {
        let interval = Duration::from_millis(1000 / self.update_hz.max(1) as u64);
        let mut last_draw: Option<Instant> = None;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            if last_draw.map_or(false, |t| t.elapsed() < interval) {
                continue;
            }
            last_draw = Some(Instant::now());

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render_dashboard(&frame));
            let _ = stdout.flush();
        }
    }
}

pub fn render_dashboard(frame: &RenderFrame) -> String {
    let summary = FrameSummary::of(frame);
    let p = &frame.state.params;
    let mut out = String::new();

    out.push_str("╔══════════════════════════════════════════════════════════╗\n");
    out.push_str("║  NOISY HARMONIC - Live Monitor                           ║\n");
    out.push_str("╠══════════════════════════════════════════════════════════╣\n");
    out.push_str(&format!(
        "║  Frame {:>6}   t = {:>8.2}s{:28}║\n",
        frame.sequence,
        frame.timestamp_us as f64 / 1_000_000.0,
        ""
    ));
    out.push_str(&format!("║{:58}║\n", ""));

    for (range, value) in PARAMETER_RANGES.iter().zip([
        p.amplitude,
        p.frequency,
        p.phase,
        p.noise_mean,
        p.noise_variance,
    ]) {
        let position = (value - range.min) / (range.max - range.min);
        out.push_str(&format!(
            "║  {:>14} {} {:>7.3} ║\n",
            range.name,
            make_bar(position, 30),
            value
        ));
    }

    out.push_str(&format!("║{:58}║\n", ""));
    let noise = match frame.noise {
        NoiseStatus::Disabled => "off",
        NoiseStatus::Reused => "on (cached)",
        NoiseStatus::Regenerated => "on (redrawn)",
    };
    out.push_str(&format!("║  Noise:     {:<45}║\n", noise));
    out.push_str(&format!("║  Smoothing: {:<45}║\n", frame.state.filters.to_string()));
    out.push_str(&format!("║{:58}║\n", ""));
    out.push_str(&format!("║  Noise RMS:     {:>10.4}{:31}║\n", summary.noise_rms, ""));
    out.push_str(&format!("║  Residual RMS:  {:>10.4}{:31}║\n", summary.residual_rms, ""));
    out.push_str(&format!("║  Peak |x|:      {:>10.4}{:31}║\n", summary.peak, ""));
    out.push_str("╚══════════════════════════════════════════════════════════╝\n");
    out
}

fn make_bar(val: f64, width: usize) -> String {
    let filled = (val.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
