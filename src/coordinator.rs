use crate::config::PipelineConfig;
use crate::error::Result;
use crate::filters::FilterStage;
use crate::generator::SignalGenerator;
use crate::types::*;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};

/// The coordinator owns one control session: the current slider/checkbox
/// state, a signal generator (and with it the session's noise cache) and the
/// filter stage. Every control change becomes exactly one `RenderFrame`.
///
/// # Cycle
///
/// 1. Apply the event to a copy of the current state
/// 2. Generate pure + observed curves (cached noise reused unless the
///    noise mean/variance changed)
/// 3. Run the active filters on the observed curve
/// 4. Commit the new state and emit the frame
///
/// A cycle that fails (negative variance, signal too short for a filter)
/// leaves the committed state unchanged.
///
/// Reset is an ordinary parameter change to the configured defaults: the
/// noise cache is compared as usual, so resetting to the pair already in
/// the cache keeps the current realization.
pub struct Coordinator {
    state: ControlState,
    defaults: ControlState,
    generator: SignalGenerator,
    filters: FilterStage,
    clock: SessionClock,
    sequence: u64,
}

impl Coordinator {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let grid = SampleGrid::new(config.grid.samples, config.grid.start, config.grid.end)?;
        let generator = match config.seed {
            Some(seed) => SignalGenerator::with_seed(grid, seed),
            None => SignalGenerator::new(grid),
        }
        .with_noise_tolerance(config.noise_tolerance);
        let filters = FilterStage::from_config(&config.butterworth, &config.moving_average)?;
        filters.check_len(grid.len())?;
        config.defaults.params.validate()?;

        Ok(Self {
            state: config.defaults,
            defaults: config.defaults,
            generator,
            filters,
            clock: SessionClock::new(),
            sequence: 0,
        })
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn defaults(&self) -> &ControlState {
        &self.defaults
    }

    pub fn generator(&self) -> &SignalGenerator {
        &self.generator
    }

    pub fn frames_rendered(&self) -> u64 {
        self.sequence
    }

    /// Evaluate `new_state` and, on success, make it the current state.
    pub fn on_parameter_change(&mut self, new_state: ControlState) -> Result<RenderFrame> {
        let signals = self.generator.generate(&new_state.params, new_state.show_noise)?;
        let filtered = self.filters.apply(&new_state.filters, &signals.observed)?;

        self.state = new_state;
        let frame = RenderFrame {
            sequence: self.sequence,
            timestamp_us: self.clock.now_us(),
            state: new_state,
            noise: signals.noise,
            time: self.generator.times().to_vec(),
            pure: signals.pure,
            observed: signals.observed,
            filtered,
        };
        self.sequence += 1;
        trace!("{}", frame);
        Ok(frame)
    }

    /// Apply one control event to the current state.
    pub fn apply(&mut self, event: &ControlEvent) -> Result<RenderFrame> {
        let next = event.apply_to(&self.state, &self.defaults);
        self.on_parameter_change(next)
    }

    /// Restore the configured defaults (noise on, smoothing off) and redraw.
    pub fn reset(&mut self) -> Result<RenderFrame> {
        self.apply(&ControlEvent::Reset)
    }

    /// Redraw the current state without changing it.
    pub fn render(&mut self) -> Result<RenderFrame> {
        self.on_parameter_change(self.state)
    }

    /// Event loop: draw the initial frame, then one frame per event, until
    /// every sender of `input_rx` is gone. Blocks the calling thread.
    pub fn run(&mut self, input_rx: Receiver<ControlEvent>, frame_txs: &[Sender<RenderFrame>]) {
        info!(
            "Coordinator running ({} samples over [{:.3}, {:.3}])",
            self.generator.grid().samples,
            self.generator.grid().start,
            self.generator.grid().end
        );
        let butterworth = self.filters.butterworth();
        info!(
            "Smoothing: Butterworth order {} at {} Hz (fs {} Hz), moving average over {} samples",
            butterworth.order(),
            butterworth.cutoff_hz(),
            butterworth.sample_rate_hz(),
            self.filters.moving_average().window()
        );

        let mut hits: u64 = 0;
        let mut misses: u64 = 0;
        let mut rejected: u64 = 0;

        let initial = self.render();
        let mut emit = |result: Result<RenderFrame>, origin: &dyn std::fmt::Display| match result {
            Ok(frame) => {
                match frame.noise {
                    NoiseStatus::Reused => hits += 1,
                    NoiseStatus::Regenerated => {
                        misses += 1;
                        debug!("Noise regenerated for {}", frame.state.params);
                    }
                    NoiseStatus::Disabled => {}
                }
                if frame.sequence % 100 == 0 {
                    debug!("Coordinator: {} frames rendered", frame.sequence);
                }
                for tx in frame_txs {
                    let _ = tx.send(frame.clone());
                }
            }
            Err(e) => {
                rejected += 1;
                warn!("Rejected {}: {}", origin, e);
            }
        };

        emit(initial, &"initial state");
        for event in input_rx.iter() {
            let result = self.apply(&event);
            emit(result, &event);
        }

        info!(
            "Coordinator shutting down after {} frames (noise reused {}, redrawn {}, rejected {})",
            self.sequence, hits, misses, rejected
        );
    }
}
