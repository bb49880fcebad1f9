use crate::config::PipelineConfig;
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Totals written to `stats.json` when the frame stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub noise_reused: u64,
    pub noise_regenerated: u64,
    pub noise_disabled: u64,
}

impl SessionStats {
    fn record(&mut self, frame: &RenderFrame) {
        self.frames += 1;
        match frame.noise {
            NoiseStatus::Reused => self.noise_reused += 1,
            NoiseStatus::Regenerated => self.noise_regenerated += 1,
            NoiseStatus::Disabled => self.noise_disabled += 1,
        }
    }
}

/// Records one control session to a timestamped directory:
/// `manifest.json` (pipeline config), `frames.jsonl` (one `CompactFrame`
/// per line) and `stats.json`.
pub struct DataLogger {
    rx: Receiver<RenderFrame>,
    session_dir: PathBuf,
    config: PipelineConfig,
}

impl DataLogger {
    pub fn new(rx: Receiver<RenderFrame>, output_dir: &Path, config: PipelineConfig) -> io::Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        fs::create_dir_all(&session_dir)?;

        Ok(Self {
            rx,
            session_dir,
            config,
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Run the logger until every frame sender is gone. Blocks the calling thread.
    pub fn run(&self) -> io::Result<SessionStats> {
        info!("Data logger → {:?}", self.session_dir);

        self.write_manifest()?;

        let frames_path = self.session_dir.join("frames.jsonl");
        let mut frames_writer = BufWriter::new(File::create(&frames_path)?);
        let mut stats = SessionStats::default();

        for frame in self.rx.iter() {
            let line = serde_json::to_string(&CompactFrame::from(&frame))?;
            writeln!(frames_writer, "{}", line)?;
            stats.record(&frame);

            if stats.frames % 100 == 0 {
                frames_writer.flush()?;
                info!(
                    "Logged {} frames ({} noise redraws)",
                    stats.frames, stats.noise_regenerated
                );
            }
        }

        frames_writer.flush()?;

        let stats_path = self.session_dir.join("stats.json");
        let summary = json!({
            "total_frames": stats.frames,
            "noise_reused": stats.noise_reused,
            "noise_regenerated": stats.noise_regenerated,
            "noise_disabled": stats.noise_disabled,
        });
        if let Err(e) = fs::write(&stats_path, serde_json::to_string_pretty(&summary)?) {
            error!("Failed to write stats: {}", e);
        }

        info!("Session saved: {} frames → {:?}", stats.frames, self.session_dir);
        Ok(stats)
    }

    fn write_manifest(&self) -> io::Result<()> {
        let manifest = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "system": "noisy-harmonic",
            "pipeline": self.config,
            "frame_format": {
                "encoding": "jsonl",
                "fields": {
                    "n": "sequence",
                    "t": "timestamp_us",
                    "c": "control state",
                    "x": "noise status",
                    "g": "grid [start, end]",
                    "p": "pure",
                    "o": "observed",
                    "f": "filtered",
                },
            },
        });

        let path = self.session_dir.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)
    }
}
