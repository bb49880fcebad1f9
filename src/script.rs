//! JSONL control scripts: a recorded or hand-written sequence of control
//! events that can be replayed into a coordinator.
//!
//! The first line is a header object carrying
//! `"format": "noisy-harmonic-script"` and optionally a name and a replay
//! rate; every following line is one `ControlEvent`, e.g.
//! `{"event":"set_amplitude","value":2.0}` or `{"event":"reset"}`.
//! Works with any `BufRead`: files, in-memory buffers, stdin.

use crate::types::ControlEvent;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

pub const SCRIPT_FORMAT: &str = "noisy-harmonic-script";

/// Parsed script header (first line of a script file).
#[derive(Debug)]
pub struct ScriptHeader {
    pub format: String,
    pub name: String,
    /// Events per second on replay; 0 replays as fast as the channel allows
    pub rate_hz: u32,
    pub raw: serde_json::Value,
}

/// Line-by-line control script reader.
pub struct ScriptReader<R: BufRead> {
    reader: R,
    pub header: ScriptHeader,
    line_buf: String,
    line_no: usize,
}

impl<R: BufRead> ScriptReader<R> {
    /// Read and validate the header line. Returns an error if the header is
    /// missing, unparseable, or lacks a `"format": "noisy-harmonic-script"` field.
    pub fn open(mut reader: R) -> Result<Self, String> {
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| format!("read header: {}", e))?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err("empty script".into());
        }

        let raw: serde_json::Value =
            serde_json::from_str(first_line).map_err(|e| format!("parse header: {}", e))?;

        let format = raw["format"]
            .as_str()
            .ok_or("missing \"format\" field")?
            .to_string();
        if format != SCRIPT_FORMAT {
            return Err(format!("unknown format: {}", format));
        }

        let name = raw["name"].as_str().unwrap_or("").to_string();
        let rate_hz = raw["rate_hz"].as_u64().unwrap_or(0) as u32;

        Ok(Self {
            reader,
            header: ScriptHeader {
                format,
                name,
                rate_hz,
                raw,
            },
            line_buf: String::new(),
            line_no: 1,
        })
    }

    /// Read the next event. Returns `None` at EOF, `Err` for unparseable lines.
    pub fn next_event(&mut self) -> Option<Result<ControlEvent, String>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<ControlEvent>(trimmed)
                            .map_err(|e| format!("line {}: {}", self.line_no, e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// Read all remaining events, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.next_event() {
            match result {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping script line: {}", e),
            }
        }
        events
    }

    /// Send every event into `tx`, paced by the header's rate. Malformed lines
    /// are skipped. Stops early if the receiver hangs up. Returns the number
    /// of events sent.
    pub fn replay(mut self, tx: &Sender<ControlEvent>) -> u64 {
        info!(
            "Replaying script '{}' at {}",
            self.header.name,
            match self.header.rate_hz {
                0 => "full speed".to_string(),
                hz => format!("{} Hz", hz),
            }
        );
        let pause = match self.header.rate_hz {
            0 => None,
            hz => Some(Duration::from_micros(1_000_000 / hz as u64)),
        };

        let mut sent = 0;
        while let Some(result) = self.next_event() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping script line: {}", e);
                    continue;
                }
            };
            if tx.send(event).is_err() {
                warn!("Coordinator gone, stopping replay");
                break;
            }
            sent += 1;
            if let Some(pause) = pause {
                thread::sleep(pause);
            }
        }
        info!("Script finished: {} events sent", sent);
        sent
    }
}
