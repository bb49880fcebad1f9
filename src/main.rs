use noisy_harmonic::config::{PipelineConfig, Preset};
use noisy_harmonic::console_display;
use noisy_harmonic::coordinator;
use noisy_harmonic::data_logger;
use noisy_harmonic::script::ScriptReader;
use noisy_harmonic::simulator;
use noisy_harmonic::types::*;
use noisy_harmonic::ws_server;

use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use log::{error, info};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;
use std::thread::{self, JoinHandle};

#[derive(Parser)]
#[command(name = "noisy-harmonic")]
#[command(about = "Noisy harmonic signal generator with zero-phase smoothing")]
struct Cli {
    /// Built-in configuration: "desktop" (grid [0, 2], fs 500 Hz) or "browser" (grid [0, 2π], fs 100 Hz)
    #[arg(long, value_enum, default_value_t = Preset::Desktop)]
    preset: Preset,

    /// JSON pipeline config; overrides --preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for reproducible noise
    #[arg(long)]
    seed: Option<u64>,

    /// Simulator demo sequence: "drag", "noise", "filters", "tour", or "none"
    #[arg(long, default_value = "tour")]
    demo: String,

    /// Replay a JSONL control script instead of the demo
    #[arg(long)]
    script: Option<PathBuf>,

    /// Simulator control events per second
    #[arg(long, default_value_t = 30)]
    rate_hz: u32,

    /// Enable console display (terminal TUI, for headless/debug)
    #[arg(long)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,

    /// Enable session logging
    #[arg(long)]
    log_data: bool,

    /// Output directory for logged sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,

    /// Enable the HTTP + WebSocket server for browser control and plotting
    #[arg(long)]
    ws: bool,

    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8080")]
    ws_addr: String,

    /// WebSocket broadcast rate (Hz)
    #[arg(long, default_value_t = 30)]
    ws_fps: u32,

    /// HTML page served at `/`
    #[arg(long)]
    viz: Option<PathBuf>,
}

fn spawn<F>(name: &str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name.into()).spawn(f) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to spawn {} thread: {}", name, e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> PipelineConfig {
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => PipelineConfig::preset(cli.preset),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);

    let mut coord = match coordinator::Coordinator::new(&config) {
        Ok(coord) => coord,
        Err(e) => {
            error!("Invalid pipeline configuration: {}", e);
            process::exit(1);
        }
    };

    info!("═══════════════════════════════════════════════");
    info!("  NOISY HARMONIC v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Grid: {} samples over [{:.3}, {:.3}]",
        config.grid.samples, config.grid.start, config.grid.end
    );
    info!(
        "  Butterworth: order {}, {} Hz @ {} Hz  |  Moving average: {} samples",
        config.butterworth.order,
        config.butterworth.cutoff_hz,
        config.butterworth.sample_rate_hz,
        config.moving_average.window
    );
    match config.seed {
        Some(seed) => info!("  Noise seed: {}", seed),
        None => info!("  Noise seed: entropy"),
    }
    if cli.ws { info!("  UI: browser on http://{}", cli.ws_addr.replace("0.0.0.0", "localhost")); }
    if cli.console { info!("  UI: Console TUI"); }
    info!("═══════════════════════════════════════════════");

    // Channel: control sources → coordinator
    let (input_tx, input_rx) = bounded::<ControlEvent>(1024);

    // Channels: coordinator → consumers
    let mut frame_txs: Vec<Sender<RenderFrame>> = Vec::new();

    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<RenderFrame>(64);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(spawn("display", move || {
            console_display::ConsoleDisplay::new(rx, hz).run();
        }));
    }

    // ─── Data logger ────────────────────────────────────────────────
    if cli.log_data {
        let (tx, rx) = bounded::<RenderFrame>(1024);
        match data_logger::DataLogger::new(rx, &cli.output_dir, config.clone()) {
            Ok(logger) => {
                frame_txs.push(tx);
                handles.push(spawn("logger", move || {
                    if let Err(e) = logger.run() {
                        error!("Data logger stopped: {}", e);
                    }
                }));
            }
            Err(e) => {
                error!("Cannot create session directory in {:?}: {}", cli.output_dir, e);
                process::exit(1);
            }
        }
    }

    // ─── Browser server ─────────────────────────────────────────────
    if cli.ws {
        let (tx, rx) = bounded::<RenderFrame>(64);
        frame_txs.push(tx);
        let control_tx = input_tx.clone();
        let ws_addr = cli.ws_addr.clone();
        let ws_fps = cli.ws_fps;
        let page = cli.viz.clone();
        handles.push(spawn("ws-server", move || {
            ws_server::WsServer::new(rx, control_tx, ws_addr, ws_fps, page).run();
        }));
    }

    // ─── Coordinator ────────────────────────────────────────────────
    handles.push(spawn("coordinator", move || {
        coord.run(input_rx, &frame_txs);
    }));

    // ─── Control source ─────────────────────────────────────────────
    if let Some(path) = &cli.script {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Cannot open script {:?}: {}", path, e);
                process::exit(1);
            }
        };
        let reader = match ScriptReader::open(BufReader::new(file)) {
            Ok(r) => r,
            Err(e) => {
                error!("Invalid script {:?}: {}", path, e);
                process::exit(1);
            }
        };
        let tx = input_tx.clone();
        handles.push(spawn("script", move || {
            reader.replay(&tx);
        }));
    } else if cli.demo != "none" {
        info!("Starting simulator...");
        let tx = input_tx.clone();
        let defaults = config.defaults;
        let rate = cli.rate_hz;
        let demo = cli.demo.clone();
        handles.push(spawn("simulator", move || {
            simulator::Simulator::new(tx, defaults, rate).run(&demo);
        }));
    }

    // The coordinator exits once every control source is done
    drop(input_tx);

    if cli.ws {
        info!("Serving browser session. Press Ctrl+C to stop.");
    } else {
        info!("Running headless.");
    }
    for h in handles {
        let _ = h.join();
    }
}
