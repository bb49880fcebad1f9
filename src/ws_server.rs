use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use sha1_smol::Sha1;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use url::form_urlencoded;

/// Combined HTTP + WebSocket server for the browser front end.
///
/// - `GET /` or `GET /index.html` → serves the page, if one was given
/// - `GET /control?amplitude=2&noise=off&butterworth=on` → control events
/// - `GET /reset` → restore defaults
/// - WebSocket upgrade → streams `CompactFrame` JSON at a throttled rate
///
/// Single port. Every browser drives the same coordinator session, so all
/// viewers see the same noise realization.
pub struct WsServer {
    frame_rx: Receiver<RenderFrame>,
    control_tx: Sender<ControlEvent>,
    addr: String,
    target_fps: u32,
    page_path: Option<PathBuf>,
}

/// A client that cannot take a frame within this window is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_millis(250);

struct WsClient {
    stream: TcpStream,
    alive: bool,
}

impl WsClient {
    fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        if let Err(e) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
            warn!("Could not set client write timeout: {}", e);
        }
        Self {
            stream,
            alive: true,
        }
    }

    fn send_text(&mut self, text: &str) -> bool {
        match self.stream.write_all(&encode_text_frame(text)) {
            Ok(()) => true,
            Err(_) => {
                self.alive = false;
                false
            }
        }
    }
}

type ClientList = Arc<Mutex<Vec<WsClient>>>;

fn lock_clients(clients: &ClientList) -> MutexGuard<'_, Vec<WsClient>> {
    clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Server-to-client text frame (unmasked).
fn encode_text_frame(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let len = payload.len();
    let mut frame = Vec::with_capacity(10 + len);
    frame.push(0x81); // FIN + text opcode
    if len < 126 {
        frame.push(len as u8);
    } else if len < 65536 {
        frame.push(126);
        frame.push((len >> 8) as u8);
        frame.push((len & 0xFF) as u8);
    } else {
        frame.push(127);
        for i in (0..8).rev() {
            frame.push(((len >> (i * 8)) & 0xFF) as u8);
        }
    }
    frame.extend_from_slice(payload);
    frame
}

/// Parsed HTTP request, enough to decide WS vs HTTP.
struct HttpRequest {
    path: String,
    is_upgrade: bool,
    ws_key: Option<String>,
}

fn parse_request(stream: &mut TcpStream) -> Result<HttpRequest, String> {
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| e.to_string())?);
    let mut path = String::from("/");
    let mut is_upgrade = false;
    let mut ws_key = None;
    let mut first = true;

    loop {
        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| e.to_string())?;
        let trimmed = line.trim().to_string();
        if trimmed.is_empty() {
            break;
        }
        if first {
            // "GET /path HTTP/1.1"
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 2 {
                path = parts[1].to_string();
            }
            first = false;
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("upgrade:") && lower.contains("websocket") {
            is_upgrade = true;
        }
        if lower.starts_with("sec-websocket-key:") {
            ws_key = Some(trimmed[18..].trim().to_string());
        }
    }
    Ok(HttpRequest {
        path,
        is_upgrade,
        ws_key,
    })
}

fn accept_key(key: &str) -> String {
    let magic = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut hasher = Sha1::new();
    hasher.update(format!("{}{}", key, magic).as_bytes());
    base64_encode(&hasher.digest().bytes())
}

fn ws_handshake(stream: &mut TcpStream, key: &str) -> Result<(), String> {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    );
    stream
        .write_all(response.as_bytes())
        .map_err(|e| e.to_string())
}

fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let header = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Cache-Control: no-cache\r\n\
         \r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
}

fn base64_encode(data: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut result = String::new();
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        result.push(CHARS[((triple >> 18) & 0x3F) as usize] as char);
        result.push(CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            result.push(CHARS[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(CHARS[(triple & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
    }
    result
}

// ─── Routing ────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Route {
    Page,
    Control(Vec<ControlEvent>),
    BadRequest(String),
    NotFound,
}

fn route(target: &str) -> Route {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };
    match path {
        "/" | "/index.html" => Route::Page,
        "/reset" => Route::Control(vec![ControlEvent::Reset]),
        "/control" => match parse_control_query(query) {
            Ok(events) => Route::Control(events),
            Err(e) => Route::BadRequest(e),
        },
        _ => Route::NotFound,
    }
}

/// Turn `/control` query parameters into control events, in query order.
/// Keys and values are form-decoded (`%2D`, `+`). Slider values are clamped
/// to their UI range; checkboxes accept `on/off`, `true/false` and `1/0`.
fn parse_control_query(query: &str) -> Result<Vec<ControlEvent>, String> {
    let mut events = Vec::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("missing value for '{}'", key));
        }

        let event = match key.as_ref() {
            "amplitude" => ControlEvent::SetAmplitude(slider(AMPLITUDE_RANGE, value)?),
            "frequency" => ControlEvent::SetFrequency(slider(FREQUENCY_RANGE, value)?),
            "phase" => ControlEvent::SetPhase(slider(PHASE_RANGE, value)?),
            "noise_mean" => ControlEvent::SetNoiseMean(slider(NOISE_MEAN_RANGE, value)?),
            "noise_variance" => ControlEvent::SetNoiseVariance(slider(NOISE_VARIANCE_RANGE, value)?),
            "noise" => ControlEvent::ShowNoise(checkbox(&key, value)?),
            "butterworth" => ControlEvent::EnableFilter {
                kind: FilterKind::Butterworth,
                enabled: checkbox(&key, value)?,
            },
            "moving_average" => ControlEvent::EnableFilter {
                kind: FilterKind::MovingAverage,
                enabled: checkbox(&key, value)?,
            },
            _ => return Err(format!("unknown control '{}'", key)),
        };
        events.push(event);
    }
    if events.is_empty() {
        return Err("no controls given".into());
    }
    Ok(events)
}

fn slider(range: ParameterRange, value: &str) -> Result<f64, String> {
    let v: f64 = value
        .parse()
        .map_err(|_| format!("{}: '{}' is not a number", range.name, value))?;
    if !v.is_finite() {
        return Err(format!("{}: '{}' is not finite", range.name, value));
    }
    Ok(range.clamp(v))
}

fn checkbox(name: &str, value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("{}: expected on/off, got '{}'", name, value)),
    }
}

impl WsServer {
    pub fn new(
        frame_rx: Receiver<RenderFrame>,
        control_tx: Sender<ControlEvent>,
        addr: String,
        target_fps: u32,
        page_path: Option<PathBuf>,
    ) -> Self {
        Self {
            frame_rx,
            control_tx,
            addr,
            target_fps,
            page_path,
        }
    }

    /// Accept connections on a background thread and broadcast frames on
    /// this one until the frame stream ends.
    pub fn run(self) {
        let clients: ClientList = Arc::new(Mutex::new(Vec::new()));

        let page = match &self.page_path {
            Some(path) => match fs::read(path) {
                Ok(data) => {
                    info!("Loaded page: {} ({} bytes)", path.display(), data.len());
                    Arc::new(data)
                }
                Err(e) => {
                    warn!("Could not load {}: {}, page serving disabled", path.display(), e);
                    Arc::new(Vec::new())
                }
            },
            None => Arc::new(Vec::new()),
        };

        let accept_clients = clients.clone();
        let addr = self.addr.clone();
        let control_tx = self.control_tx.clone();
        let spawned = thread::Builder::new().name("ws-accept".into()).spawn(move || {
            let listener = match TcpListener::bind(&addr) {
                Ok(l) => l,
                Err(e) => {
                    error!("Server failed to bind {}: {}", addr, e);
                    return;
                }
            };
            info!("Server listening on http://{}", addr);

            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let page = page.clone();
                        let cl = accept_clients.clone();
                        let tx = control_tx.clone();
                        // HTTP connections close immediately; WS connections
                        // move to the client list
                        thread::spawn(move || handle_connection(stream, &page, &cl, &tx));
                    }
                    Err(e) => warn!("TCP accept error: {}", e),
                }
            }
        });
        if let Err(e) = spawned {
            error!("Failed to spawn ws-accept thread: {}", e);
            return;
        }

        self.broadcast(&clients);
    }

    /// Send at most `target_fps` frames per second. Frames arriving inside
    /// the interval replace the pending one, which goes out when the
    /// interval elapses.
    fn broadcast(&self, clients: &ClientList) {
        let frame_interval = Duration::from_micros(1_000_000 / self.target_fps.max(1) as u64);
        let mut last_send = Instant::now()
            .checked_sub(frame_interval)
            .unwrap_or_else(Instant::now);
        let mut pending: Option<RenderFrame> = None;

        loop {
            let wait = frame_interval.saturating_sub(last_send.elapsed());
            let received = if pending.is_some() {
                self.frame_rx.recv_timeout(wait)
            } else {
                self.frame_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
            };
            match received {
                Ok(frame) => pending = Some(frame),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_send.elapsed() < frame_interval {
                continue;
            }
            let Some(frame) = pending.take() else {
                continue;
            };
            last_send = Instant::now();

            let json = match serde_json::to_string(&CompactFrame::from(&frame)) {
                Ok(j) => j,
                Err(e) => {
                    warn!("JSON serialize error: {}", e);
                    continue;
                }
            };

            let mut cl = lock_clients(clients);
            for client in cl.iter_mut() {
                client.send_text(&json);
            }
            let before = cl.len();
            cl.retain(|c| c.alive);
            if cl.len() < before {
                info!("Dropped {} stalled or closed WebSocket client(s)", before - cl.len());
            }
        }
        info!("Frame stream ended, server broadcast stopped");
    }
}

fn handle_connection(mut stream: TcpStream, page: &[u8], clients: &ClientList, control_tx: &Sender<ControlEvent>) {
    let req = match parse_request(&mut stream) {
        Ok(req) => req,
        Err(e) => {
            warn!("Request parse error: {}", e);
            return;
        }
    };

    if req.is_upgrade {
        if let Some(key) = req.ws_key {
            match ws_handshake(&mut stream, &key) {
                Ok(()) => {
                    info!("WebSocket client connected");
                    lock_clients(clients).push(WsClient::new(stream));
                }
                Err(e) => warn!("WS handshake failed: {}", e),
            }
        }
        return;
    }

    match route(&req.path) {
        Route::Page if !page.is_empty() => respond(&mut stream, "200 OK", "text/html; charset=utf-8", page),
        Route::Control(events) => {
            let count = events.len();
            for event in events {
                debug!("HTTP control: {}", event);
                if control_tx.send(event).is_err() {
                    respond(&mut stream, "503 Service Unavailable", "text/plain", b"session closed");
                    return;
                }
            }
            let body = format!("{{\"accepted\":{}}}", count);
            respond(&mut stream, "200 OK", "application/json", body.as_bytes());
        }
        Route::BadRequest(reason) => {
            warn!("Rejected control request {}: {}", req.path, reason);
            respond(&mut stream, "400 Bad Request", "text/plain", reason.as_bytes());
        }
        Route::Page | Route::NotFound => respond(
            &mut stream,
            "404 Not Found",
            "text/html",
            b"<h1>404</h1><p>Try <a href=\"/control?amplitude=2\">/control</a> or /reset</p>",
        ),
    }
}
