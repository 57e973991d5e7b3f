//! HTTP query and streaming API.
//!
//! A small server on `std::net::TcpListener`, run on a background thread
//! with a nonblocking accept loop and an atomic shutdown flag. Routes:
//!
//! - `GET /health` — liveness probe
//! - `GET /get-current-number` (alias `/get-score`) — the published number,
//!   `-1` when none is held; always 200
//! - `GET /video` — MJPEG multipart stream, one thread per consumer
//!
//! Query responses read either the in-process [`SharedNumber`] cell or the
//! mirror file written by a separate producer process. Handler errors are
//! logged and answered with JSON error bodies; nothing propagates out of a
//! connection.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::state::SharedNumber;
use crate::stream::{video_content_type, FrameFeed, MjpegWriter};

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8650".to_string(),
        }
    }
}

/// Where query responses get the current number from.
#[derive(Clone, Debug)]
pub enum NumberSource {
    /// In-process atomic cell, producer loop in the same process.
    Shared(SharedNumber),
    /// Mirror file written by a separate producer process.
    Mirror(PathBuf),
}

impl NumberSource {
    /// Current number with `-1` encoding "none". Never fails; any mirror
    /// read problem reads as no number.
    pub fn read(&self) -> i64 {
        match self {
            NumberSource::Shared(shared) => shared.sentinel(),
            NumberSource::Mirror(path) => read_mirror_file(path),
        }
    }
}

/// Read the mirror file contract: missing, empty, or unparsable ⇒ `-1`.
/// The producer only ever writes non-negative values, so anything negative
/// in the file is out of contract and reads as `-1` too.
pub fn read_mirror_file(path: &Path) -> i64 {
    match std::fs::read_to_string(path) {
        Ok(content) => match content.trim().parse::<i64>() {
            Ok(value) if value >= 0 => value,
            _ => -1,
        },
        Err(_) => -1,
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    numbers: NumberSource,
    video: Option<FrameFeed>,
}

#[derive(Serialize)]
struct CurrentNumberResponse {
    current_number: i64,
}

impl ApiServer {
    /// `video` is the frame feed for `/video`; pass `None` for query-only
    /// deployments (the route then answers 404).
    pub fn new(cfg: ApiConfig, numbers: NumberSource, video: Option<FrameFeed>) -> Self {
        Self {
            cfg,
            numbers,
            video,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let numbers = self.numbers;
        let video = self.video;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, numbers, video, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    numbers: NumberSource,
    video: Option<FrameFeed>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &numbers, &video, &shutdown) {
                    log::warn!("api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    numbers: &NumberSource,
    video: &Option<FrameFeed>,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/health" => {
            write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        }
        "/get-current-number" | "/get-score" => {
            let payload = serde_json::to_vec(&CurrentNumberResponse {
                current_number: numbers.read(),
            })?;
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        "/video" => match video {
            Some(feed) => {
                let feed = feed.clone();
                let shutdown = shutdown.clone();
                // One thread per stream consumer; it ends on its own when
                // the consumer disconnects or the server shuts down.
                std::thread::spawn(move || stream_video(stream, feed, shutdown));
            }
            None => {
                write_json_response(&mut stream, 404, r#"{"error":"video_unavailable"}"#)?;
            }
        },
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
        }
    }
    Ok(())
}

/// Deliver frames to one `/video` consumer until it disconnects.
fn stream_video(mut stream: TcpStream, feed: FrameFeed, shutdown: Arc<AtomicBool>) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-store\r\n\r\n",
        video_content_type()
    );
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }

    let mut writer = MjpegWriter::new(stream);
    let mut last_seq = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        match feed.wait_next(last_seq, Duration::from_secs(1)) {
            Some((seq, jpeg)) => {
                last_seq = seq;
                if writer.write_part(&jpeg).is_err() {
                    log::debug!("video consumer disconnected");
                    return;
                }
            }
            // No new frame inside the timeout; loop to re-check shutdown.
            None => continue,
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        _headers: headers,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    _headers: HashMap<String, String>,
}
