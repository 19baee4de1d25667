//! Viewer-facing HTTP/1.1 server.
//!
//! Routes (GET only):
//! - `/health`              -> `{"status":"ok"}`
//! - `/api/cameras`         -> JSON list of active cameras
//! - `/video_feed/{id}`     -> `multipart/x-mixed-replace; boundary=frame` JPEG stream
//!
//! Each connection gets its own thread; a video feed additionally runs its session on a
//! dedicated thread behind a `FrameStream`. Unknown cameras get a plain-text 404 before any
//! streaming starts.

use anyhow::{anyhow, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::pipeline::{FrameSink, MultipartWriter, PipelineContext, StreamSession, CONTENT_TYPE};
use crate::storage::CameraDirectory;

const MAX_REQUEST_BYTES: usize = 8192;
const VIEWER_WRITE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
        }
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

#[derive(Clone)]
struct ApiState {
    cameras: Arc<dyn CameraDirectory>,
    pipeline: Arc<PipelineContext>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: ApiState,
}

impl ApiServer {
    pub fn new(
        cfg: ApiConfig,
        cameras: Arc<dyn CameraDirectory>,
        pipeline: Arc<PipelineContext>,
    ) -> Self {
        Self {
            cfg,
            state: ApiState { cameras, pipeline },
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
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("viewer api stopped: {}", err);
            }
        });
        log::info!("viewer api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: ApiState, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let state = state.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        log::warn!("viewer api request failed: {:#}", err);
                    }
                });
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

fn handle_connection(mut stream: TcpStream, state: &ApiState) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match Route::parse(&request.path) {
        Route::Health => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        Route::Cameras => match state.cameras.camera_feeds() {
            Ok(feeds) => {
                let payload = serde_json::to_vec(&feeds)?;
                write_response(&mut stream, 200, "application/json", &payload)
            }
            Err(err) => {
                log::error!("camera listing failed: {:#}", err);
                let body = serde_json::json!({ "error": err.to_string() }).to_string();
                write_json_response(&mut stream, 500, &body)
            }
        },
        Route::VideoFeed(camera_id) => stream_camera(stream, state, camera_id),
        Route::NotFound => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn stream_camera(mut stream: TcpStream, state: &ApiState, camera_id: Option<i64>) -> Result<()> {
    let camera = match camera_id {
        Some(id) => match state.cameras.camera_by_id(id) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("camera lookup failed for {}: {:#}", id, err);
                write_response(&mut stream, 500, "text/plain", b"Camera lookup failed")?;
                return Ok(());
            }
        },
        None => None,
    };
    let Some(camera) = camera else {
        write_response(&mut stream, 404, "text/plain", b"Camera not found")?;
        return Ok(());
    };

    stream.set_write_timeout(Some(VIEWER_WRITE_TIMEOUT))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-store\r\n\
         Access-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        CONTENT_TYPE
    );
    stream.write_all(header.as_bytes())?;

    log::info!("viewer connected camera={}", camera.id);
    let mut frames = StreamSession::new(state.pipeline.clone(), camera).spawn();
    let mut writer = MultipartWriter::new(stream);
    for jpeg in frames.by_ref() {
        if let Err(err) = writer.send(&jpeg) {
            log::info!("viewer disconnected camera={}: {}", camera_id.unwrap_or_default(), err);
            break;
        }
    }
    let outcome = frames.finish()?;
    log::debug!(
        "viewer stream camera={} finished {:?} after {} parts",
        outcome.camera_id,
        outcome.state,
        writer.parts_written()
    );
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Health,
    Cameras,
    /// `None` when the id segment is not a number.
    VideoFeed(Option<i64>),
    NotFound,
}

impl Route {
    fn parse(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        match path {
            "/health" => return Route::Health,
            "/api/cameras" => return Route::Cameras,
            _ => {}
        }
        match path.strip_prefix("/video_feed/") {
            Some(id) if !id.contains('/') => Route::VideoFeed(id.parse().ok()),
            _ => Route::NotFound,
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
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
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
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n\
         Cache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
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
}
