//! Actix Web server exposing the MJPEG stream, status and plugin control.
//!
//! The server runs its own actix system on a dedicated thread so the detection
//! loop never shares a runtime with HTTP workers. Handlers only ever read the
//! publisher's latest snapshot; JPEG encoding and file writes happen on that
//! private snapshot, off the async executor.

use std::{
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock, PoisonError},
    thread,
    time::Duration,
};

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer,
    error::{InternalError, JsonPayloadError},
    http::header,
    middleware::DefaultHeaders,
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    data::{AlertColor, FrameCycleOutput, SystemStatusSnapshot},
    encoding,
    error::PipelineError,
    html,
    pipeline::{
        config::PipelineConfig,
        detection::SharedPipeline,
        telemetry,
        watchdog::CameraState,
    },
    plugins::PluginDescriptor,
};

const BOUNDARY: &str = "frame";
const WAITING_CAPTION: &str = "WAITING FOR CAMERA";
const STOPPED_CAPTION: &str = "PIPELINE STOPPED";

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) shared: SharedPipeline,
    pub(crate) jpeg_quality: u8,
    pub(crate) frame_interval: Duration,
    pub(crate) capture_dir: PathBuf,
    pub(crate) resolution: (u32, u32),
    waiting: OnceLock<Arc<[u8]>>,
    stopped: OnceLock<Arc<[u8]>>,
}

impl ServerState {
    pub(crate) fn new(shared: SharedPipeline, config: &PipelineConfig) -> Self {
        Self::with_settings(
            shared,
            config.jpeg_quality,
            config.frame_interval,
            config.capture_dir.clone(),
            config.resolution(),
        )
    }

    pub(crate) fn with_settings(
        shared: SharedPipeline,
        jpeg_quality: u8,
        frame_interval: Duration,
        capture_dir: PathBuf,
        resolution: (u32, u32),
    ) -> Self {
        Self {
            shared,
            jpeg_quality,
            frame_interval,
            capture_dir,
            resolution,
            waiting: OnceLock::new(),
            stopped: OnceLock::new(),
        }
    }

    /// JPEG for the next stream part: the live frame, or a placeholder while
    /// nothing has been published or after shutdown.
    async fn next_jpeg(&self) -> Option<Arc<[u8]>> {
        if !self.shared.control.is_running() {
            return self.placeholder(&self.stopped, STOPPED_CAPTION);
        }
        let Ok(output) = self.latest() else {
            return self.placeholder(&self.waiting, WAITING_CAPTION);
        };
        let quality = self.jpeg_quality;
        match web::block(move || output.jpeg(quality)).await {
            Ok(Ok(jpeg)) => Some(jpeg),
            Ok(Err(err)) => {
                warn!("failed to encode stream frame: {err:#}");
                None
            }
            Err(err) => {
                warn!("stream encode task failed: {err}");
                None
            }
        }
    }

    fn latest(&self) -> Result<Arc<FrameCycleOutput>, PipelineError> {
        self.shared.publisher.current().ok_or(PipelineError::NotReady)
    }

    fn placeholder(&self, cell: &OnceLock<Arc<[u8]>>, caption: &str) -> Option<Arc<[u8]>> {
        if let Some(jpeg) = cell.get() {
            return Some(jpeg.clone());
        }
        let (width, height) = self.resolution;
        match encoding::encode_jpeg(&encoding::placeholder_frame(width, height, caption), self.jpeg_quality) {
            Ok(jpeg) => Some(cell.get_or_init(|| jpeg.into()).clone()),
            Err(err) => {
                warn!("failed to encode placeholder frame: {err:#}");
                None
            }
        }
    }
}

/// Stops the server from any thread; later calls are no-ops.
#[derive(Clone)]
pub struct StopSignal(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl StopSignal {
    pub fn trigger(&self) {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }
}

/// Handle for the HTTP server thread.
pub struct ApiServer {
    stop: StopSignal,
    handle: Option<thread::JoinHandle<()>>,
}

impl ApiServer {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Block until the server thread exits.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("HTTP server thread panicked");
            }
        }
    }

}

/// Bind `addr` and serve on a dedicated thread.
///
/// Returns once the listener is bound, so bind failures surface to the caller.
pub(crate) fn spawn_api_server(state: ServerState, addr: SocketAddr) -> Result<ApiServer> {
    let state = web::Data::new(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = oneshot::channel::<io::Result<()>>();

    let handle = telemetry::spawn_thread("vision-http-server", move || {
        let served = actix_web::rt::System::new().block_on(async move {
            let bound = HttpServer::new(move || {
                App::new()
                    .wrap(cors_headers())
                    .configure(configure(state.clone()))
            })
            // MJPEG streams never finish on their own.
            .shutdown_timeout(1)
            .bind(addr);
            let server = match bound {
                Ok(server) => server.run(),
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return Ok(());
                }
            };
            let _ = ready_tx.send(Ok(()));

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        });
        if let Err(err) = served {
            error!("HTTP server error: {err}");
        }
    })
    .context("failed to spawn HTTP server thread")?;

    match ready_rx.blocking_recv() {
        Ok(Ok(())) => info!("HTTP server listening on http://{addr}"),
        Ok(Err(err)) => {
            let _ = handle.join();
            return Err(err).with_context(|| format!("failed to bind HTTP server to {addr}"));
        }
        Err(_) => {
            let _ = handle.join();
            return Err(anyhow!("HTTP server thread exited before binding"));
        }
    }

    Ok(ApiServer {
        stop: StopSignal(Arc::new(Mutex::new(Some(shutdown_tx)))),
        handle: Some(handle),
    })
}

pub(crate) fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST"))
}

/// Register state and every route. JSON endpoints are also served under
/// `/api` for older viewers.
pub(crate) fn configure(state: web::Data<ServerState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(state)
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .route("/", web::get().to(index_route))
            .route("/video", web::get().to(stream_handler))
            .route("/video_feed", web::get().to(stream_handler))
            .route("/capture", web::get().to(capture_handler))
            .route("/shutdown", web::post().to(shutdown_handler))
            .route("/metrics", web::get().to(metrics_handler))
            .configure(api_routes)
            .service(web::scope("/api").configure(api_routes));
    }
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/status", web::get().to(status_handler))
        .route("/plugins", web::get().to(plugins_handler))
        .route("/plugins/toggle", web::post().to(toggle_handler))
        .route("/plugins/toggle_all", web::post().to(toggle_all_handler))
        .route("/plugins/{id}", web::get().to(plugin_info_handler));
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let body = json!({ "success": false, "message": format!("Invalid request body: {err}") });
    InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html::INDEX_HTML)
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 96);
    payload.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Stream the latest annotated frame as multipart JPEG until the client leaves.
async fn stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.into_inner();
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(state.frame_interval);
        loop {
            interval.tick().await;
            if let Some(jpeg) = state.next_jpeg().await {
                yield Ok::<Bytes, actix_web::Error>(multipart_part(&jpeg));
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        ))
        .streaming(stream)
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    messages: Vec<&'a str>,
    colors: Vec<AlertColor>,
    status: Option<&'a SystemStatusSnapshot>,
    camera: CameraState,
    pipeline: String,
    running: bool,
    ready: bool,
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    let shared = &state.shared;
    let snapshot = shared.publisher.current();
    let running = shared.control.is_running();
    let pipeline = if running {
        shared.health.pipeline_state()
    } else {
        "stopped".to_string()
    };
    let body = StatusResponse {
        messages: snapshot.as_deref().map(|output| output.messages()).unwrap_or_default(),
        colors: snapshot.as_deref().map(|output| output.colors()).unwrap_or_default(),
        status: snapshot.as_deref().map(|output| output.status()),
        camera: shared.health.camera_state(),
        pipeline,
        running,
        ready: snapshot.is_some(),
    };
    HttpResponse::Ok().json(body)
}

#[derive(Serialize)]
struct PluginsResponse {
    plugins: Vec<PluginDescriptor>,
    total: usize,
    enabled: usize,
}

async fn plugins_handler(state: web::Data<ServerState>) -> HttpResponse {
    let plugins = state.shared.registry.descriptors();
    let enabled = plugins.iter().filter(|plugin| plugin.enabled).count();
    HttpResponse::Ok().json(PluginsResponse {
        total: plugins.len(),
        enabled,
        plugins,
    })
}

async fn plugin_info_handler(state: web::Data<ServerState>, path: web::Path<String>) -> HttpResponse {
    match state.shared.registry.descriptor(&path) {
        Some(plugin) => HttpResponse::Ok().json(json!({ "success": true, "plugin": plugin })),
        None => plugin_not_found(),
    }
}

fn plugin_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "success": false, "message": "Plugin not found" }))
}

#[derive(Deserialize)]
struct ToggleRequest {
    #[serde(default, alias = "plugin_name")]
    plugin_id: Option<String>,
}

async fn toggle_handler(state: web::Data<ServerState>, body: web::Json<ToggleRequest>) -> HttpResponse {
    let Some(id) = body.into_inner().plugin_id.filter(|id| !id.trim().is_empty()) else {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "message": "Plugin name required" }));
    };
    match state.shared.registry.toggle(&id) {
        Ok(enabled) => {
            info!(plugin = %id, enabled, "plugin toggled");
            let message = if enabled {
                "Plugin enabled successfully"
            } else {
                "Plugin disabled successfully"
            };
            HttpResponse::Ok().json(json!({ "success": true, "enabled": enabled, "message": message }))
        }
        Err(err) => {
            warn!("toggle rejected: {err}");
            plugin_not_found()
        }
    }
}

#[derive(Deserialize)]
struct ToggleAllRequest {
    #[serde(default)]
    enable: bool,
}

async fn toggle_all_handler(
    state: web::Data<ServerState>,
    body: web::Json<ToggleAllRequest>,
) -> HttpResponse {
    let enable = body.enable;
    let count = state.shared.registry.set_all(enable);
    info!(enable, count, "toggled all plugins");
    HttpResponse::Ok().json(json!({ "success": count > 0, "count": count, "enabled": enable }))
}

/// Stop the detection loop. The loop releases the camera and detectors at its
/// next cycle boundary; the server keeps answering.
async fn shutdown_handler(state: web::Data<ServerState>) -> HttpResponse {
    if state.shared.control.request_shutdown() {
        info!("shutdown requested over HTTP");
    }
    HttpResponse::Ok().json(json!({ "success": true }))
}

async fn capture_handler(state: web::Data<ServerState>) -> HttpResponse {
    let output = match state.latest() {
        Ok(output) => output,
        Err(err) => {
            debug!("screenshot skipped: {err}");
            return HttpResponse::Ok().json(json!({ "success": false }));
        }
    };
    let dir = state.capture_dir.clone();
    let quality = state.jpeg_quality;
    match web::block(move || encoding::save_capture(&output, &dir, quality)).await {
        Ok(Ok(filename)) => {
            info!(%filename, "screenshot saved");
            HttpResponse::Ok().json(json!({ "success": true, "filename": filename }))
        }
        Ok(Err(err)) => {
            warn!("screenshot capture failed: {err:#}");
            HttpResponse::Ok().json(json!({ "success": false }))
        }
        Err(err) => {
            warn!("screenshot task failed: {err}");
            HttpResponse::Ok().json(json!({ "success": false }))
        }
    }
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::render_metrics() {
        Some(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}
