//! # HTTP Surface
//!
//! REST endpoints over the attached backend (§4.9). Every handler borrows
//! the backend `Arc` out of the holder for the duration of one request;
//! nothing here holds the holder's lock across an `.await` on the backend
//! itself, so a slow operation on one connection never blocks an unrelated
//! status poll on another.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use emu_core::address::Address;
use emu_core::breakpoint::BreakpointKind;
use emu_core::capture::CaptureRequest;
use emu_core::capture_pipeline::compare_golden;
use emu_core::error::EmuError;
use emu_core::holder::BackendKind;
use emu_core::launcher::{DisplayMode, LaunchConfig};
use emu_core::status::BackendStatus;

use crate::state::SharedState;

/// Wraps `EmuError` so it can be returned directly from a handler; the wire
/// shape is `{"error": {"kind": "...", "message": "..."}}` with a status
/// code chosen from `EmuError::kind`.
pub struct ApiError(EmuError);

impl From<EmuError> for ApiError {
    fn from(e: EmuError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EmuError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            EmuError::Protocol(_) => StatusCode::BAD_GATEWAY,
            EmuError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EmuError::NotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            EmuError::Argument(_) => StatusCode::BAD_REQUEST,
            EmuError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/states", axum::routing::get(list_states))
        .route("/api/launch/defaults", axum::routing::get(launch_defaults))
        .route(
            "/api/launch",
            axum::routing::post(start_launch).delete(stop_launch),
        )
        .route(
            "/api/backend",
            axum::routing::get(get_backend)
                .post(attach_backend)
                .delete(detach_backend),
        )
        .route("/api/registers", axum::routing::get(read_registers))
        .route("/api/memory", axum::routing::post(write_memory))
        .route("/api/memory/:address/:size", axum::routing::get(read_memory))
        .route("/api/keys", axum::routing::post(send_keys))
        .route("/api/screenshot", axum::routing::get(screenshot))
        .route(
            "/api/snapshots",
            axum::routing::get(list_snapshots).post(save_snapshot),
        )
        .route("/api/snapshots/:name", axum::routing::put(load_snapshot))
        .route(
            "/api/breakpoints",
            axum::routing::get(list_breakpoints).post(set_breakpoint),
        )
        .route("/api/breakpoints/:id", axum::routing::delete(remove_breakpoint))
        .route("/api/pause", axum::routing::post(pause))
        .route("/api/resume", axum::routing::post(resume))
        .route("/api/step", axum::routing::post(step))
        .route(
            "/api/captures",
            axum::routing::get(list_captures).post(run_capture_and_store),
        )
        .route("/api/golden/generate", axum::routing::post(golden_generate))
        .route("/api/golden/compare", axum::routing::post(golden_compare))
}

async fn health() -> &'static str {
    "OK"
}

/// The finite set of values `BackendStatusReport.status` can take, for a UI
/// that wants to render a legend without hardcoding the enum itself.
async fn list_states() -> Json<Vec<BackendStatus>> {
    Json(vec![
        BackendStatus::Disconnected,
        BackendStatus::Launching,
        BackendStatus::Running,
        BackendStatus::Paused,
        BackendStatus::Error,
    ])
}

#[derive(Debug, serde::Serialize)]
struct LaunchDefaults {
    binary: String,
    drive_image: String,
    headless: bool,
    remote_debug_port: u16,
    machine_control_socket: String,
    memory_kb: u32,
    run_timeout_ms: u64,
}

async fn launch_defaults(State(state): State<SharedState>) -> Json<LaunchDefaults> {
    Json(LaunchDefaults {
        binary: state.config.emulator_binary.clone(),
        drive_image: String::new(),
        headless: true,
        remote_debug_port: state.config.remote_debug_port,
        machine_control_socket: state.config.machine_control_socket.clone(),
        memory_kb: 16384,
        run_timeout_ms: 30_000,
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum AttachRequest {
    Qemu {
        binary: String,
        drive_image: String,
        #[serde(default)]
        shared_image: Option<String>,
        #[serde(default)]
        game_image: Option<String>,
        headless: bool,
        remote_debug_port: u16,
        machine_control_socket: String,
    },
    Session {
        binary: String,
        drive_image: String,
        memory_kb: u32,
        run_timeout_ms: u64,
    },
}

fn build_backend_kind(request: AttachRequest) -> BackendKind {
    match request {
        AttachRequest::Qemu {
            binary,
            drive_image,
            shared_image,
            game_image,
            headless,
            remote_debug_port,
            machine_control_socket,
        } => BackendKind::Qemu(LaunchConfig {
            binary,
            hard_disk_image: drive_image,
            shared_image,
            game_image,
            display: if headless {
                DisplayMode::Headless
            } else {
                DisplayMode::Sdl
            },
            audio_sb16: false,
            remote_debug_port: Some(remote_debug_port),
            machine_control_socket: Some(machine_control_socket),
            monitor_on_stdio: false,
            record_path: None,
            replay_path: None,
            initial_snapshot: None,
            extra_args: vec![],
        }),
        AttachRequest::Session {
            binary,
            drive_image,
            memory_kb,
            run_timeout_ms,
        } => BackendKind::Session(emu_core::backend::session::SessionBackendConfig {
            binary,
            drive_image,
            memory_kb,
            run_timeout_ms,
        }),
    }
}

async fn get_backend(State(state): State<SharedState>) -> ApiResult<emu_core::status::BackendStatusReport> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.status().await))
}

/// Selects a backend implementation and attaches it to the holder, without
/// launching its process — see `POST /api/launch` for that. Replaces
/// whatever was previously attached; callers that want a clean handoff
/// should `DELETE /api/backend` first.
async fn attach_backend(
    State(state): State<SharedState>,
    Json(request): Json<AttachRequest>,
) -> ApiResult<emu_core::status::BackendStatusReport> {
    let backend = emu_core::holder::build_backend(build_backend_kind(request));
    state.holder.attach(backend.clone()).await;
    Ok(Json(backend.status().await))
}

async fn detach_backend(State(state): State<SharedState>) -> ApiResult<serde_json::Value> {
    if let Some(backend) = state.holder.detach().await {
        backend.shutdown().await?;
    }
    Ok(Json(json!({"detached": true})))
}

/// Launches the process for the currently attached backend (`POST
/// /api/backend` must have run first).
async fn start_launch(State(state): State<SharedState>) -> ApiResult<emu_core::status::BackendStatusReport> {
    let backend = state.holder.get().await?;
    backend.launch().await?;
    Ok(Json(backend.status().await))
}

/// Terminates the attached backend's process without detaching it, so a
/// later `POST /api/launch` can restart the same configuration.
async fn stop_launch(State(state): State<SharedState>) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.shutdown().await?;
    Ok(Json(json!({"stopped": true})))
}

async fn read_registers(
    State(state): State<SharedState>,
) -> ApiResult<emu_core::registers::RegisterFile> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.read_registers().await?))
}

#[derive(Debug, Deserialize)]
struct MemoryReadFormat {
    #[serde(default)]
    format: Option<String>,
}

/// `GET /api/memory/{address}/{size}`: returns base64 JSON by default, or a
/// raw `application/octet-stream` body with `?format=raw` (testable scenario
/// S1 needs the latter for a byte-exact framebuffer read).
async fn read_memory(
    State(state): State<SharedState>,
    Path((address, size)): Path<(String, usize)>,
    Query(format): Query<MemoryReadFormat>,
) -> Result<Response, ApiError> {
    let backend = state.holder.get().await?;
    let parsed = Address::parse(&address)?;
    let bytes = backend.read_memory(parsed, size).await?;
    if format.format.as_deref() == Some("raw") {
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response())
    } else {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(Json(json!({"bytes": encoded})).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct MemoryWriteBody {
    address: String,
    bytes_base64: String,
}

async fn write_memory(
    State(state): State<SharedState>,
    Json(body): Json<MemoryWriteBody>,
) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    let address = Address::parse(&body.address)?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(body.bytes_base64)
        .map_err(|e| EmuError::argument(format!("bad base64 payload: {e}")))?;
    backend.write_memory(address, &data).await?;
    Ok(Json(json!({"written": data.len()})))
}

#[derive(Debug, Deserialize)]
struct KeysBody {
    keys: Vec<String>,
    #[serde(default)]
    delay_ms: Option<u64>,
}

async fn send_keys(
    State(state): State<SharedState>,
    Json(body): Json<KeysBody>,
) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.send_keys_sequence(&body.keys, body.delay_ms).await?;
    Ok(Json(json!({"sent": body.keys.len()})))
}

async fn screenshot(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let backend = state.holder.get().await?;
    let (bytes, format) = backend.screenshot().await?;
    Ok(([(axum::http::header::CONTENT_TYPE, format.content_type())], bytes).into_response())
}

#[derive(Debug, Deserialize)]
struct SnapshotSaveBody {
    name: String,
}

async fn save_snapshot(
    State(state): State<SharedState>,
    Json(body): Json<SnapshotSaveBody>,
) -> ApiResult<emu_core::snapshot::SnapshotHandle> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.save_snapshot(&body.name).await?))
}

async fn load_snapshot(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.load_snapshot(&name).await?;
    Ok(Json(json!({"loaded": name})))
}

async fn list_snapshots(
    State(state): State<SharedState>,
) -> ApiResult<Vec<emu_core::snapshot::SnapshotHandle>> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.list_snapshots().await?))
}

#[derive(Debug, Deserialize)]
struct BreakpointBody {
    kind: BreakpointKind,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    interrupt_number: Option<u8>,
    #[serde(default)]
    interrupt_sub_function: Option<u8>,
}

async fn set_breakpoint(
    State(state): State<SharedState>,
    Json(body): Json<BreakpointBody>,
) -> ApiResult<emu_core::breakpoint::Breakpoint> {
    let backend = state.holder.get().await?;
    let address = body.address.map(|a| Address::parse(&a)).transpose()?;
    let breakpoint = backend
        .set_breakpoint(body.kind, address, body.interrupt_number, body.interrupt_sub_function)
        .await?;
    Ok(Json(breakpoint))
}

async fn remove_breakpoint(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.remove_breakpoint(id).await?;
    Ok(Json(json!({"removed": id})))
}

async fn list_breakpoints(
    State(state): State<SharedState>,
) -> ApiResult<Vec<emu_core::breakpoint::Breakpoint>> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.list_breakpoints().await?))
}

async fn pause(State(state): State<SharedState>) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.pause().await?;
    Ok(Json(json!({"paused": true})))
}

async fn resume(State(state): State<SharedState>) -> ApiResult<serde_json::Value> {
    let backend = state.holder.get().await?;
    backend.resume().await?;
    Ok(Json(json!({"resumed": true})))
}

async fn step(State(state): State<SharedState>) -> ApiResult<emu_core::registers::RegisterFile> {
    let backend = state.holder.get().await?;
    Ok(Json(backend.step().await?))
}

/// Runs a capture and appends it to the in-memory capture history, so a
/// later `/api/golden/generate` or `/api/golden/compare` call can reference
/// it by prefix without the caller having to resend the bytes.
async fn run_capture_and_store(
    State(state): State<SharedState>,
    Json(request): Json<CaptureRequest>,
) -> ApiResult<emu_core::capture::CaptureResult> {
    let backend = state.holder.get().await?;
    let result = backend.capture(request).await?;
    state.captures.lock().await.push(result.clone());
    Ok(Json(result))
}

async fn list_captures(State(state): State<SharedState>) -> ApiResult<Vec<emu_core::capture::CaptureResult>> {
    Ok(Json(state.captures.lock().await.clone()))
}

async fn most_recent_capture(state: &SharedState, prefix: &str) -> Result<emu_core::capture::CaptureResult, EmuError> {
    state
        .captures
        .lock()
        .await
        .iter()
        .rev()
        .find(|c| c.prefix == prefix)
        .cloned()
        .ok_or_else(|| EmuError::argument(format!("no stored capture with prefix {prefix}")))
}

#[derive(Debug, Deserialize)]
struct GoldenGenerateBody {
    prefix: String,
}

/// Records the most recent capture with the given prefix as that prefix's
/// golden reference (§4.8).
async fn golden_generate(
    State(state): State<SharedState>,
    Json(body): Json<GoldenGenerateBody>,
) -> ApiResult<serde_json::Value> {
    let capture = most_recent_capture(&state, &body.prefix).await?;
    state.goldens.lock().await.insert(body.prefix.clone(), capture);
    Ok(Json(json!({"golden_generated": body.prefix})))
}

#[derive(Debug, Deserialize)]
struct GoldenCompareBody {
    prefix: String,
    /// `"framebuffer"`, `"screenshot"`, or an extra-range filename.
    artifact: String,
}

fn artifact_bytes<'a>(capture: &'a emu_core::capture::CaptureResult, artifact: &str) -> Option<&'a [u8]> {
    match artifact {
        "framebuffer" => capture.framebuffer.as_deref(),
        "screenshot" => capture.screenshot.as_deref(),
        other => capture.extra.get(other).map(|v| v.as_slice()),
    }
}

/// Compares the named artifact of the most recent capture with the given
/// prefix against that prefix's recorded golden reference.
async fn golden_compare(
    State(state): State<SharedState>,
    Json(body): Json<GoldenCompareBody>,
) -> ApiResult<emu_core::capture::GoldenComparison> {
    let actual = most_recent_capture(&state, &body.prefix).await?;
    let golden = state
        .goldens
        .lock()
        .await
        .get(&body.prefix)
        .cloned()
        .ok_or_else(|| EmuError::argument(format!("no golden recorded for prefix {}", body.prefix)))?;
    let actual_bytes = artifact_bytes(&actual, &body.artifact)
        .ok_or_else(|| EmuError::argument(format!("capture has no artifact {}", body.artifact)))?;
    let golden_bytes = artifact_bytes(&golden, &body.artifact)
        .ok_or_else(|| EmuError::argument(format!("golden has no artifact {}", body.artifact)))?;
    Ok(Json(compare_golden(&body.artifact, actual_bytes, golden_bytes)))
}
