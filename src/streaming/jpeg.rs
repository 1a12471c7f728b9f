use super::clients::{ClientRegistry, ClientSession};
use crate::core::frame::{monotonic_us, Topic};
use crate::display::DisplayGate;
use crate::pipeline::PipelineHandle;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Multipart boundary token
pub const BOUNDARY: &str = "printcamframe";
/// Frames that receive artificial spacing after a client connects
const WARMUP_FRAMES: u64 = 15;
/// Spacing applied to warmup frames
const WARMUP_DELAY: Duration = Duration::from_millis(30);
/// Poll slice while waiting for a new frame
const WAIT_SLICE: Duration = Duration::from_millis(100);
/// Snapshot younger than this is served without a fresh capture
const SNAPSHOT_FRESH_US: u64 = 2_000_000;
/// Cap on waiting for a fresh camera snapshot
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(3);
/// Cap on waiting for an on-demand display frame
const DISPLAY_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the JPEG streaming router
#[derive(Clone)]
pub struct JpegServerState {
    pub handle: PipelineHandle,
    pub gate: Arc<DisplayGate>,
    pub registry: ClientRegistry,
}

/// Build the JPEG server router: homepage, camera stream/snapshot, display
/// stream/snapshot, 404 for the rest
pub fn router(state: JpegServerState) -> Router {
    Router::new()
        .route("/", get(homepage_handler))
        .route("/stream", get(stream_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/display", get(display_stream_handler))
        .route("/display/snapshot", get(display_snapshot_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::CONNECTION, "close"),
        ],
        "Not Found",
    )
}

/// Self-describing homepage with the live stream embedded and a stats
/// snapshot for quick diagnosis from a browser
async fn homepage_handler(State(state): State<JpegServerState>) -> impl IntoResponse {
    let stats = serde_json::json!({
        "topics": state.handle.topics().stats(),
        "dials": state.handle.dials().snapshot(),
        "clients": state.registry.snapshot(),
    });
    let stats_pretty = serde_json::to_string_pretty(&stats).unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Printcam</title>
    <style>
        :root {{ color-scheme: dark; }}
        body {{ margin: 0; background: #111; color: #ddd; font-family: sans-serif; }}
        img.stream {{ display: block; max-width: 100vw; background: #000; }}
        main {{ padding: 1rem; }}
        code {{ color: #8fc; }}
        pre {{ background: #000; padding: 0.5rem; overflow-x: auto; }}
    </style>
</head>
<body>
    <img class="stream" src="/stream" alt="Camera stream">
    <main>
        <h1>printcam</h1>
        <ul>
            <li><code>GET /stream</code> — multipart JPEG camera stream</li>
            <li><code>GET /snapshot</code> — single camera JPEG</li>
            <li><code>GET /display</code> — multipart JPEG screen stream</li>
            <li><code>GET /display/snapshot</code> — single screen JPEG</li>
        </ul>
        <pre>{stats_pretty}</pre>
    </main>
</body>
</html>
"#,
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONNECTION, "close")
        .body(axum::body::Body::from(html))
        .unwrap()
}

async fn stream_handler(
    State(state): State<JpegServerState>,
    Extension(session): Extension<Arc<ClientSession>>,
) -> Response {
    info!("New camera stream client {}", session.peer());
    multipart_response(state, session, Topic::CameraJpeg, "stream")
}

async fn display_stream_handler(
    State(state): State<JpegServerState>,
    Extension(session): Extension<Arc<ClientSession>>,
) -> Response {
    info!("New display stream client {}", session.peer());
    multipart_response(state, session, Topic::DisplayJpeg, "display")
}

/// Long-lived multipart/x-mixed-replace response for one topic.
///
/// The generator owns the consumer registration (camera topics) or the
/// display watch (display topic), waits on the slot signal, suppresses
/// frames the client has already seen and applies warmup pacing to the
/// first frames. Boundary header, payload and trailing CRLF go out as one
/// write so the kernel can send full segments.
fn multipart_response(
    state: JpegServerState,
    session: Arc<ClientSession>,
    topic: Topic,
    kind: &'static str,
) -> Response {
    session.mark_streaming(kind);

    let stream = async_stream::stream! {
        let handle = state.handle.clone();
        let topics = handle.topics().clone();
        let slot = topics.slot(topic);

        // Register as a consumer so the pipeline (or the display gate)
        // knows someone is listening
        let _consumer = match topic {
            Topic::DisplayJpeg => None,
            other => Some(topics.subscribe(other)),
        };
        let _watch = match topic {
            Topic::DisplayJpeg => Some(state.gate.watch()),
            _ => None,
        };

        let mut payload = vec![0u8; topic.max_payload()];
        let mut last_sequence = 0u64;

        loop {
            if !handle.is_running() {
                break;
            }
            if !slot.wait_for_new(last_sequence, WAIT_SLICE).await {
                continue;
            }

            let info = slot.copy_out(&mut payload);
            if info.sequence <= last_sequence || info.len == 0 {
                continue;
            }
            last_sequence = info.sequence;

            // Spread the CPU cost of a newly connected client
            if session.frames_sent() < WARMUP_FRAMES {
                tokio::time::sleep(WARMUP_DELAY).await;
            }
            session.record_frame(info.sequence);

            let part_header = format!(
                "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                info.len
            );
            let mut part = BytesMut::with_capacity(part_header.len() + info.len + 2);
            part.put_slice(part_header.as_bytes());
            part.put_slice(&payload[..info.len]);
            part.put_slice(b"\r\n");
            yield Ok::<_, axum::Error>(part.freeze());
        }
        debug!("Multipart stream for {} ended", session.peer());
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "close")
        .body(axum::body::Body::from_stream(stream))
        .unwrap()
}

/// Single camera JPEG: a payload younger than two seconds is served as-is,
/// otherwise a fresh capture is requested from the pipeline
async fn snapshot_handler(
    State(state): State<JpegServerState>,
    Extension(session): Extension<Arc<ClientSession>>,
) -> Response {
    session.mark_streaming("snapshot");
    let slot = state.handle.topics().slot(Topic::CameraJpeg);

    let mut payload = vec![0u8; Topic::CameraJpeg.max_payload()];
    let info = slot.copy_out(&mut payload);
    if info.len > 0 && info.age_us(monotonic_us()) < SNAPSHOT_FRESH_US {
        payload.truncate(info.len);
        return jpeg_response(payload);
    }

    if state.handle.fresh_snapshot(SNAPSHOT_TIMEOUT).await {
        let info = slot.copy_out(&mut payload);
        if info.len > 0 {
            payload.truncate(info.len);
            return jpeg_response(payload);
        }
    }

    debug!("Snapshot for {} timed out", session.peer());
    not_found_handler().await.into_response()
}

/// Single display JPEG: raises the watcher count, waits for the next
/// published frame, releases the watch on return
async fn display_snapshot_handler(
    State(state): State<JpegServerState>,
    Extension(session): Extension<Arc<ClientSession>>,
) -> Response {
    session.mark_streaming("display_snapshot");
    let _watch = state.gate.watch();
    let slot = state.handle.topics().slot(Topic::DisplayJpeg);

    let observed = slot.current_sequence();
    if slot.wait_for_new(observed, DISPLAY_SNAPSHOT_TIMEOUT).await {
        let mut payload = vec![0u8; Topic::DisplayJpeg.max_payload()];
        let info = slot.copy_out(&mut payload);
        if info.len > 0 {
            payload.truncate(info.len);
            return jpeg_response(payload);
        }
    }

    debug!("Display snapshot for {} timed out", session.peer());
    not_found_handler().await.into_response()
}

fn jpeg_response(payload: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, payload.len())
        .header(header::CONNECTION, "close")
        .body(axum::body::Body::from(payload))
        .unwrap()
}
