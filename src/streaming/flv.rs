use super::clients::ClientSession;
use super::jpeg::not_found_handler;
use crate::core::frame::{monotonic_us, Topic};
use crate::flv::FlvMuxer;
use crate::pipeline::PipelineHandle;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Synthetic Content-Length for legacy clients that reject chunked
/// responses
const LEGACY_CONTENT_LENGTH: &str = "99999999999";
/// Frames that receive artificial spacing after a client connects
const WARMUP_FRAMES: u64 = 15;
const WARMUP_DELAY: Duration = Duration::from_millis(30);
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Shared state for the FLV streaming router
#[derive(Clone)]
pub struct FlvServerState {
    pub handle: PipelineHandle,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

/// Single-route router: `GET /flv`, everything else 404
pub fn router(state: FlvServerState) -> Router {
    Router::new()
        .route("/flv", get(flv_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

/// FLV-over-HTTP stream with per-client muxer state.
///
/// The handoff resets the muxer, sends the file header and metadata, and
/// joins the client at the topic's current sequence so delivery starts with
/// the next fresh frame. H.264 frames are never dropped server-side (the
/// P-frame dependency chain forbids it); the muxer alone decides whether a
/// given access unit is emitted.
async fn flv_handler(
    State(state): State<FlvServerState>,
    Extension(session): Extension<Arc<ClientSession>>,
) -> Response {
    info!("New FLV client {}", session.peer());
    session.mark_streaming("flv");

    let stream = async_stream::stream! {
        let handle = state.handle.clone();
        let topics = handle.topics().clone();
        let slot = topics.slot(Topic::CameraH264);
        let _consumer = topics.subscribe(Topic::CameraH264);

        let mut muxer = FlvMuxer::new(state.width, state.height, state.fps, state.bitrate_kbps);
        muxer.reset();
        yield Ok::<_, axum::Error>(muxer.header());
        yield Ok(muxer.metadata());

        // Join at the next fresh frame
        let mut last_sequence = slot.current_sequence();
        let mut payload = vec![0u8; Topic::CameraH264.max_payload()];

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

            if session.frames_sent() < WARMUP_FRAMES {
                tokio::time::sleep(WARMUP_DELAY).await;
            }

            let tags = muxer.mux(&payload[..info.len], monotonic_us());
            if tags.is_empty() {
                // Not keyframe-synced yet
                continue;
            }
            session.record_frame(info.sequence);
            yield Ok(tags);
        }
        debug!("FLV stream for {} ended", session.peer());
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CONTENT_LENGTH, LEGACY_CONTENT_LENGTH)
        .body(axum::body::Body::from_stream(stream))
        .unwrap()
}
