use crate::core::frame::{monotonic_us, FrameInfo, Topic};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

/// Single-writer/many-reader exchange of the latest frame for one topic.
///
/// The slot reserves its full payload capacity at construction and never
/// reallocates; oversized publishes are truncated and counted. Readers copy
/// the payload out under the same short lock the writer copies in under, so
/// a copy that reports sequence `S` always carries exactly the bytes
/// published at `S`.
pub struct FrameSlot {
    topic: Topic,
    inner: Mutex<SlotInner>,
    /// Mirror of the published sequence for lock-free reads
    sequence: AtomicU64,
    /// Publishes whose payload exceeded the reserved capacity
    truncated_publishes: AtomicU64,
    notify: Notify,
}

struct SlotInner {
    buf: Box<[u8]>,
    len: usize,
    sequence: u64,
    timestamp_us: u64,
    keyframe: bool,
}

impl FrameSlot {
    /// Create a slot with the topic's reserved capacity
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            inner: Mutex::new(SlotInner {
                buf: vec![0u8; topic.max_payload()].into_boxed_slice(),
                len: 0,
                sequence: 0,
                timestamp_us: 0,
                keyframe: false,
            }),
            sequence: AtomicU64::new(0),
            truncated_publishes: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Publish a payload, waking every waiter. Never blocks beyond the short
    /// copy-in critical section and never allocates. A `timestamp_us` of
    /// `None` stamps the monotonic clock at publish time. Returns the
    /// assigned sequence number.
    pub fn publish(&self, payload: &[u8], timestamp_us: Option<u64>, keyframe: bool) -> u64 {
        let stamp = timestamp_us.unwrap_or_else(monotonic_us);
        let sequence;
        {
            let mut inner = self.inner.lock();
            let copy_len = payload.len().min(inner.buf.len());
            if copy_len < payload.len() {
                self.truncated_publishes.fetch_add(1, Ordering::Relaxed);
                trace!(
                    topic = self.topic.name(),
                    payload = payload.len(),
                    capacity = inner.buf.len(),
                    "payload truncated to slot capacity"
                );
            }
            inner.buf[..copy_len].copy_from_slice(&payload[..copy_len]);
            inner.len = copy_len;
            inner.sequence += 1;
            inner.timestamp_us = stamp;
            inner.keyframe = keyframe;
            sequence = inner.sequence;
            // Mirror inside the critical section so a reader that saw the
            // atomic advance always finds the matching payload under the lock
            self.sequence.store(sequence, Ordering::Release);
        }
        self.notify.notify_waiters();
        sequence
    }

    /// Latest published sequence, 0 before the first publish
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Publishes dropped to truncation since construction
    pub fn truncated_publishes(&self) -> u64 {
        self.truncated_publishes.load(Ordering::Relaxed)
    }

    /// Wait until the sequence advances past `last_seen` or the timeout
    /// elapses. Returns `true` when a new frame is available. The deadline
    /// is taken on the monotonic clock.
    pub async fn wait_for_new(&self, last_seen: u64, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before the sequence check so a publish that
            // lands between the check and the await still wakes us
            let notified = self.notify.notified();
            if self.current_sequence() > last_seen {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.current_sequence() > last_seen;
            }
        }
    }

    /// Copy the current frame into `dst`, truncating to `dst.len()`.
    /// Returns zeroed info if nothing was ever published.
    pub fn copy_out(&self, dst: &mut [u8]) -> FrameInfo {
        let inner = self.inner.lock();
        if inner.sequence == 0 {
            return FrameInfo::empty();
        }
        let copy_len = inner.len.min(dst.len());
        dst[..copy_len].copy_from_slice(&inner.buf[..copy_len]);
        FrameInfo {
            len: copy_len,
            sequence: inner.sequence,
            timestamp_us: inner.timestamp_us,
            keyframe: inner.keyframe,
        }
    }

    /// Metadata of the current frame without copying the payload
    pub fn peek(&self) -> FrameInfo {
        let inner = self.inner.lock();
        FrameInfo {
            len: inner.len,
            sequence: inner.sequence,
            timestamp_us: inner.timestamp_us,
            keyframe: inner.keyframe,
        }
    }

    /// Wake all waiters without publishing. Used for shutdown.
    pub fn broadcast_wakeup(&self) {
        self.notify.notify_waiters();
    }
}

/// Snapshot of per-topic counters for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub topic: &'static str,
    pub sequence: u64,
    pub truncated_publishes: u64,
    pub consumers: usize,
}

/// The three topic slots plus camera consumer accounting, shared by the
/// pipeline and both servers. Cloning is cheap (one `Arc`).
#[derive(Clone)]
pub struct Topics {
    inner: Arc<TopicsInner>,
}

struct TopicsInner {
    camera_jpeg: FrameSlot,
    camera_h264: FrameSlot,
    display_jpeg: FrameSlot,
    jpeg_consumers: AtomicUsize,
    h264_consumers: AtomicUsize,
}

impl Topics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TopicsInner {
                camera_jpeg: FrameSlot::new(Topic::CameraJpeg),
                camera_h264: FrameSlot::new(Topic::CameraH264),
                display_jpeg: FrameSlot::new(Topic::DisplayJpeg),
                jpeg_consumers: AtomicUsize::new(0),
                h264_consumers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn slot(&self, topic: Topic) -> &FrameSlot {
        match topic {
            Topic::CameraJpeg => &self.inner.camera_jpeg,
            Topic::CameraH264 => &self.inner.camera_h264,
            Topic::DisplayJpeg => &self.inner.display_jpeg,
        }
    }

    /// Register a streaming consumer of a camera topic. The returned guard
    /// keeps the count raised until dropped. Display watchers are counted by
    /// the display gate instead.
    pub fn subscribe(&self, topic: Topic) -> ConsumerGuard {
        match topic {
            Topic::CameraJpeg => {
                self.inner.jpeg_consumers.fetch_add(1, Ordering::SeqCst);
            }
            Topic::CameraH264 => {
                self.inner.h264_consumers.fetch_add(1, Ordering::SeqCst);
            }
            Topic::DisplayJpeg => {}
        }
        ConsumerGuard {
            topics: self.clone(),
            topic,
        }
    }

    pub fn consumer_count(&self, topic: Topic) -> usize {
        match topic {
            Topic::CameraJpeg => self.inner.jpeg_consumers.load(Ordering::SeqCst),
            Topic::CameraH264 => self.inner.h264_consumers.load(Ordering::SeqCst),
            Topic::DisplayJpeg => 0,
        }
    }

    /// Total camera consumers, the pipeline's activity-gating input
    pub fn camera_consumer_count(&self) -> usize {
        self.consumer_count(Topic::CameraJpeg) + self.consumer_count(Topic::CameraH264)
    }

    /// Wake every waiter on every topic; shutdown path
    pub fn broadcast_wakeup_all(&self) {
        self.inner.camera_jpeg.broadcast_wakeup();
        self.inner.camera_h264.broadcast_wakeup();
        self.inner.display_jpeg.broadcast_wakeup();
    }

    pub fn stats(&self) -> Vec<TopicStats> {
        [Topic::CameraJpeg, Topic::CameraH264, Topic::DisplayJpeg]
            .iter()
            .map(|&t| {
                let slot = self.slot(t);
                TopicStats {
                    topic: t.name(),
                    sequence: slot.current_sequence(),
                    truncated_publishes: slot.truncated_publishes(),
                    consumers: self.consumer_count(t),
                }
            })
            .collect()
    }

    fn unsubscribe(&self, topic: Topic) {
        match topic {
            Topic::CameraJpeg => {
                self.inner.jpeg_consumers.fetch_sub(1, Ordering::SeqCst);
            }
            Topic::CameraH264 => {
                self.inner.h264_consumers.fetch_sub(1, Ordering::SeqCst);
            }
            Topic::DisplayJpeg => {}
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII registration of one streaming consumer
pub struct ConsumerGuard {
    topics: Topics,
    topic: Topic,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.topics.unsubscribe(self.topic);
    }
}
