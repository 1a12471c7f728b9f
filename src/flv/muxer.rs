use super::nal::{self, NAL_IDR, NAL_PPS, NAL_SPS};
use bytes::{BufMut, Bytes, BytesMut};

const TAG_HEADER_LEN: usize = 11;
const TAG_TYPE_SCRIPT: u8 = 0x12;
const TAG_TYPE_VIDEO: u8 = 0x09;
const CODEC_ID_AVC: u8 = 7;
const FRAME_TYPE_KEY: u8 = 1;
const FRAME_TYPE_INTER: u8 = 2;
const AVC_PACKET_SEQUENCE_HEADER: u8 = 0;
const AVC_PACKET_NALU: u8 = 1;

/// Per-client FLV muxer wrapping an H.264 Annex-B stream into FLV tags.
///
/// The muxer is stateful per connection: it stashes SPS/PPS units as they
/// appear, emits a single AVC sequence-header tag once both are known and
/// the first IDR arrives, and drops slice data until that point so every
/// client starts decoding on a keyframe.
pub struct FlvMuxer {
    width: u32,
    height: u32,
    fps: u32,
    bitrate_kbps: u32,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    sent_config: bool,
    start_time_us: Option<u64>,
}

impl FlvMuxer {
    pub fn new(width: u32, height: u32, fps: u32, bitrate_kbps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate_kbps,
            sps: None,
            pps: None,
            sent_config: false,
            start_time_us: None,
        }
    }

    /// Clear per-connection sent-flags and timestamps. Called on client
    /// handoff so a reconnecting client gets a fresh header/metadata/config
    /// sequence.
    pub fn reset(&mut self) {
        self.sent_config = false;
        self.start_time_us = None;
    }

    /// The fixed 13-byte FLV file header: magic, version 1, video-only
    /// flags, data offset 9, PreviousTagSize0 = 0.
    pub fn header(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(13);
        buf.put_slice(b"FLV");
        buf.put_u8(1); // version
        buf.put_u8(0x01); // flags: video only
        buf.put_u32(9); // data offset
        buf.put_u32(0); // PreviousTagSize0
        buf.freeze()
    }

    /// One script-data tag carrying the AMF0 `onMetaData` ECMA array.
    pub fn metadata(&self) -> Bytes {
        let mut payload = BytesMut::new();
        amf_string(&mut payload, "onMetaData");

        // ECMA array with six properties
        payload.put_u8(0x08);
        payload.put_u32(6);
        amf_property(&mut payload, "duration", 0.0);
        amf_property(&mut payload, "width", self.width as f64);
        amf_property(&mut payload, "height", self.height as f64);
        amf_property(&mut payload, "videodatarate", self.bitrate_kbps as f64);
        amf_property(&mut payload, "framerate", self.fps as f64);
        amf_property(&mut payload, "videocodecid", CODEC_ID_AVC as f64);
        // Object end marker
        payload.put_u8(0);
        payload.put_u8(0);
        payload.put_u8(0x09);

        let mut buf = BytesMut::new();
        put_tag(&mut buf, TAG_TYPE_SCRIPT, 0, &payload);
        buf.freeze()
    }

    /// Wrap one Annex-B access unit into FLV video tags. Returns the tag
    /// bytes to send; empty until the client is keyframe-synced. `now_us` is
    /// the monotonic clock used for tag timestamps.
    pub fn mux(&mut self, annexb: &[u8], now_us: u64) -> Bytes {
        if annexb.is_empty() {
            return Bytes::new();
        }

        let mut frame_units: Vec<&[u8]> = Vec::new();
        let mut is_idr = false;
        for unit in nal::split_units(annexb) {
            if unit.is_empty() {
                continue;
            }
            match nal::nal_type(unit[0]) {
                NAL_SPS => self.sps = Some(unit.to_vec()),
                NAL_PPS => self.pps = Some(unit.to_vec()),
                kind => {
                    if kind == NAL_IDR {
                        is_idr = true;
                    }
                    frame_units.push(unit);
                }
            }
        }

        if frame_units.is_empty() {
            return Bytes::new();
        }

        let mut out = BytesMut::new();

        if !self.sent_config {
            // Hold back slice data until the parameter sets are known and a
            // keyframe starts the GOP
            if !is_idr || self.sps.is_none() || self.pps.is_none() {
                return Bytes::new();
            }
            let config = self.decoder_configuration_record();
            let mut payload = BytesMut::new();
            payload.put_u8((FRAME_TYPE_KEY << 4) | CODEC_ID_AVC);
            payload.put_u8(AVC_PACKET_SEQUENCE_HEADER);
            payload.put_slice(&[0, 0, 0]); // composition time
            payload.put_slice(&config);
            put_tag(&mut out, TAG_TYPE_VIDEO, 0, &payload);
            self.sent_config = true;
        }

        let start = *self.start_time_us.get_or_insert(now_us);
        let timestamp_ms = (now_us.saturating_sub(start) / 1000) as u32;

        let frame_type = if is_idr {
            FRAME_TYPE_KEY
        } else {
            FRAME_TYPE_INTER
        };
        let mut payload = BytesMut::new();
        payload.put_u8((frame_type << 4) | CODEC_ID_AVC);
        payload.put_u8(AVC_PACKET_NALU);
        payload.put_slice(&[0, 0, 0]); // composition time
        for unit in &frame_units {
            payload.put_u32(unit.len() as u32);
            payload.put_slice(unit);
        }
        put_tag(&mut out, TAG_TYPE_VIDEO, timestamp_ms, &payload);

        out.freeze()
    }

    /// Whether the client has received its sequence header yet
    pub fn is_synced(&self) -> bool {
        self.sent_config
    }

    /// AVCDecoderConfigurationRecord built from the stashed SPS/PPS
    fn decoder_configuration_record(&self) -> Vec<u8> {
        let sps = self.sps.as_deref().unwrap_or(&[]);
        let pps = self.pps.as_deref().unwrap_or(&[]);

        let mut record = Vec::with_capacity(11 + sps.len() + pps.len());
        record.push(0x01); // configuration version
        record.push(sps.get(1).copied().unwrap_or(0)); // profile
        record.push(sps.get(2).copied().unwrap_or(0)); // profile compat
        record.push(sps.get(3).copied().unwrap_or(0)); // level
        record.push(0xFF); // 4-byte NALU lengths
        record.push(0xE1); // one SPS
        record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        record.extend_from_slice(sps);
        record.push(0x01); // one PPS
        record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        record.extend_from_slice(pps);
        record
    }
}

/// Append a complete FLV tag (11-byte header, payload, PreviousTagSize)
fn put_tag(buf: &mut BytesMut, tag_type: u8, timestamp_ms: u32, payload: &[u8]) {
    buf.put_u8(tag_type);
    put_u24(buf, payload.len() as u32);
    // Lower 24 bits, then the extended high byte
    put_u24(buf, timestamp_ms & 0x00FF_FFFF);
    buf.put_u8((timestamp_ms >> 24) as u8);
    put_u24(buf, 0); // stream id
    buf.put_slice(payload);
    buf.put_u32((TAG_HEADER_LEN + payload.len()) as u32);
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}

fn amf_string(buf: &mut BytesMut, value: &str) {
    buf.put_u8(0x02);
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

fn amf_property(buf: &mut BytesMut, key: &str, value: f64) {
    buf.put_u16(key.len() as u16);
    buf.put_slice(key.as_bytes());
    buf.put_u8(0x00); // number marker
    buf.put_f64(value);
}
