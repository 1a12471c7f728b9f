// FLV container support: Annex-B parsing and the per-client muxer

pub mod muxer;
pub mod nal;

pub use muxer::FlvMuxer;
