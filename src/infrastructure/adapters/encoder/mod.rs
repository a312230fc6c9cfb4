//! Encoder Adapter - 片段编码

mod audio_encoder;

pub use audio_encoder::SegmentEncoder;
