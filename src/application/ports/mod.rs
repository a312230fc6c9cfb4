//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_encoder;
mod coordination;
mod merge_lock;
mod segment_cache;
mod synthesizer;

pub use audio_encoder::{AudioEncoderPort, AudioFormat, EncodeError, EncodeResult};
pub use coordination::{CoordinationError, CoordinationPort, UpdateFn, UPDATE_RETRY_BUDGET};
pub use merge_lock::MergeLockPort;
pub use segment_cache::{fingerprint, CacheError, CacheStats, SegmentCachePort};
pub use synthesizer::{
    matches_capacity_signature, SynthesisError, SynthesisOutput, Synthesizer, SynthesizerFactory,
    CAPACITY_ERROR_SIGNATURES,
};
