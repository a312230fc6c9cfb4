//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Job Context: 合成任务与片段状态机
//! - Pronunciation Context: 分层词典与发音解析
//!
//! 以及共享的文本分块与规范化

pub mod job;
pub mod pronunciation;

mod normalize;
mod text_chunker;

pub use normalize::normalize_text;
pub use text_chunker::{chunk_and_merge, chunk_text, merge_small_segments, ChunkConfig};
