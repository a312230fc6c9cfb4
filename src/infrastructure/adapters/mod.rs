//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod encoder;
pub mod phonemizer;
pub mod storage;
pub mod synthesis;

pub use encoder::*;
pub use phonemizer::*;
pub use storage::*;
pub use synthesis::*;
