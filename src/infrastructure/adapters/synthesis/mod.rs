//! Synthesis Adapter - 合成引擎实现

mod fake_synthesizer;
mod http_synthesizer;

pub use fake_synthesizer::{FakeSynthesizer, FakeSynthesizerConfig, FakeSynthesizerFactory};
pub use http_synthesizer::{HttpSynthesizer, HttpSynthesizerConfig, HttpSynthesizerFactory};
