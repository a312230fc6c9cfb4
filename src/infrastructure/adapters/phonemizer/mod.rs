//! Phonemizer Adapter

mod espeak;

pub use espeak::EspeakPhonemizer;
