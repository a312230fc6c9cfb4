//! HTTP Handlers

mod audio;
mod dicts;
mod jobs;
mod ping;
mod status;

pub use audio::*;
pub use dicts::*;
pub use jobs::*;
pub use ping::*;
pub use status::*;
