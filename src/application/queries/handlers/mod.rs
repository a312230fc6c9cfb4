//! Query Handlers 实现

mod dict_handlers;
mod job_handlers;

pub use dict_handlers::*;
pub use job_handlers::*;
