//! Redis 协调后端

mod coordination;

pub use coordination::{RedisCoordination, RedisCoordinationConfig};
