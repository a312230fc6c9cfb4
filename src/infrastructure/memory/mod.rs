//! Memory Layer - In-Memory Coordination
//!
//! 单进程部署的协调后端：任务存储、队列、锁、准入计数器与心跳

mod coordination;

pub use coordination::InMemoryCoordination;
