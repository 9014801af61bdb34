pub mod admin;
pub mod heartbeat;
pub mod process;
pub mod worker;

pub use heartbeat::HeartbeatState;
pub use worker::WorkerPool;
