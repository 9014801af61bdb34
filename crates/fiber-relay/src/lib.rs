pub mod buffer;
pub mod forwarder;
pub mod read_stub;
pub mod state_machine;

pub use buffer::DurableBuffer;
pub use forwarder::ForwarderTask;
pub use state_machine::{Forwarder, ForwarderState};
