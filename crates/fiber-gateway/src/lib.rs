pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod router;
pub mod state;
pub mod wire;

pub use state::AppState;
