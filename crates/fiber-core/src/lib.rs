//! Shared types, error taxonomy, the token-bucket primitive, configuration,
//! and telemetry bootstrap for the FiberStack telemetry pipeline.
//!
//! Every other crate in this workspace (`fiber-auth`, `fiber-queue`,
//! `fiber-storage`, `fiber-probe`, `fiber-gateway`, `fiber-relay`,
//! `fiber-etl`) depends on this crate for its data model and error type.

pub mod batch;
pub mod conflict;
pub mod config;
pub mod error;
pub mod node;
pub mod sample;
pub mod telemetry;
pub mod token_bucket;
pub mod trace;
pub mod wire;

pub use batch::{AdminCommand, Batch, Envelope, FailureStamp, PoppedBatch, QueueItem};
pub use conflict::ConflictRecord;
pub use error::{ErrorCode, FiberError, FiberResult};
pub use node::{Node, NodeStatus};
pub use sample::Sample;
pub use token_bucket::{BucketState, Decision, TokenBucket};
pub use trace::{generate_trace_id, trace_id_or_generate};
pub use wire::SampleWire;
