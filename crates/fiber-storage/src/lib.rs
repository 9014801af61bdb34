//! Sample/node/conflict/audit persistence behind a read/write trait split
//! that encodes I-Central-Writer at the type level: `fiber-gateway` and
//! `fiber-relay` depend only on [`read::ReadBackend`]; only `fiber-etl`
//! depends on [`write::WriteBackend`].

pub mod audit;
pub mod memory;
pub mod postgres;
pub mod read;
pub mod write;

pub use audit::AuditEntry;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use read::{MetricRow, MetricsQuery, ReadBackend, StatusReport};
pub use write::{PersistOutcome, WriteBackend};
