//! Re-exports the shared wire contract (spec §6) so existing call sites in
//! this crate keep working under `crate::wire::SampleWire`.

pub use fiber_core::wire::SampleWire;
