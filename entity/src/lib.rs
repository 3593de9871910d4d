//! Database entity definitions for the muninn sync engine.
//!
//! The engine owns a single operation table (`sync_operations`) plus a small
//! key-value table (`sync_kv`) for per-device state such as the device id.
//! Columns are kept schema-agnostic: operation payloads and metadata are
//! stored as serialized byte strings so the table never changes shape when a
//! payload does.

pub mod prelude;
pub mod sync_kv;
pub mod sync_operation;
