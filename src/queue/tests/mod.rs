//! Tests for the persistent queue: insertion and dedup, dequeue ordering,
//! the processing step's status transitions, retry accounting, manual retry
//! flows, statistics, and garbage collection.

mod stats;
