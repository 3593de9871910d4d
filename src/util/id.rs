//! Opaque identifier generation for operations and idempotency keys.

use rand::Rng;

/// Generates a random identifier with the given prefix, e.g. `op_3fa85f64c9e1b2a7`.
pub fn random_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    format!("{}_{:016x}", prefix, rng.random::<u64>())
}

/// Generates a short random nonce used to disambiguate idempotency keys
/// derived from the same `(type, entity, user, timestamp)` tuple.
pub fn random_nonce() -> String {
    let mut rng = rand::rng();
    format!("{:08x}", rng.random::<u32>())
}
