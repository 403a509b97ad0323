//! Database access for the lead scoring service
//!
//! Free async functions over sqlx executors so callers can run them against
//! the pool or inside a transaction. `profiles` owns the canonical lead rows;
//! `interactions` is the append-only idempotent log.

pub mod interactions;
pub mod profiles;
