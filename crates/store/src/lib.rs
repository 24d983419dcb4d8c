//! `passport-store` — repository implementations for the Passport engine.
//!
//! Two backends: an in-memory store for tests/dev and a Postgres store for
//! production. Both implement the full repository contract surface of
//! `passport-engine`.

pub mod in_memory;
pub mod postgres;

#[cfg(test)]
mod integration_tests;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
