//! Pluggable persistence for Captures, MasterData, and Subscriptions.
//!
//! `epcis-capture`, `epcis-query`, and `epcis-subscriptions` depend only on
//! the `Storage` trait in `store`, never on a concrete backend — the same
//! shape the teacher uses for `EventBus` in `epcis-events`. `InMemoryStore`
//! backs tests and single-process development runs; `PostgresStore` is what
//! a deployed repository runs against.

pub mod error;
pub mod eval;
pub mod in_memory;
pub mod postgres;
pub mod predicate;
pub mod store;

pub use error::StorageError;
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use predicate::{Comparator, FieldMatch, Order, OrderDirection, Predicate, TimeField};
pub use store::Storage;
