//! The Query Engine: spec.md §4.6.
//!
//! `params` parses the ~40 parameter families into a
//! `epcis_storage::predicate::Predicate` tree; `pagination` signs/verifies
//! `nextPageToken`s; `engine` runs the two-phase retrieval this crate exists
//! for. `epcis-api` and `epcis-subscriptions` are the only expected callers.

pub mod engine;
pub mod error;
pub mod pagination;
pub mod params;

pub use engine::{QueryEngine, QueryResults};
pub use error::{QueryError, QueryResult};
pub use pagination::{Cursor, CursorCodec};
pub use params::{parse, ParsedQuery};
