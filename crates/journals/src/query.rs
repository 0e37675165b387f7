//! Field-predicate search over run tables.

mod engine;
mod integer;
mod timestamp;

pub use engine::{FieldKind, QueryEngine, SearchRequest};
pub use integer::IntegerPredicate;
pub use timestamp::TimestampPredicate;
