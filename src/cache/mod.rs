//! Client-side cache for the to-do facade.
//!
//! Results are memoized per [`QueryKey`], served stale while a background
//! refresh runs, and patched or invalidated after successful mutations.

mod key;
mod query_cache;
mod todo_queries;

pub use key::{KeyPart, QueryKey};
pub use query_cache::{CachePolicy, Observer, QueryCache, QueryResult};
pub use todo_queries::{TodoData, TodoQueries};
