//! Storage module
//!
//! Local cache of notes and plans, and the replay log of unconfirmed
//! mutations. Both share the cache database pool.

pub mod cache_store;
pub mod sync_queue;

pub use cache_store::CacheStore;
pub use sync_queue::OperationQueue;
