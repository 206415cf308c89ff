//! Store implementations behind the [`DocumentStore`](crate::traits::DocumentStore)
//! and [`RelationalStore`](crate::traits::RelationalStore) traits.
//!
//! - [`MongoStore`]: `MongoDB` through one shared client
//! - [`PostgresStore`]: `PostgreSQL` through a lazily connecting pool
//!
//! Test builds add an in-process document store and a recording relational
//! store.

#[cfg(test)]
pub mod memory;
pub mod mongo;
pub mod postgres;
#[cfg(test)]
pub mod recording;

#[cfg(test)]
pub use memory::MemoryDocumentStore;
pub use mongo::MongoStore;
pub use postgres::PostgresStore;
