//! streamlink-state: embedded state store for the StreamLink control plane.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the registered cluster,
//! deployed service records, OAuth client registrations and the bootstrap
//! flags.
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! The `ACTIVE_SERVICES` index (`{cluster_id}/{catalog_key}` → record id) is
//! maintained in the same write transaction as the record it points to, so
//! at most one active record per cluster and catalog entry can exist.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
