//! redb table definitions for the StreamLink state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). The active-service index maps a composite key to a record id.

use redb::TableDefinition;

/// Registered clusters keyed by `{cluster_id}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Deployed service records keyed by `{record_id}`. Soft-deleted records stay.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Active service index: `{cluster_id}/{catalog_key}` → `{record_id}`.
pub const ACTIVE_SERVICES: TableDefinition<&str, &str> = TableDefinition::new("active_services");

/// OAuth client registrations keyed by `{client_id}`.
pub const OAUTH_CLIENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("oauth_clients");

/// Singleton bootstrap state under [`BOOTSTRAP_KEY`].
pub const BOOTSTRAP: TableDefinition<&str, &[u8]> = TableDefinition::new("bootstrap");

pub const BOOTSTRAP_KEY: &str = "state";
