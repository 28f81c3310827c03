pub mod catalog;
pub mod config;
pub mod types;

pub use catalog::{CatalogEntry, CatalogError, ServiceCatalog};
pub use config::{Secrets, StreamlinkConfig};
pub use types::*;
