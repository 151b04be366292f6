pub mod cache;
pub mod connection;
pub mod migrations;
pub mod models;
pub mod params;
pub mod postgres;
pub mod registry;

pub use cache::{CacheEntryInfo, TenantConnectionCache};
pub use connection::{AdminHandle, ConnectionError, ConnectionErrorKind, ConnectionFactory, TenantHandle};
pub use migrations::{Migration, MigrationFailure, Migrator};
pub use params::ConnectionParams;
pub use postgres::PgConnectionFactory;
pub use registry::{PgRegistryStore, RegistryError, RegistryStore, TenantDatabaseUpdate};
