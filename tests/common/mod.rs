use anyhow::{Context, Result};
use uuid::Uuid;

use tenant_router::config::RegistryConfig;
use tenant_router::database::PgRegistryStore;

/// Registry backed by the database named in TEST_REGISTRY_DATABASE_URL.
/// Returns None (and the calling test passes vacuously) when it is unset.
pub async fn live_registry() -> Result<Option<PgRegistryStore>> {
    let _ = dotenvy::dotenv();
    let Ok(url) = std::env::var("TEST_REGISTRY_DATABASE_URL") else {
        eprintln!("TEST_REGISTRY_DATABASE_URL not set; skipping live registry test");
        return Ok(None);
    };

    let config = RegistryConfig {
        url,
        max_connections: 2,
        connect_timeout_secs: 5,
        reconnect_attempts: 1,
    };
    let registry = PgRegistryStore::connect(&config)
        .await
        .context("failed to connect to the test registry")?;
    registry.ensure_schema().await.context("failed to bootstrap registry schema")?;
    Ok(Some(registry))
}

/// Slug unique to one test run
pub fn unique_slug(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}
