use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::connection::ConnectionFactory;
use crate::platform::Platform;

/// The registry schema is created while connecting; report what is in place
pub async fn handle<F: ConnectionFactory>(
    platform: &Platform<F>,
    config: &AppConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    platform.registry.ping().await?;
    let tenants = platform.registry.list_tenants().await?;
    let migrator = platform.provisioner.migrator();

    output_success(
        output_format,
        "Registry ready",
        Some(json!({
            "environment": format!("{:?}", config.environment),
            "tenants": tenants.len(),
            "migrations": migrator.migrations().len(),
            "latest_migration": migrator.latest_version(),
            "tenant_server": config.tenant_database.default_params.redacted_url(),
        })),
    )
}
