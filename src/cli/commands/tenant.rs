use anyhow::{bail, Context};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::cli::utils::*;
use crate::cli::{Commands, OutputFormat};
use crate::database::connection::ConnectionFactory;
use crate::database::models::{DatabaseType, Tenant};
use crate::database::params::ConnectionParams;
use crate::platform::Platform;
use crate::services::ProvisionRequest;

pub async fn handle<F: ConnectionFactory>(
    cmd: Commands,
    platform: &Platform<F>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let provisioner = &platform.provisioner;

    match cmd {
        Commands::Init => bail!("init is handled before tenant commands"),
        Commands::Create { slug } => {
            let tenant = platform.registry.create_tenant(&slug).await?;
            output_success(
                output_format,
                &format!("Tenant '{}' registered", tenant.slug),
                Some(json!({ "id": tenant.id })),
            )
        }
        Commands::List => {
            let tenants = platform.registry.list_tenants().await?;
            output_tenants(output_format, &tenants)
        }
        Commands::Show { tenant } => {
            let tenant = find_tenant(platform, &tenant).await?;
            output_tenant(output_format, &tenant)
        }
        Commands::Provision {
            tenant,
            database_type,
            url,
            apply,
        } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let request = provision_request(&database_type, url)?;
            let mut provisioned = provisioner.create_database(tenant.id, request).await?;
            if apply {
                provisioned = provisioner.apply_schema(tenant.id).await?;
            }
            output_tenant(output_format, &provisioned)
        }
        Commands::ApplySchema { tenant } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let tenant = provisioner.apply_schema(tenant.id).await?;
            output_tenant(output_format, &tenant)
        }
        Commands::Migrate { tenant, target } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let tenant = provisioner.migrate_existing(tenant.id, target).await?;
            output_tenant(output_format, &tenant)
        }
        Commands::Health { tenant } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let health = provisioner.check_health(tenant.id).await?;
            output_health(output_format, &tenant.slug, &health)
        }
        Commands::HealthAll => {
            let tenants: Vec<Tenant> = platform
                .registry
                .list_tenants()
                .await?
                .into_iter()
                .filter(|t| t.connection_params.is_some())
                .collect();
            let slugs: BTreeMap<Uuid, String> = tenants.iter().map(|t| (t.id, t.slug.clone())).collect();
            let statuses = provisioner.statuses_for_all(slugs.keys().copied().collect()).await;
            output_health_map(output_format, &statuses, &slugs)
        }
        Commands::Suspend { tenant } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let tenant = provisioner.suspend(tenant.id).await?;
            output_tenant(output_format, &tenant)
        }
        Commands::Resume { tenant } => {
            let tenant = find_tenant(platform, &tenant).await?;
            let tenant = provisioner.resume(tenant.id).await?;
            output_tenant(output_format, &tenant)
        }
        Commands::Drop { tenant, yes } => {
            let tenant = find_tenant(platform, &tenant).await?;
            if !yes {
                bail!("Refusing to drop the database of '{}' without --yes", tenant.slug);
            }
            provisioner.drop_database(tenant.id).await?;
            output_success(output_format, &format!("Database of '{}' dropped", tenant.slug), None)
        }
        Commands::DefaultConfig => print_json(&provisioner.get_default_config()),
    }
}

/// Accept either a tenant id or its slug
async fn find_tenant<F: ConnectionFactory>(platform: &Platform<F>, tenant: &str) -> anyhow::Result<Tenant> {
    let found = match Uuid::parse_str(tenant) {
        Ok(id) => platform.registry.get_tenant_by_id(id).await,
        Err(_) => platform.registry.get_tenant_by_slug(tenant).await,
    };
    found.with_context(|| format!("tenant '{tenant}'"))
}

fn provision_request(database_type: &str, url: Option<String>) -> anyhow::Result<ProvisionRequest> {
    let database_type: DatabaseType = database_type.parse().map_err(anyhow::Error::msg)?;
    let connection = match url {
        Some(raw) => Some(ConnectionParams::from_url(&raw).context("invalid --url")?),
        None => None,
    };
    if database_type == DatabaseType::DedicatedExternal && connection.is_none() {
        bail!("--url is required for external databases");
    }
    Ok(ProvisionRequest {
        database_type,
        connection,
    })
}
