use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::database::models::Tenant;
use crate::services::Health;

/// Output a success message, merging `data` into the JSON object
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let (Some(Value::Object(extra)), Value::Object(target)) = (data, &mut response) {
                target.extend(extra);
            }
            print_json(&response)?;
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(Value::Object(fields)) = data {
                for (key, value) in fields {
                    println!("  {:<18} {}", key, plain(&value));
                }
            }
        }
    }
    Ok(())
}

pub fn output_tenant(output_format: OutputFormat, tenant: &Tenant) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(tenant),
        OutputFormat::Text => {
            println!("{:<18} {}", "id", tenant.id);
            println!("{:<18} {}", "slug", tenant.slug);
            println!("{:<18} {}", "database type", tenant.database_type);
            println!("{:<18} {}", "status", tenant.database_status);
            if let Some(params) = &tenant.connection_params {
                println!("{:<18} {}", "database", params.redacted_url());
            }
            if let Some(version) = tenant.migration_version {
                println!("{:<18} {}", "migration", version);
            }
            if let Some(error) = &tenant.last_error {
                println!("{:<18} {}", "last error", error);
            }
            if let Some(checked) = tenant.last_health_checked_at {
                println!("{:<18} {}", "last healthy", checked.format("%Y-%m-%d %H:%M:%S"));
            }
            Ok(())
        }
    }
}

pub fn output_tenants(output_format: OutputFormat, tenants: &[Tenant]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(&json!({ "tenants": tenants })),
        OutputFormat::Text => {
            if tenants.is_empty() {
                println!("No tenants registered");
                return Ok(());
            }
            println!("{:<38} {:<20} {:<20} {:<14} {}", "ID", "SLUG", "TYPE", "STATUS", "VERSION");
            println!("{}", "-".repeat(100));
            for tenant in tenants {
                println!(
                    "{:<38} {:<20} {:<20} {:<14} {}",
                    tenant.id,
                    tenant.slug,
                    tenant.database_type,
                    tenant.database_status,
                    tenant.migration_version.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                );
            }
            Ok(())
        }
    }
}

pub fn output_health(output_format: OutputFormat, label: &str, health: &Health) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(health),
        OutputFormat::Text => {
            println!("{}", health_line(label, health));
            Ok(())
        }
    }
}

pub fn output_health_map(
    output_format: OutputFormat,
    statuses: &BTreeMap<Uuid, Health>,
    slugs: &BTreeMap<Uuid, String>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(statuses),
        OutputFormat::Text => {
            for (id, health) in statuses {
                let label = slugs.get(id).map(String::as_str).unwrap_or("?");
                println!("{}", health_line(label, health));
            }
            let down = statuses.values().filter(|h| !h.reachable).count();
            println!("{} checked, {} unreachable", statuses.len(), down);
            Ok(())
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn health_line(label: &str, health: &Health) -> String {
    match (health.reachable, health.latency_ms, &health.error) {
        (true, Some(ms), _) => format!("✓ {label:<20} reachable ({ms} ms)"),
        (true, None, _) => format!("✓ {label:<20} reachable"),
        (false, _, Some(error)) => format!("✗ {label:<20} unreachable: {error}"),
        (false, _, None) => format!("✗ {label:<20} unreachable"),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn health_lines_show_latency_or_error() {
        let up = Health {
            reachable: true,
            latency_ms: Some(4),
            error: None,
            checked_at: Utc::now(),
        };
        assert!(health_line("acme", &up).contains("4 ms"));

        let down = Health {
            reachable: false,
            latency_ms: None,
            error: Some("connection refused: refused".to_string()),
            checked_at: Utc::now(),
        };
        assert!(health_line("acme", &down).contains("unreachable: connection refused"));
    }

    #[test]
    fn plain_values_drop_json_quoting() {
        assert_eq!(plain(&json!("text")), "text");
        assert_eq!(plain(&Value::Null), "-");
        assert_eq!(plain(&json!(3)), "3");
    }
}
