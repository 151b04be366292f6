pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::platform::Platform;

#[derive(Parser)]
#[command(name = "tenantctl")]
#[command(about = "Tenant registry and database provisioning")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Bootstrap the registry schema and check connectivity")]
    Init,

    #[command(about = "Register a new tenant")]
    Create {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "List registered tenants")]
    List,

    #[command(about = "Show one tenant")]
    Show {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,
    },

    #[command(about = "Allocate the tenant's database")]
    Provision {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,

        #[arg(long = "type", default_value = "dedicated_managed", help = "shared, dedicated_managed or dedicated_external")]
        database_type: String,

        #[arg(long, help = "Connection URL of an external database")]
        url: Option<String>,

        #[arg(long, help = "Also apply the schema once the database exists")]
        apply: bool,
    },

    #[command(about = "Apply migrations to a freshly provisioned database")]
    ApplySchema {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,
    },

    #[command(about = "Migrate a ready tenant")]
    Migrate {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,

        #[arg(long, help = "Stop at this migration version")]
        target: Option<i64>,
    },

    #[command(about = "Probe one tenant's database")]
    Health {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,
    },

    #[command(about = "Probe every provisioned tenant")]
    HealthAll,

    #[command(about = "Stop serving a ready tenant")]
    Suspend {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,
    },

    #[command(about = "Serve a suspended tenant again")]
    Resume {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,
    },

    #[command(about = "Drop the tenant's database")]
    Drop {
        #[arg(help = "Tenant ID or slug")]
        tenant: String,

        #[arg(long, help = "Confirm the drop")]
        yes: bool,
    },

    #[command(about = "Show the template used for new managed databases")]
    DefaultConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = AppConfig::from_env()?;
    let platform = Platform::connect(&config).await?;

    let result = match cli.command {
        Commands::Init => commands::init::handle(&platform, &config, output_format).await,
        cmd => commands::tenant::handle(cmd, &platform, output_format).await,
    };

    platform.shutdown().await;
    result
}
