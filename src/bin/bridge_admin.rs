//! # Bridge Admin CLI
//!
//! Operator tooling: Google contacts authorization, tenant checks and manual
//! CRM follow-up tasks.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use kommo_bridge::{
    config::ConfigLoader,
    contacts::ContactsClient,
    crm::CrmClient,
    telemetry::init_tracing,
    tenants::{ProcessEnv, TenantRegistry, validate_tenant},
};

/// Kommo bridge administration
#[derive(Parser)]
#[command(name = "bridge-admin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Administration commands for the Kommo bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Google consent URL for a tenant's OAuth client
    GoogleAuthUrl {
        #[arg(long)]
        client_id: String,

        #[arg(long, default_value = "http://localhost:3000/oauth/callback")]
        redirect_uri: String,
    },

    /// Exchange a Google authorization code for a refresh token
    GoogleExchangeCode {
        #[arg(long)]
        client_id: String,

        #[arg(long)]
        client_secret: String,

        #[arg(long, default_value = "http://localhost:3000/oauth/callback")]
        redirect_uri: String,

        /// Code from the consent redirect
        #[arg(long)]
        code: String,

        /// Variable name printed for the refresh token
        #[arg(long, default_value = "GOOGLE_REFRESH_TOKEN")]
        env_var: String,
    },

    /// Resolve and validate a tenant, printing a redacted view
    CheckTenant {
        tenant: String,
    },

    /// Create a follow-up task on a lead
    FollowUpTask {
        tenant: String,

        #[arg(long)]
        lead_id: u64,

        #[arg(long, default_value = "Seguimiento del jugador")]
        text: String,

        /// Hours until the task is due
        #[arg(long, default_value_t = 24)]
        due_in_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new().load().context("loading configuration")?;
    init_tracing(&config)?;

    match cli.command {
        Commands::GoogleAuthUrl {
            client_id,
            redirect_uri,
        } => {
            let contacts = ContactsClient::new(&config)?;
            let url = contacts.authorization_url(&client_id, &redirect_uri)?;
            println!("Open this URL and approve access:\n\n{url}\n");
            println!("Then run `bridge-admin google-exchange-code --code <CODE> ...`.");
        }

        Commands::GoogleExchangeCode {
            client_id,
            client_secret,
            redirect_uri,
            code,
            env_var,
        } => {
            let contacts = ContactsClient::new(&config)?;
            let refresh_token = contacts
                .exchange_authorization_code(&client_id, &client_secret, &redirect_uri, &code)
                .await?
                .ok_or_else(|| {
                    anyhow!("no refresh token returned; revoke access and retry with prompt=consent")
                })?;
            println!("{env_var}={refresh_token}");
        }

        Commands::CheckTenant { tenant } => {
            let registry = TenantRegistry::load(&config.tenants_file)?;
            let resolved = registry
                .resolve(&tenant, &ProcessEnv)
                .ok_or_else(|| anyhow!("tenant '{tenant}' not found"))?;
            let report = validate_tenant(&resolved);

            println!("{}", serde_json::to_string_pretty(&resolved.redacted())?);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                bail!("tenant '{tenant}' is missing required settings");
            }
        }

        Commands::FollowUpTask {
            tenant,
            lead_id,
            text,
            due_in_hours,
        } => {
            let registry = TenantRegistry::load(&config.tenants_file)?;
            let resolved = registry
                .resolve(&tenant, &ProcessEnv)
                .ok_or_else(|| anyhow!("tenant '{tenant}' not found"))?;
            let crm = CrmClient::new(&config, &resolved.crm)?;
            let due = Utc::now() + Duration::hours(due_in_hours);

            crm.create_follow_up_task(lead_id, &text, due).await?;
            println!("task created on lead {lead_id}, due {}", due.to_rfc3339());
        }
    }

    Ok(())
}
