//! Gauge Control CLI
//!
//! Command-line interface for managing plugins on a Gauge daemon.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tabled::Tabled;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    api: String,

    /// Organization the requests act on
    #[arg(long, default_value_t = 1)]
    org: i64,

    /// Role to act as (viewer, editor, admin)
    #[arg(long, default_value = "admin")]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List installed plugins
    List {
        /// Only plugins of this type (app, datasource, panel, renderer)
        #[arg(long = "type")]
        plugin_type: Option<String>,
        /// Only plugins enabled for the organization
        #[arg(long)]
        enabled: bool,
        /// Only core (true) or external (false) plugins
        #[arg(long)]
        core: Option<bool>,
        /// Include (true) or hide (false) plugins bundled inside apps
        #[arg(long)]
        embedded: Option<bool>,
    },
    /// Show the settings of a plugin
    Settings {
        /// Plugin ID
        id: String,
    },
    /// Enable a plugin for the organization
    Enable {
        /// Plugin ID
        id: String,
    },
    /// Disable a plugin for the organization
    Disable {
        /// Plugin ID
        id: String,
    },
    /// Install a plugin from the repository
    Install {
        /// Plugin ID
        id: String,
        /// Version, latest compatible when omitted
        #[arg(long)]
        version: Option<String>,
    },
    /// Uninstall an external plugin
    Uninstall {
        /// Plugin ID
        id: String,
    },
    /// Run a backend plugin health check
    Health {
        /// Plugin ID
        id: String,
    },
    /// List plugin load errors
    Errors,
}

#[derive(Debug, Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct PluginRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    #[tabled(rename = "type")]
    plugin_type: String,
    enabled: bool,
    #[serde(skip)]
    #[tabled(rename = "version")]
    version: String,
    #[serde(rename = "latestVersion")]
    #[tabled(rename = "latest")]
    latest_version: String,
    #[tabled(rename = "signature")]
    signature: String,
    #[serde(default)]
    #[tabled(skip)]
    info: PluginInfo,
}

#[derive(Debug, Default, Deserialize)]
struct PluginInfo {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct ErrorRow {
    plugin_id: String,
    error_code: String,
}

struct Api {
    client: Client,
    base: String,
    org: i64,
    role: String,
}

impl Api {
    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base.trim_end_matches('/'), path))
            .header("X-Gauge-Org-Id", self.org.to_string())
            .header("X-Gauge-Role", &self.role)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }
}

/// Fail with the API error message on non-success responses
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    match body.get("message").and_then(Value::as_str) {
        Some(message) => bail!("{}: {}", status, message),
        None => bail!("{}", status),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let api = Api {
        client: Client::new(),
        base: args.api,
        org: args.org,
        role: args.role,
    };

    match args.command {
        Commands::List {
            plugin_type,
            enabled,
            core,
            embedded,
        } => {
            let mut query = Vec::new();
            if let Some(t) = plugin_type {
                query.push(("type", t));
            }
            if enabled {
                query.push(("enabled", "1".to_string()));
            }
            if let Some(v) = core {
                query.push(("core", (v as u8).to_string()));
            }
            if let Some(v) = embedded {
                query.push(("embedded", (v as u8).to_string()));
            }

            let resp = check(api.get("/api/plugins").query(&query).send().await?).await?;
            let mut rows: Vec<PluginRow> = resp.json().await?;
            for row in &mut rows {
                row.version = std::mem::take(&mut row.info.version);
            }
            println!("{}", tabled::Table::new(rows));
        }
        Commands::Settings { id } => {
            let resp = check(
                api.get(&format!("/api/plugins/{}/settings", id))
                    .send()
                    .await?,
            )
            .await?;
            let settings: Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Enable { id } => set_enabled(&api, &id, true).await?,
        Commands::Disable { id } => set_enabled(&api, &id, false).await?,
        Commands::Install { id, version } => {
            let body = json!({ "version": version.unwrap_or_default() });
            check(
                api.post(&format!("/api/plugins/{}/install", id))
                    .json(&body)
                    .send()
                    .await?,
            )
            .await?;
            println!("Plugin {} installed", id);
        }
        Commands::Uninstall { id } => {
            check(
                api.post(&format!("/api/plugins/{}/uninstall", id))
                    .send()
                    .await?,
            )
            .await?;
            println!("Plugin {} uninstalled", id);
        }
        Commands::Health { id } => {
            let resp = api
                .get(&format!("/api/plugins/{}/health", id))
                .send()
                .await?;
            // 503 still carries the health payload
            if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                let body: Value = resp.json().await?;
                println!("{}", serde_json::to_string_pretty(&body)?);
                std::process::exit(1);
            }
            let body: Value = check(resp).await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Errors => {
            let resp = check(api.get("/api/plugins/errors").send().await?).await?;
            let rows: Vec<ErrorRow> = resp.json().await?;
            if rows.is_empty() {
                println!("No plugin errors");
            } else {
                println!("{}", tabled::Table::new(rows));
            }
        }
    }

    Ok(())
}

async fn set_enabled(api: &Api, id: &str, enabled: bool) -> Result<()> {
    let body = json!({ "enabled": enabled, "pinned": enabled });
    check(
        api.post(&format!("/api/plugins/{}/settings", id))
            .json(&body)
            .send()
            .await?,
    )
    .await?;
    println!(
        "Plugin {} {}",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
