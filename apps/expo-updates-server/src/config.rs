use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use expo_updates_core::ProtocolConfig;
use url::Url;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Canonical path of the `updates/` directory.
    pub updates_dir: PathBuf,
    /// Public URL of `/api/assets`, used to build manifest asset URLs.
    pub assets_endpoint: Url,
    pub private_key_path: Option<PathBuf>,
    pub asset_request_headers: BTreeMap<String, String>,
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            assets_endpoint: self.assets_endpoint.clone(),
            private_key_path: self.private_key_path.clone(),
            asset_request_headers: self.asset_request_headers.clone(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "expo-updates-server",
    author,
    version,
    about = "Serves Expo Updates manifests, directives and assets"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "EXPO_UPDATES_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// Directory holding `<runtimeVersion>/<timestamp>/` bundles.
    #[arg(long, env = "EXPO_UPDATES_DIR", default_value = "updates")]
    pub updates_dir: PathBuf,

    /// Public base URL clients use to reach this server.
    #[arg(
        long,
        env = "EXPO_UPDATES_HOSTNAME",
        default_value = "http://localhost:3000"
    )]
    pub hostname: String,

    /// PEM private key used when clients ask for signed responses.
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// Header attached to every asset in the manifest extensions, as NAME=VALUE.
    #[arg(
        long = "asset-request-header",
        env = "EXPO_ASSET_REQUEST_HEADERS",
        value_parser = parse_header_pair,
        value_delimiter = ',',
        default_value = "test-header=test-header-value"
    )]
    pub asset_request_headers: Vec<(String, String)>,

    /// Grace period applied during shutdown.
    #[arg(long, env = "EXPO_UPDATES_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        let updates_dir = std::fs::canonicalize(&cli.updates_dir).with_context(|| {
            format!(
                "updates directory {} is not accessible",
                cli.updates_dir.display()
            )
        })?;
        let assets_endpoint = assets_endpoint(&cli.hostname)?;
        Ok(ServerConfig {
            listen_addr,
            updates_dir,
            assets_endpoint,
            private_key_path: cli.private_key_path,
            asset_request_headers: cli.asset_request_headers.into_iter().collect(),
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn assets_endpoint(hostname: &str) -> Result<Url> {
    let raw = format!("{}/api/assets", normalize_base_url(hostname));
    Url::parse(&raw).with_context(|| format!("invalid hostname: {hostname}"))
}

fn parse_header_pair(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_ascii_lowercase(), value.trim().to_string()))
}
