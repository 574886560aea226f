use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use shadow_rs::shadow;
use url::Url;

shadow!(build);

/// Parses a URL that names a host, rejecting relative and host-less ones.
fn absolute_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|e| format!("{value}: {e}"))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(format!("{value}: url has no host")),
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version = build::VERSION, long_version = build::CLAP_LONG_VERSION, about = "", long_about = "")]
pub struct Config {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,
    /// internal address of the transfer backend
    #[arg(long, env = "BACKEND_URL", default_value = "http://transfer:5327", value_parser = absolute_url)]
    pub backend_url: Url,
    /// address clients see; used in short links and the outbound Host header
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080", value_parser = absolute_url)]
    pub public_url: Url,
    #[arg(long, env = "DB_PATH", default_value = "/data/shortener.db")]
    pub db_path: PathBuf,
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 600)]
    pub backend_timeout_secs: u64,
    #[arg(long, env = "TOKEN_LENGTH", default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub token_length: u8,
}

impl Config {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}
