//! Relay catalog: descriptor model and server list loading
//!
//! The list is fetched from the provider API. When the API cannot be reached
//! (or answers with an error status) a local copy of the same JSON is used
//! instead. Nothing is written back to disk.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::CatalogError;

/// HTTP timeout for the relay list request
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One relay as published by the provider. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub hostname: String,
    pub country_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city_name: String,
    pub active: bool,
    #[serde(default)]
    pub owned: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    pub ipv4_addr_in: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub ipv6_addr_in: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub network_port_speed: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pubkey: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multihop_port: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub socks_name: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Where the loaded server list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// Fetched from the provider API
    Api,
    /// Read from a local copy after the API failed
    Fallback(PathBuf),
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogSource::Api => write!(f, "API"),
            CatalogSource::Fallback(path) => write!(f, "fallback file {}", path.display()),
        }
    }
}

/// Parse a server list body.
pub fn parse_catalog(body: &str, source_name: &str) -> Result<Vec<EndpointDescriptor>, CatalogError> {
    serde_json::from_str(body).map_err(|e| CatalogError::parse(source_name, e))
}

/// Fetch the raw server list body from the API.
async fn fetch_catalog_body(url: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Failed to fetch server list: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("API returned error status: {}", response.status()));
    }

    response
        .text()
        .await
        .map_err(|e| format!("Failed to read server list body: {}", e))
}

/// Read the first fallback file that exists.
fn read_fallback(candidates: &[PathBuf]) -> Result<(PathBuf, String), Option<std::io::Error>> {
    let mut last_err = None;
    for path in candidates {
        match std::fs::read_to_string(path) {
            Ok(content) => return Ok((path.clone(), content)),
            Err(e) => {
                log::debug!("Fallback server list {:?} not readable: {}", path, e);
                if e.kind() != std::io::ErrorKind::NotFound {
                    last_err = Some(e);
                }
            }
        }
    }
    Err(last_err)
}

/// Load the server list from the API, falling back to a local copy.
///
/// Fails with [`CatalogError::Unavailable`] when neither source can be read,
/// and with [`CatalogError::Parse`] when the chosen source is not a valid
/// list. A malformed API body does not trigger the fallback.
pub async fn load_catalog(
    config: &RunConfig,
) -> Result<(Vec<EndpointDescriptor>, CatalogSource), CatalogError> {
    let url = config.catalog_url();
    log::info!("Fetching server list from API: {}", url);

    let api_err = match fetch_catalog_body(&url).await {
        Ok(body) => {
            let servers = parse_catalog(&body, &url)?;
            log::info!("Fetched {} servers from API", servers.len());
            return Ok((servers, CatalogSource::Api));
        }
        Err(e) => e,
    };

    log::error!(
        "Server list API not responding, falling back to local server list backup: {}",
        api_err
    );

    let candidates = config.fallback_candidates();
    match read_fallback(&candidates) {
        Ok((path, body)) => {
            let servers = parse_catalog(&body, &path.display().to_string())?;
            log::info!("Loaded {} servers from {:?}", servers.len(), path);
            Ok((servers, CatalogSource::Fallback(path)))
        }
        Err(last) => Err(CatalogError::unavailable(api_err, &candidates, last)),
    }
}
