//! Run configuration passed explicitly into the pipeline.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default relay list endpoint; the server type and a trailing slash are appended.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mullvad.net/www/relays/";

pub const DEFAULT_SERVER_TYPE: &str = "wireguard";

pub const DEFAULT_TOP_N: usize = 10;

/// ICMP sockets are a limited OS resource, keep the fan-out modest.
pub const DEFAULT_CONCURRENCY: usize = 32;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// How ranked relays are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `<hostname>: <rtt>` per line
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Which kind of ICMP socket the prober opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketMode {
    /// Raw on Windows, datagram elsewhere with raw as a fallback
    #[default]
    Auto,
    /// Always raw (needs elevated rights on most systems)
    Privileged,
    /// Always datagram
    Unprivileged,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub server_type: String,
    /// Exact country code match; `None` keeps every country.
    pub country: Option<String>,
    pub excluded_countries: HashSet<String>,
    pub top_n: usize,
    pub output: OutputFormat,
    pub api_base_url: String,
    /// Explicit fallback file. When unset the default search path is used.
    pub fallback_path: Option<PathBuf>,
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub socket_mode: SocketMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            server_type: DEFAULT_SERVER_TYPE.to_string(),
            country: None,
            excluded_countries: HashSet::new(),
            top_n: DEFAULT_TOP_N,
            output: OutputFormat::Text,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fallback_path: None,
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            socket_mode: SocketMode::Auto,
        }
    }
}

impl RunConfig {
    /// Full URL of the relay list for the configured server type.
    pub fn catalog_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        format!("{}/{}/", base, self.server_type)
    }

    /// File name of the local server list copy, e.g. `wireguard_servers.json`.
    pub fn fallback_file_name(&self) -> String {
        format!("{}_servers.json", self.server_type)
    }

    /// Candidate fallback files, in lookup order.
    pub fn fallback_candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.fallback_path {
            return vec![path.clone()];
        }

        let name = self.fallback_file_name();
        let mut paths = vec![PathBuf::from(&name)];
        if let Some(dir) = dirs::data_local_dir() {
            paths.push(dir.join("best-relay").join(&name));
        }
        paths
    }

    /// Hostname suffix stripped in text output, e.g. `-wireguard`.
    pub fn hostname_suffix(&self) -> String {
        format!("-{}", self.server_type)
    }
}

/// Split a comma-separated list of country codes into a set.
///
/// Items are trimmed; empty items are ignored, so `""` yields an empty set.
pub fn parse_country_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.server_type, "wireguard");
        assert_eq!(config.top_n, 10);
        assert_eq!(config.probe_timeout, Duration::from_secs(1));
        assert_eq!(config.output, OutputFormat::Text);
        assert!(config.country.is_none());
    }

    #[test]
    fn catalog_url_appends_type_once() {
        let mut config = RunConfig::default();
        assert_eq!(
            config.catalog_url(),
            "https://api.mullvad.net/www/relays/wireguard/"
        );

        config.api_base_url = "http://localhost:8080/relays".to_string();
        config.server_type = "openvpn".to_string();
        assert_eq!(config.catalog_url(), "http://localhost:8080/relays/openvpn/");
    }

    #[test]
    fn explicit_fallback_path_wins() {
        let config = RunConfig {
            fallback_path: Some(PathBuf::from("/tmp/servers.json")),
            ..RunConfig::default()
        };
        assert_eq!(
            config.fallback_candidates(),
            vec![PathBuf::from("/tmp/servers.json")]
        );
    }

    #[test]
    fn default_fallback_starts_in_working_dir() {
        let config = RunConfig::default();
        let candidates = config.fallback_candidates();
        assert_eq!(candidates[0], PathBuf::from("wireguard_servers.json"));
    }

    #[test]
    fn country_set_splits_and_trims() {
        let set = parse_country_set("us, se,,ch ");
        assert_eq!(set.len(), 3);
        assert!(set.contains("us"));
        assert!(set.contains("se"));
        assert!(set.contains("ch"));
        assert!(parse_country_set("").is_empty());
    }
}
