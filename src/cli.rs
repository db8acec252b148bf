//! Command-line flags.

use std::path::PathBuf;
use std::str::FromStr;

use clap::builder::TypedValueParser as _;
use clap::Parser;
use log::LevelFilter;

use crate::config::{self, OutputFormat, RunConfig, SocketMode};
use crate::error::RelayError;

#[derive(Debug, Parser)]
#[command(
    name = "best-relay",
    version,
    about = "Find the lowest-latency VPN relays by pinging each one"
)]
pub struct Cli {
    /// Output format. 'json' prints every relay as a JSON object
    #[arg(short = 'o', long = "output", default_value = "text")]
    pub output: String,

    /// Server country code, e.g. ch for Switzerland
    #[arg(short = 'c', long = "country")]
    pub country: Option<String>,

    /// Exclude servers from these countries (e.g. 'us,se')
    #[arg(short = 'e', long = "exclude", default_value = "")]
    pub exclude: String,

    /// Number of best relays to print
    #[arg(short = 's', long = "size", default_value_t = config::DEFAULT_TOP_N)]
    pub size: usize,

    /// Server type, e.g. wireguard
    #[arg(short = 't', long = "type", default_value = config::DEFAULT_SERVER_TYPE)]
    pub server_type: String,

    /// Log level: trace, debug, info, warn, error, fatal, panic, off
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Base URL of the relay list API
    #[arg(long = "api-url", default_value = config::DEFAULT_API_BASE_URL)]
    pub api_url: String,

    /// Local server list used when the API is unreachable
    #[arg(long = "fallback")]
    pub fallback: Option<PathBuf>,

    /// Maximum number of probes in flight
    #[arg(
        short = 'j',
        long = "concurrency",
        default_value_t = config::DEFAULT_CONCURRENCY,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub concurrency: usize,

    /// Always use raw ICMP sockets (needs elevated rights)
    #[arg(long, conflicts_with = "unprivileged")]
    pub privileged: bool,

    /// Never fall back to raw ICMP sockets
    #[arg(long)]
    pub unprivileged: bool,
}

impl Cli {
    /// Turn the flags into an explicit run configuration and log level.
    pub fn into_config(self) -> Result<(RunConfig, LevelFilter), RelayError> {
        let level = parse_log_level(&self.log_level)?;

        if self.server_type.trim().is_empty() {
            return Err(RelayError::Config("server type must not be empty".to_string()));
        }

        let output = if self.output.eq_ignore_ascii_case("json") {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        let socket_mode = if self.privileged {
            SocketMode::Privileged
        } else if self.unprivileged {
            SocketMode::Unprivileged
        } else {
            SocketMode::Auto
        };

        let config = RunConfig {
            server_type: self.server_type.trim().to_string(),
            country: self.country.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            excluded_countries: config::parse_country_set(&self.exclude),
            top_n: self.size,
            output,
            api_base_url: self.api_url,
            fallback_path: self.fallback,
            concurrency: self.concurrency,
            socket_mode,
            ..RunConfig::default()
        };

        Ok((config, level))
    }
}

/// Parse a log level name. `fatal` and `panic` map to `error`.
pub fn parse_log_level(raw: &str) -> Result<LevelFilter, RelayError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("fatal") || raw.eq_ignore_ascii_case("panic") {
        return Ok(LevelFilter::Error);
    }
    if raw.eq_ignore_ascii_case("disabled") {
        return Ok(LevelFilter::Off);
    }
    LevelFilter::from_str(raw)
        .map_err(|_| RelayError::Config(format!("Unable to set log level {:?}", raw)))
}
