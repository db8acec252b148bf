//! Error types and process exit codes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ── Exit codes ──────────────────────────────────────────────────────────────

pub const SUCCESS: i32 = 0;
pub const ERROR_INTERNAL: i32 = 1;
pub const ERROR_CONFIG: i32 = 2;
pub const ERROR_CATALOG_UNAVAILABLE: i32 = 3;
pub const ERROR_CATALOG_PARSE: i32 = 4;

// ── Catalog errors (fatal) ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Neither the API nor any fallback file could be read.
    #[error("server list unavailable (api: {api}; fallback: {fallback})")]
    Unavailable { api: String, fallback: String },

    #[error("malformed server list from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },
}

// ── Probe errors (recoverable, per candidate) ───────────────────────────────

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),

    #[error("failed to open ICMP socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to send echo request: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to receive echo reply: {0}")]
    Receive(#[source] std::io::Error),

    #[error("no echo reply within {0:?}")]
    Timeout(Duration),

    /// Reply arrived with a measured round trip of zero.
    #[error("0s ping detected")]
    InvalidPing,
}

impl ProbeError {
    /// True for the "replied suspiciously instantly" case, as opposed to an
    /// unreachable host.
    pub fn is_invalid_ping(&self) -> bool {
        matches!(self, ProbeError::InvalidPing)
    }
}

// ── Top-level error ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl RelayError {
    /// Map this error to the process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Catalog(CatalogError::Unavailable { .. }) => ERROR_CATALOG_UNAVAILABLE,
            RelayError::Catalog(CatalogError::Parse { .. }) => ERROR_CATALOG_PARSE,
            RelayError::Config(_) => ERROR_CONFIG,
            RelayError::Runtime(_) => ERROR_INTERNAL,
            RelayError::Output(_) => ERROR_INTERNAL,
        }
    }
}

impl CatalogError {
    pub(crate) fn parse(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CatalogError::Parse {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn unavailable(api: impl std::fmt::Display, tried: &[PathBuf], last: Option<std::io::Error>) -> Self {
        let paths = tried
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let fallback = match last {
            Some(e) => format!("{} ({})", e, paths),
            None => format!("no fallback file found ({})", paths),
        };
        CatalogError::Unavailable {
            api: api.to_string(),
            fallback,
        }
    }
}
