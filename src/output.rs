//! Rendering of ranked relays to stdout.

use std::io::Write;

use crate::config::{OutputFormat, RunConfig};
use crate::error::RelayError;
use crate::relays::MeasuredEndpoint;

/// `<hostname>: <rtt>`, with the `-<server type>` suffix trimmed from the
/// hostname.
pub fn render_text(endpoint: &MeasuredEndpoint, hostname_suffix: &str) -> String {
    let hostname = &endpoint.relay.hostname;
    let hostname = hostname.strip_suffix(hostname_suffix).unwrap_or(hostname);
    format!("{}: {:?}", hostname, endpoint.rtt)
}

pub fn render_json(endpoint: &MeasuredEndpoint) -> Result<String, RelayError> {
    serde_json::to_string(endpoint)
        .map_err(|e| RelayError::Output(format!("Couldn't serialize server information: {}", e)))
}

/// Write one line per ranked relay, best first. Nothing is written for an
/// empty ranking.
pub fn write_ranked<W: Write>(
    out: &mut W,
    ranked: &[MeasuredEndpoint],
    config: &RunConfig,
) -> Result<(), RelayError> {
    let suffix = config.hostname_suffix();
    for endpoint in ranked {
        let line = match config.output {
            OutputFormat::Text => render_text(endpoint, &suffix),
            OutputFormat::Json => render_json(endpoint)?,
        };
        writeln!(out, "{}", line).map_err(|e| RelayError::Output(e.to_string()))?;
    }
    out.flush().map_err(|e| RelayError::Output(e.to_string()))
}
