//! best-relay: pick the lowest-latency VPN relays
//!
//! Loads a provider's relay list (API first, local copy as fallback), keeps
//! the active relays matching the country criteria, pings each one once and
//! ranks the replies by round-trip time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use best_relay::{load_and_run, IcmpProber, RunConfig};
//!
//! # async fn demo() -> Result<(), best_relay::RelayError> {
//! let config = RunConfig::default();
//! let prober = Arc::new(IcmpProber::new(config.probe_timeout, config.socket_mode));
//! let report = load_and_run(&config, prober).await?;
//! for relay in &report.ranked {
//!     println!("{}: {:?}", relay.relay.hostname, relay.rtt);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod relays;
pub mod runtime;

pub use config::{OutputFormat, RunConfig, SocketMode};
pub use error::{CatalogError, ProbeError, RelayError};
pub use relays::{
    load_and_run, run, EndpointDescriptor, IcmpProber, MeasuredEndpoint, Prober, RankReport,
};
