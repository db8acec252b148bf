//! Relay selection pipeline
//!
//! Picks the lowest-latency relays from a provider's published server list.
//!
//! ## Architecture
//!
//! - catalog.rs: relay descriptors, API fetch with local-file fallback
//! - filter.rs: active/country eligibility
//! - probe.rs: one ICMP echo per relay
//! - rank.rs: latency ordering and top-N cutoff
//! - pipeline.rs: bounded concurrent fan-out over the probes

pub mod catalog;
pub mod filter;
pub mod pipeline;
pub mod probe;
pub mod rank;

pub use catalog::{load_catalog, parse_catalog, CatalogSource, EndpointDescriptor};
pub use filter::{filter_eligible, CountryFilter};
pub use pipeline::{load_and_run, run, RankReport};
pub use probe::{measure, IcmpProber, Prober};
pub use rank::{by_latency, rank, Comparator, MeasuredEndpoint};
