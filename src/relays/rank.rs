//! Latency ranking of measured relays.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::catalog::EndpointDescriptor;

/// A relay paired with its measured round trip. Only built from a successful
/// probe, so `rtt` is always strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasuredEndpoint {
    #[serde(flatten)]
    pub relay: EndpointDescriptor,
    #[serde(rename = "Duration", serialize_with = "serialize_nanos")]
    pub rtt: Duration,
}

fn serialize_nanos<S: Serializer>(rtt: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(rtt.as_nanos()).unwrap_or(u64::MAX))
}

impl MeasuredEndpoint {
    /// Returns `None` for a zero round trip, which is never a real measurement.
    pub fn new(relay: EndpointDescriptor, rtt: Duration) -> Option<Self> {
        if rtt.is_zero() {
            return None;
        }
        Some(Self { relay, rtt })
    }
}

/// Comparator used to order measured relays.
pub type Comparator = fn(&MeasuredEndpoint, &MeasuredEndpoint) -> Ordering;

/// Ascending round-trip time.
pub fn by_latency(a: &MeasuredEndpoint, b: &MeasuredEndpoint) -> Ordering {
    a.rtt.cmp(&b.rtt)
}

/// Sort with `compare` and keep at most `top_n` entries.
///
/// The sort is stable, so equal latencies keep their input order. Asking for
/// more entries than were measured simply returns all of them.
pub fn rank(
    mut measured: Vec<MeasuredEndpoint>,
    top_n: usize,
    compare: Comparator,
) -> Vec<MeasuredEndpoint> {
    measured.sort_by(compare);
    measured.truncate(top_n);
    measured
}
