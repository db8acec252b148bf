//! Eligibility filter applied before probing.

use std::collections::HashSet;

use super::catalog::EndpointDescriptor;

/// Operator-selected country criteria.
#[derive(Debug, Clone, Default)]
pub struct CountryFilter {
    /// Keep only this exact country code when set.
    pub country: Option<String>,
    /// Country codes that are never probed.
    pub excluded: HashSet<String>,
}

impl CountryFilter {
    pub fn new(country: Option<String>, excluded: HashSet<String>) -> Self {
        // An empty country flag means "any country".
        let country = country.filter(|c| !c.is_empty());
        Self { country, excluded }
    }

    /// Whether a single relay should be probed.
    pub fn accepts(&self, relay: &EndpointDescriptor) -> bool {
        if !relay.active {
            return false;
        }
        if let Some(country) = &self.country {
            if relay.country_code != *country {
                return false;
            }
        }
        !self.excluded.contains(&relay.country_code)
    }
}

/// Select the relays worth probing, preserving catalog order.
pub fn filter_eligible(
    relays: &[EndpointDescriptor],
    filter: &CountryFilter,
) -> Vec<EndpointDescriptor> {
    relays
        .iter()
        .filter(|relay| filter.accepts(relay))
        .cloned()
        .collect()
}
