//! Resource ledger: per-offer resource vectors for one delivery.
//!
//! Pure data transform: no memory across deliveries and no validation
//! beyond what the core types already guarantee.

use std::collections::BTreeMap;

use flotilla_core::{AgentId, CPUS, MEM, Offer, OfferId, PORTS, RangeSet, Resource};

/// Available resources of one offer, indexed by resource name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferResources {
    pub scalars: BTreeMap<String, f64>,
    pub ranges: BTreeMap<String, RangeSet>,
}

impl OfferResources {
    /// Index a resource list. Repeated names (e.g. one entry per role)
    /// are summed for scalars and merged for ranges.
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut index = Self::default();
        for resource in resources {
            match resource {
                Resource::Scalar { name, value } => {
                    *index.scalars.entry(name.clone()).or_insert(0.0) += value;
                }
                Resource::Ranges { name, ranges } => {
                    let merged = match index.ranges.get(name) {
                        Some(existing) => existing.union(ranges),
                        None => ranges.clone(),
                    };
                    index.ranges.insert(name.clone(), merged);
                }
            }
        }
        index
    }

    /// Scalar value by name; absent resources count as zero.
    pub fn scalar(&self, name: &str) -> f64 {
        self.scalars.get(name).copied().unwrap_or(0.0)
    }

    pub fn range_set(&self, name: &str) -> Option<&RangeSet> {
        self.ranges.get(name)
    }

    pub fn cpus(&self) -> f64 {
        self.scalar(CPUS)
    }

    pub fn mem(&self) -> f64 {
        self.scalar(MEM)
    }

    /// Number of free ports.
    pub fn port_count(&self) -> u64 {
        self.range_set(PORTS).map_or(0, RangeSet::len)
    }

    /// True when nothing usable is left.
    pub fn is_exhausted(&self) -> bool {
        self.scalars.values().all(|v| *v <= f64::EPSILON)
            && self.ranges.values().all(RangeSet::is_empty)
    }

    /// Rebuild a resource list, scalars first then ranges, by name.
    pub fn to_resources(&self) -> Vec<Resource> {
        let scalars = self.scalars.iter().map(|(name, value)| Resource::Scalar {
            name: name.clone(),
            value: *value,
        });
        let ranges = self
            .ranges
            .iter()
            .map(|(name, set)| Resource::ranges(name.clone(), set.clone()));
        scalars.chain(ranges).collect()
    }
}

/// One offer as seen by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub sequence: u64,
    pub available: OfferResources,
}

/// Index a delivery of offers, ordered by arrival sequence.
pub fn index_offers(offers: &[Offer]) -> Vec<LedgerEntry> {
    let mut entries: Vec<LedgerEntry> = offers
        .iter()
        .map(|offer| LedgerEntry {
            offer_id: offer.id.clone(),
            agent_id: offer.agent_id.clone(),
            hostname: offer.hostname.clone(),
            sequence: offer.sequence,
            available: OfferResources::from_resources(&offer.resources),
        })
        .collect();
    entries.sort_by_key(|e| e.sequence);
    entries
}
