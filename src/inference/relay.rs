//! Relay metadata and the read-only relay catalog.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use crate::errors::CatalogError;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Capability flags published for a relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelayFlag {
    Guard,
    Exit,
    Stable,
    Fast,
    Valid,
    Running,
    HSDir,
    V2Dir,
}

impl fmt::Display for RelayFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayInfo {
    pub fingerprint: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
    /// Prior mass, never negative
    #[serde(default)]
    pub consensus_weight: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub flags: BTreeSet<RelayFlag>,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    /// Advertised bandwidth in bytes per second
    #[serde(default)]
    pub bandwidth: u64,
    /// Fingerprints (or family identifiers) declared as the same operator
    #[serde(default)]
    pub family: BTreeSet<String>,
}

impl RelayInfo {
    pub fn has_flag(&self, flag: RelayFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_entry_capable(&self) -> bool {
        self.has_flag(RelayFlag::Guard)
    }

    pub fn is_exit_capable(&self) -> bool {
        self.has_flag(RelayFlag::Exit)
    }

    /// Length of the active window in days; zero for inverted windows.
    pub fn active_days(&self) -> f64 {
        let secs = (self.last_seen - self.first_seen).num_seconds();
        (secs.max(0) as f64) / SECONDS_PER_DAY
    }

    /// Days during which both relays were active.
    pub fn overlap_days(&self, other: &RelayInfo) -> f64 {
        let start = self.first_seen.max(other.first_seen);
        let end = self.last_seen.min(other.last_seen);
        let secs = (end - start).num_seconds();
        (secs.max(0) as f64) / SECONDS_PER_DAY
    }

    /// True if the relay was active at some point within `[start, end]`.
    pub fn active_during(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.first_seen <= end && self.last_seen >= start
    }

    /// Either relay names the other, or both declare a common family member.
    pub fn shares_family(&self, other: &RelayInfo) -> bool {
        self.family.contains(&other.fingerprint)
            || other.family.contains(&self.fingerprint)
            || !self.family.is_disjoint(&other.family)
    }

    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.fingerprint)
    }
}

/// Role a relay plays in a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RelayRole {
    Guard,
    Middle,
    Exit,
}

/// Read-only collection of relays keyed by fingerprint.
#[derive(Clone, Debug, Default)]
pub struct RelayCatalog {
    relays: BTreeMap<String, RelayInfo>,
}

impl RelayCatalog {
    pub fn from_relays(relays: Vec<RelayInfo>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for relay in relays {
            if map.contains_key(&relay.fingerprint) {
                return Err(CatalogError::DuplicateFingerprint(relay.fingerprint));
            }
            map.insert(relay.fingerprint.clone(), relay);
        }
        Ok(Self { relays: map })
    }

    /// Parses a JSON array of relay records.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let relays: Vec<RelayInfo> = serde_json::from_str(json)?;
        Self::from_relays(relays)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&contents)?;
        log::info!("Loaded {} relays from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RelayInfo> {
        self.relays.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayInfo> {
        self.relays.values()
    }

    pub fn find_by_address(&self, addr: &IpAddr) -> Option<&RelayInfo> {
        self.relays.values().find(|relay| relay.addresses.contains(addr))
    }

    /// Relays eligible for a role, heaviest consensus weight first, at most `limit`.
    pub fn pool(&self, role: RelayRole, limit: usize) -> Vec<&RelayInfo> {
        let mut pool: Vec<&RelayInfo> = self
            .relays
            .values()
            .filter(|relay| match role {
                RelayRole::Guard => relay.is_entry_capable(),
                RelayRole::Exit => relay.is_exit_capable(),
                RelayRole::Middle => true,
            })
            .collect();
        pool.sort_by(|a, b| {
            b.consensus_weight
                .total_cmp(&a.consensus_weight)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        pool.truncate(limit);
        pool
    }
}
