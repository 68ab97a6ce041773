// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`EnrichmentCache`].

use std::collections::{HashMap, HashSet};

use super::ExternalResolution;
use crate::name::NormalizedName;
use crate::resolve::Resolution;

/// A cache of external resolutions, keyed by the normalized name that
/// was resolved.
///
/// The cache is additive-only: once a name has a result, later results
/// for the same name are ignored. It lives exactly as long as the
/// record set it was built for; callers replace it wholesale (rather
/// than pruning it) when the record set changes.
#[derive(Clone, Debug, Default)]
pub struct EnrichmentCache {
    entries: HashMap<NormalizedName, ExternalResolution>,
}

impl EnrichmentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached resolution of `name`.
    pub fn get(&self, name: &str) -> Option<&ExternalResolution> {
        self.entries.get(name)
    }

    /// Returns whether `name` has been resolved.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of cached names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds resolutions to the cache, skipping names that are already
    /// present. Returns the number of entries added.
    pub fn merge(&mut self, resolutions: impl IntoIterator<Item = ExternalResolution>) -> usize {
        let mut added = 0;
        for resolution in resolutions {
            let name = resolution.name().clone();
            if !self.entries.contains_key(&name) {
                self.entries.insert(name, resolution);
                added += 1;
            }
        }
        added
    }

    /// Completes a local resolution that ended without addresses, using
    /// the cached external resolution of its terminal. The external
    /// chain is appended to the local one, skipping names already
    /// present, and the addresses are replaced with the external ones.
    ///
    /// Returns whether the resolution was completed. Resolutions that
    /// already have addresses, and external results without addresses,
    /// are left alone.
    pub fn complete(&self, resolution: &mut Resolution) -> bool {
        if resolution.has_addresses() {
            return false;
        }
        let Some(found) = self.get(&resolution.terminal) else {
            return false;
        };
        if !found.has_addresses() {
            return false;
        }
        for name in &found.resolution.chain {
            if !resolution.chain.contains(name) {
                resolution.chain.push(name.clone());
            }
        }
        resolution.terminal = found.resolution.terminal.clone();
        resolution.ipv4 = found.resolution.ipv4.clone();
        resolution.ipv6 = found.resolution.ipv6.clone();
        true
    }

    /// Returns the distinct names among `names` that are not cached,
    /// in order of first appearance.
    pub fn missing<'a>(
        &self,
        names: impl IntoIterator<Item = &'a NormalizedName>,
    ) -> Vec<NormalizedName> {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| !self.contains(name) && seen.insert(*name))
            .cloned()
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::Source;

    fn resolution(name: &str, ip: &str) -> ExternalResolution {
        let name = NormalizedName::new(name);
        ExternalResolution {
            resolution: Resolution {
                chain: vec![name.clone()],
                terminal: name,
                ipv4: vec![ip.to_owned()],
                ipv6: Vec::new(),
            },
            reverse_hostnames: Vec::new(),
            source: Source::External,
            error: None,
        }
    }

    #[test]
    fn merge_is_additive_only() {
        let mut cache = EnrichmentCache::new();
        assert_eq!(cache.merge([resolution("a.test", "192.0.2.1")]), 1);
        assert_eq!(
            cache.merge([resolution("a.test", "192.0.2.99"), resolution("b.test", "192.0.2.2")]),
            1
        );
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a.test").unwrap().resolution.ipv4, ["192.0.2.1"]);
    }

    #[test]
    fn missing_is_a_deduplicated_set_difference() {
        let mut cache = EnrichmentCache::new();
        cache.merge([resolution("cached.test", "192.0.2.1")]);
        let names: Vec<NormalizedName> = ["b.test", "cached.test", "a.test", "b.test"]
            .iter()
            .map(|n| NormalizedName::new(n))
            .collect();
        let missing = cache.missing(&names);
        assert_eq!(missing, [NormalizedName::new("b.test"), NormalizedName::new("a.test")]);
    }

    #[test]
    fn complete_extends_dead_end_resolutions() {
        let mut cache = EnrichmentCache::new();
        let mut found = resolution("edge.cdn.test", "192.0.2.8");
        found.resolution.chain.push(NormalizedName::new("pop.cdn.test"));
        found.resolution.terminal = NormalizedName::new("pop.cdn.test");
        cache.merge([found]);

        let mut local = Resolution {
            chain: vec![NormalizedName::new("www.example.com"), NormalizedName::new("edge.cdn.test")],
            terminal: NormalizedName::new("edge.cdn.test"),
            ..Resolution::default()
        };
        assert!(cache.complete(&mut local));
        assert_eq!(
            local.chain,
            [
                NormalizedName::new("www.example.com"),
                NormalizedName::new("edge.cdn.test"),
                NormalizedName::new("pop.cdn.test"),
            ]
        );
        assert_eq!(local.terminal, "pop.cdn.test");
        assert_eq!(local.ipv4, ["192.0.2.8"]);

        let mut unknown = Resolution {
            chain: vec![NormalizedName::new("other.test")],
            terminal: NormalizedName::new("other.test"),
            ..Resolution::default()
        };
        assert!(!cache.complete(&mut unknown));
        assert_eq!(unknown.chain.len(), 1);
    }
}
