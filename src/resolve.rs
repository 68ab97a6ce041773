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

//! Local resolution: following in-zone CNAME pointers from a starting
//! name to a terminal name and its in-zone addresses.
//!
//! Resolution is bounded in two ways. A [`HopLimit`] caps the number of
//! links followed, and a set of previously seen names stops traversal
//! as soon as the chain would revisit a name. Together these guarantee
//! termination in O(hop limit) steps for any zone, including zones with
//! CNAME loops.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::index::RecordIndex;
use crate::name::NormalizedName;

/// The maximum number of CNAME links followed during one resolution.
///
/// The value is always within [`HopLimit::MIN`]..=[`HopLimit::MAX`];
/// constructors clamp out-of-range values rather than failing.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HopLimit(u8);

impl HopLimit {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 15;

    /// Creates a hop limit, clamping `hops` into the permitted range.
    pub fn new(hops: u32) -> Self {
        Self(hops.clamp(Self::MIN.into(), Self::MAX.into()) as u8)
    }

    /// Returns the limit as a count of hops.
    pub fn get(self) -> usize {
        self.0.into()
    }
}

impl Default for HopLimit {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl From<u8> for HopLimit {
    fn from(hops: u8) -> Self {
        Self::new(hops.into())
    }
}

impl fmt::Debug for HopLimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HopLimit({})", self.0)
    }
}

impl fmt::Display for HopLimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The result of resolving a name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Resolution {
    /// The names visited, starting with the name that was resolved.
    /// Never contains the same name twice.
    pub chain: Vec<NormalizedName>,

    /// The last name in `chain`.
    pub terminal: NormalizedName,

    /// The IPv4 addresses of `terminal` (only; addresses of
    /// intermediate names are not included).
    pub ipv4: Vec<String>,

    /// The IPv6 addresses of `terminal`.
    pub ipv6: Vec<String>,
}

impl Resolution {
    /// Returns whether the terminal name has any addresses.
    pub fn has_addresses(&self) -> bool {
        !self.ipv4.is_empty() || !self.ipv6.is_empty()
    }
}

impl RecordIndex<'_> {
    /// Resolves `name` through in-zone CNAME records.
    ///
    /// Traversal stops when the current name has no CNAME, when its
    /// CNAME points to a name already in the chain, or after
    /// `max_hops` links. The resulting chain therefore has at most
    /// `max_hops + 1` entries.
    pub fn resolve(&self, name: &NormalizedName, max_hops: HopLimit) -> Resolution {
        let mut chain = vec![name.clone()];
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(name.as_str());
        let mut current = name;

        for _ in 0..max_hops.get() {
            match self.cname(current) {
                Some(next) if !seen.contains(next.as_str()) => {
                    seen.insert(next.as_str());
                    chain.push(next.clone());
                    current = next;
                }
                _ => break,
            }
        }

        Resolution {
            ipv4: self.ipv4(current).to_vec(),
            ipv6: self.ipv6(current).to_vec(),
            terminal: current.clone(),
            chain,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DnsRecord, Type};

    fn name(s: &str) -> NormalizedName {
        NormalizedName::new(s)
    }

    #[test]
    fn hop_limit_is_clamped() {
        assert_eq!(HopLimit::new(0).get(), 1);
        assert_eq!(HopLimit::new(7).get(), 7);
        assert_eq!(HopLimit::new(400).get(), 15);
        assert_eq!(HopLimit::default().get(), 15);
    }

    #[test]
    fn resolve_follows_chain_to_terminal_addresses() {
        let records = vec![
            DnsRecord::new("www", Type::CNAME, "web.example.com"),
            DnsRecord::new("web", Type::CNAME, "lb.example.com"),
            DnsRecord::new("web", Type::A, "192.0.2.99"),
            DnsRecord::new("lb", Type::A, "192.0.2.1"),
            DnsRecord::new("lb", Type::AAAA, "2001:db8::1"),
        ];
        let index = RecordIndex::build(&records, "example.com");
        let resolution = index.resolve(&name("www.example.com"), HopLimit::default());
        assert_eq!(
            resolution.chain,
            [name("www.example.com"), name("web.example.com"), name("lb.example.com")]
        );
        assert_eq!(resolution.terminal, "lb.example.com");
        // Addresses come from the terminal only.
        assert_eq!(resolution.ipv4, ["192.0.2.1"]);
        assert_eq!(resolution.ipv6, ["2001:db8::1"]);
    }

    #[test]
    fn resolve_without_cname_returns_start() {
        let records = vec![DnsRecord::new("www", Type::A, "192.0.2.1")];
        let index = RecordIndex::build(&records, "example.com");
        let resolution = index.resolve(&name("www.example.com"), HopLimit::default());
        assert_eq!(resolution.chain, [name("www.example.com")]);
        assert_eq!(resolution.terminal, "www.example.com");
        assert!(resolution.has_addresses());
    }

    #[test]
    fn resolve_stops_at_cycles() {
        let records = vec![
            DnsRecord::new("a", Type::CNAME, "b.example.com"),
            DnsRecord::new("b", Type::CNAME, "c.example.com"),
            DnsRecord::new("c", Type::CNAME, "a.example.com"),
        ];
        let index = RecordIndex::build(&records, "example.com");
        for hops in HopLimit::MIN..=HopLimit::MAX {
            let max_hops = HopLimit::from(hops);
            let resolution = index.resolve(&name("a.example.com"), max_hops);
            let unique: HashSet<_> = resolution.chain.iter().collect();
            assert_eq!(unique.len(), resolution.chain.len());
            assert!(resolution.chain.len() <= max_hops.get() + 1);
            assert!(resolution.chain.len() <= 3);
            assert_eq!(Some(&resolution.terminal), resolution.chain.last());
        }
    }

    #[test]
    fn resolve_stops_at_self_reference() {
        let records = vec![DnsRecord::new("loop", Type::CNAME, "loop.example.com")];
        let index = RecordIndex::build(&records, "example.com");
        let resolution = index.resolve(&name("loop.example.com"), HopLimit::default());
        assert_eq!(resolution.chain, [name("loop.example.com")]);
    }

    #[test]
    fn resolve_respects_hop_limit() {
        let mut records = Vec::new();
        for i in 0..20 {
            records.push(DnsRecord::new(
                format!("h{}", i),
                Type::CNAME,
                format!("h{}.example.com", i + 1),
            ));
        }
        let index = RecordIndex::build(&records, "example.com");
        for hops in HopLimit::MIN..=HopLimit::MAX {
            let max_hops = HopLimit::from(hops);
            let resolution = index.resolve(&name("h0.example.com"), max_hops);
            assert_eq!(resolution.chain.len(), max_hops.get() + 1);
            assert_eq!(resolution.terminal, format!("h{}.example.com", hops).as_str());
        }
    }
}
