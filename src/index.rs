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

//! Implementation of the [`RecordIndex`], which groups a flat record
//! list by owner name and derives the address and CNAME maps used by
//! the rest of the engine.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::name::NormalizedName;
use crate::record::{DnsRecord, Type};
use crate::util::{canonical_address, push_unique};

/// An index over the records of one zone, built once per rendering
/// pass.
///
/// The index borrows the records; it is cheap to rebuild and is never
/// mutated after construction. All maps are keyed on
/// [`NormalizedName`]s, never on raw record names.
#[derive(Debug)]
pub struct RecordIndex<'a> {
    zone: NormalizedName,
    records: &'a [DnsRecord],
    owners: Vec<NormalizedName>,
    by_name: BTreeMap<NormalizedName, Vec<&'a DnsRecord>>,
    ipv4_by_name: BTreeMap<NormalizedName, Vec<String>>,
    ipv6_by_name: BTreeMap<NormalizedName, Vec<String>>,
    cnames: HashMap<NormalizedName, NormalizedName>,
}

impl<'a> RecordIndex<'a> {
    /// Builds the index for `records` in the zone named `zone`.
    ///
    /// Records with an empty `content` are skipped for the address and
    /// CNAME maps (but are still grouped by name, since their type
    /// alone may be meaningful to the area classifier).
    ///
    /// If a name owns more than one CNAME record, the *last* one wins.
    /// This is not valid DNS, and no attempt is made to diagnose it
    /// beyond a debug log message.
    pub fn build(records: &'a [DnsRecord], zone: &str) -> Self {
        let zone = NormalizedName::new(zone);
        let mut owners = Vec::with_capacity(records.len());
        let mut by_name: BTreeMap<NormalizedName, Vec<&'a DnsRecord>> = BTreeMap::new();
        let mut ipv4_by_name: BTreeMap<NormalizedName, Vec<String>> = BTreeMap::new();
        let mut ipv6_by_name: BTreeMap<NormalizedName, Vec<String>> = BTreeMap::new();
        let mut cnames = HashMap::new();

        for record in records {
            let owner = NormalizedName::owner(&record.name, &zone);
            owners.push(owner.clone());
            by_name.entry(owner.clone()).or_default().push(record);

            let content = record.content.trim();
            if owner.is_empty() || content.is_empty() {
                continue;
            }
            match record.rr_type {
                Type::A => {
                    let ip = canonical_address(content);
                    push_unique(ipv4_by_name.entry(owner).or_default(), ip);
                }
                Type::AAAA => {
                    let ip = canonical_address(content);
                    push_unique(ipv6_by_name.entry(owner).or_default(), ip);
                }
                Type::CNAME => {
                    let target = NormalizedName::target(content, &zone);
                    if target.is_empty() {
                        continue;
                    }
                    if let Some(previous) = cnames.insert(owner.clone(), target) {
                        debug!(
                            "{} owns more than one CNAME record; {} was replaced by the later record.",
                            owner, previous,
                        );
                    }
                }
                _ => (),
            }
        }

        Self {
            zone,
            records,
            owners,
            by_name,
            ipv4_by_name,
            ipv6_by_name,
            cnames,
        }
    }

    /// Returns the zone apex.
    pub fn zone(&self) -> &NormalizedName {
        &self.zone
    }

    /// Returns the records in their original order.
    pub fn records(&self) -> &'a [DnsRecord] {
        self.records
    }

    /// Returns the records paired with their normalized owner names, in
    /// their original order.
    pub fn records_with_owners(&self) -> impl Iterator<Item = (&NormalizedName, &'a DnsRecord)> {
        self.owners.iter().zip(self.records.iter())
    }

    /// Returns the normalized owner names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &NormalizedName> {
        self.by_name.keys()
    }

    /// Returns the records owned by `name`.
    pub fn records_at(&self, name: &str) -> &[&'a DnsRecord] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the in-zone IPv4 addresses of `name`.
    pub fn ipv4(&self, name: &str) -> &[String] {
        self.ipv4_by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the in-zone IPv6 addresses of `name`.
    pub fn ipv6(&self, name: &str) -> &[String] {
        self.ipv6_by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns whether `name` has any in-zone addresses.
    pub fn has_addresses(&self, name: &str) -> bool {
        !self.ipv4(name).is_empty() || !self.ipv6(name).is_empty()
    }

    /// Returns the CNAME target of `name`, if it owns a CNAME record.
    pub fn cname(&self, name: &str) -> Option<&NormalizedName> {
        self.cnames.get(name)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
