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

//! The shared-address clusterer.

use std::collections::HashMap;

use serde::Serialize;

use crate::index::RecordIndex;
use crate::util::canonical_address;

/// An address shared by two or more names of the zone.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SharedIp {
    pub ip: String,

    /// The zone-relative labels of the names sharing `ip`, sorted.
    pub names: Vec<String>,
}

/// Groups the zone's A/AAAA records by address, reporting addresses
/// used by at least two distinct names.
///
/// Only the addresses written in the zone are considered, not those
/// reached by following CNAMEs. Clusters are ordered by the first
/// appearance of their address in the record list.
pub fn shared_addresses(index: &RecordIndex) -> Vec<SharedIp> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();

    for (owner, record) in index.records_with_owners() {
        if !record.rr_type.is_address() || owner.is_empty() {
            continue;
        }
        if record.is_blank() {
            continue;
        }
        let ip = canonical_address(&record.content);
        let names = groups.entry(ip.clone()).or_insert_with(|| {
            order.push(ip);
            Vec::new()
        });
        let label = owner.relative_to(index.zone()).to_owned();
        if !names.contains(&label) {
            names.push(label);
        }
    }

    order
        .into_iter()
        .filter_map(|ip| {
            let mut names = groups.remove(&ip)?;
            if names.len() < 2 {
                return None;
            }
            names.sort();
            Some(SharedIp { ip, names })
        })
        .collect()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DnsRecord, Type};

    #[test]
    fn single_names_are_not_clusters() {
        let records = vec![
            DnsRecord::new("www", Type::A, "1.2.3.4"),
            DnsRecord::new("www", Type::A, "1.2.3.4"),
        ];
        let index = RecordIndex::build(&records, "example.com");
        assert!(shared_addresses(&index).is_empty());
    }

    #[test]
    fn shared_address_is_reported_once_with_sorted_names() {
        let records = vec![
            DnsRecord::new("www", Type::A, "1.2.3.4"),
            DnsRecord::new("api", Type::A, "1.2.3.4"),
        ];
        let index = RecordIndex::build(&records, "example.com");
        assert_eq!(
            shared_addresses(&index),
            [SharedIp {
                ip: "1.2.3.4".into(),
                names: vec!["api".into(), "www".into()],
            }]
        );
    }

    #[test]
    fn cname_terminals_are_not_clustered() {
        let records = vec![
            DnsRecord::new("www", Type::A, "1.2.3.4"),
            DnsRecord::new("blog", Type::CNAME, "www.example.com"),
            DnsRecord::new("@", Type::AAAA, "2001:db8::1"),
            DnsRecord::new("v6", Type::AAAA, "2001:db8::1"),
        ];
        let index = RecordIndex::build(&records, "example.com");
        let clusters = shared_addresses(&index);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].ip, "2001:db8::1");
        assert_eq!(clusters[0].names, ["@", "v6"]);
    }
}
