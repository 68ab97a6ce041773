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

//! The MX trail resolver: mail-delivery paths from MX records to the
//! addresses of their exchanges.

use std::collections::HashSet;

use serde::Serialize;

use crate::external::{EnrichmentCache, Source};
use crate::index::RecordIndex;
use crate::name::NormalizedName;
use crate::record::{parse_mx, Type};
use crate::resolve::HopLimit;

/// The resolved delivery path of one MX record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MxTrail {
    /// The owner of the MX record.
    pub from: NormalizedName,
    pub priority: Option<u16>,

    /// The exchange named by the record.
    pub target: NormalizedName,

    /// The names visited resolving `target`, starting with `target`.
    pub chain: Vec<NormalizedName>,
    pub terminal: NormalizedName,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub source: Source,
}

/// Resolves every MX record of the zone, in record order.
///
/// Exchanges with in-zone addresses are reported with [`Source::Local`].
/// Otherwise, the cached external resolution of the local terminal is
/// used if there is one; its chain is appended to the local chain. If
/// neither has addresses, the trail is reported with [`Source::None`].
///
/// Records are not deduplicated: two MX records naming the same
/// exchange yield two trails.
pub fn mx_trails(
    index: &RecordIndex,
    max_hops: HopLimit,
    external: Option<&EnrichmentCache>,
) -> Vec<MxTrail> {
    let mut trails = Vec::new();

    for (owner, record) in index.records_with_owners() {
        if record.rr_type != Type::MX {
            continue;
        }
        let Some(mx) = parse_mx(&record.content, record.priority) else {
            continue;
        };
        let target = NormalizedName::target(&mx.exchange, index.zone());
        if target.is_empty() {
            continue;
        }

        let mut local = index.resolve(&target, max_hops);
        let source = if local.has_addresses() {
            Source::Local
        } else if external.map_or(false, |cache| cache.complete(&mut local)) {
            Source::External
        } else {
            Source::None
        };

        trails.push(MxTrail {
            from: owner.clone(),
            priority: mx.priority,
            target,
            chain: local.chain,
            terminal: local.terminal,
            ipv4: local.ipv4,
            ipv6: local.ipv6,
            source,
        });
    }

    trails
}

/// Returns every name touched by the given trails: owners, targets,
/// and all chain entries.
pub fn email_path_names(trails: &[MxTrail]) -> HashSet<NormalizedName> {
    let mut names = HashSet::new();
    for trail in trails {
        names.insert(trail.from.clone());
        names.insert(trail.target.clone());
        names.extend(trail.chain.iter().cloned());
    }
    names
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
