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

//! The area classifier, which tags names with the functional areas
//! (email, web, infrastructure) their records suggest.

use std::collections::HashSet;
use std::fmt;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::name::NormalizedName;
use crate::record::{DnsRecord, Type};

/// A functional area of a zone.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Area {
    Email,
    Web,
    Infra,
    Misc,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::Email, Area::Web, Area::Infra, Area::Misc];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Web => "web",
            Self::Infra => "infra",
            Self::Misc => "misc",
        }
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Area {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A set of [`Area`]s, iterated in the order of [`Area::ALL`].
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct AreaSet(u8);

impl AreaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, area: Area) {
        self.0 |= area.bit();
    }

    pub fn contains(self, area: Area) -> bool {
        self.0 & area.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Area> {
        Area::ALL.into_iter().filter(move |area| self.contains(*area))
    }

    /// Returns the area used to style a name in the diagram: the first
    /// area in the set, or [`Area::Misc`] for an empty set.
    pub fn primary(self) -> Area {
        self.iter().next().unwrap_or(Area::Misc)
    }
}

impl FromIterator<Area> for AreaSet {
    fn from_iter<I: IntoIterator<Item = Area>>(iter: I) -> Self {
        let mut set = Self::new();
        for area in iter {
            set.insert(area);
        }
        set
    }
}

impl fmt::Debug for AreaSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for AreaSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for area in self.iter() {
            seq.serialize_element(&area)?;
        }
        seq.end()
    }
}

////////////////////////////////////////////////////////////////////////
// CLASSIFICATION                                                     //
////////////////////////////////////////////////////////////////////////

const EMAIL_NAME_MARKERS: [&str; 3] = ["_dmarc", "_domainkey", "_bimi"];
const EMAIL_TXT_MARKERS: [&str; 4] = ["v=spf1", "v=dmarc1", "v=dkim1", "v=bimi1"];

/// Classifies `name` given the records it owns and the set of names on
/// any MX trail. Every name gets at least one area.
pub fn classify(
    name: &NormalizedName,
    records: &[&DnsRecord],
    email_path_names: &HashSet<NormalizedName>,
) -> AreaSet {
    let mut areas = AreaSet::new();

    let email = EMAIL_NAME_MARKERS.iter().any(|marker| name.contains(marker))
        || email_path_names.contains(name)
        || records.iter().any(|record| match record.rr_type {
            Type::MX | Type::SPF => true,
            Type::TXT => {
                let content = record.content.to_ascii_lowercase();
                EMAIL_TXT_MARKERS.iter().any(|marker| content.contains(marker))
            }
            _ => false,
        });
    if email {
        areas.insert(Area::Email);
    }

    if records.iter().any(|record| {
        matches!(
            record.rr_type,
            Type::NS
                | Type::SOA
                | Type::CAA
                | Type::DNSKEY
                | Type::DS
                | Type::RRSIG
                | Type::NSEC
                | Type::NSEC3
        )
    }) {
        areas.insert(Area::Infra);
    }

    if records.iter().any(|record| {
        matches!(
            record.rr_type,
            Type::A | Type::AAAA | Type::CNAME | Type::SVCB | Type::HTTPS | Type::SRV
        )
    }) {
        areas.insert(Area::Web);
    }

    if areas.is_empty() {
        areas.insert(Area::Misc);
    }
    areas
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_records(name: &str, records: &[DnsRecord]) -> AreaSet {
        let refs: Vec<&DnsRecord> = records.iter().collect();
        classify(&NormalizedName::new(name), &refs, &HashSet::new())
    }

    #[test]
    fn email_markers_in_names_and_txt() {
        let areas = classify_records("_dmarc.example.com", &[]);
        assert!(areas.contains(Area::Email));

        let areas = classify_records(
            "example.com",
            &[DnsRecord::new("@", Type::TXT, "\"V=SPF1 include:_spf.example.net ~all\"")],
        );
        assert_eq!(areas.iter().collect::<Vec<_>>(), [Area::Email]);

        let areas = classify_records("example.com", &[DnsRecord::new("@", Type::TXT, "hello")]);
        assert_eq!(areas.iter().collect::<Vec<_>>(), [Area::Misc]);
    }

    #[test]
    fn areas_are_additive() {
        let areas = classify_records(
            "example.com",
            &[
                DnsRecord::new("@", Type::MX, "10 mail.example.com"),
                DnsRecord::new("@", Type::NS, "ns1.example.net"),
                DnsRecord::new("@", Type::A, "192.0.2.1"),
            ],
        );
        assert_eq!(
            areas.iter().collect::<Vec<_>>(),
            [Area::Email, Area::Web, Area::Infra]
        );
        assert_eq!(areas.primary(), Area::Email);
    }

    #[test]
    fn email_path_membership_marks_email() {
        let mut path = HashSet::new();
        path.insert(NormalizedName::new("mail.example.com"));
        let record = DnsRecord::new("mail", Type::A, "192.0.2.25");
        let areas = classify(&NormalizedName::new("mail.example.com"), &[&record], &path);
        assert!(areas.contains(Area::Email));
        assert!(areas.contains(Area::Web));
    }

    #[test]
    fn every_name_gets_an_area() {
        let areas = classify_records("x.example.com", &[DnsRecord::new("x", Type::LOC, "")]);
        assert_eq!(areas.len(), 1);
        assert_eq!(areas.primary(), Area::Misc);
    }
}
