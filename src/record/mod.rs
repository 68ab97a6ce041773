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

//! DNS records as supplied by a hosted DNS provider, and extraction of
//! the names and addresses they point at.
//!
//! Records arrive in "presentation" form: the RDATA is a single text
//! field (`content`) whose layout depends on the RR type. Some
//! providers split the MX/SRV priority into a separate field, so the
//! helpers here accept both layouts.

use serde::{Deserialize, Serialize};

use crate::name::NormalizedName;
use crate::util::canonical_address;

mod rr_type;
pub use rr_type::Type;

/// A single DNS record for one zone.
///
/// The engine treats records as read-only input; nothing here is ever
/// written back to the provider.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct DnsRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rr_type: Type,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
}

/// The TTL value hosted providers use to mean "automatic".
fn default_ttl() -> u32 {
    1
}

impl DnsRecord {
    /// Creates a record with an empty ID, an automatic TTL, and no
    /// priority or proxy setting.
    pub fn new(name: impl Into<String>, rr_type: Type, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            rr_type,
            content: content.into(),
            ttl: default_ttl(),
            priority: None,
            proxied: None,
        }
    }

    /// Sets the separate priority field.
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Returns whether the record is too malformed to take part in the
    /// topology (an empty owner is fine, since that denotes the apex).
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Extracts the single name or address this record points at, if
    /// any. See [`Target`].
    pub fn target(&self, zone: &NormalizedName) -> Option<Target> {
        let content = self.content.trim();
        if content.is_empty() {
            return None;
        }
        match self.rr_type {
            Type::A | Type::AAAA => Some(Target::Address(canonical_address(content))),
            Type::CNAME | Type::NS | Type::PTR => host_target(content, zone),
            Type::MX => parse_mx(content, self.priority)
                .and_then(|mx| host_target(&mx.exchange, zone)),
            Type::SRV => srv_target(content, self.priority).and_then(|t| host_target(t, zone)),
            _ => None,
        }
    }
}

/// The thing a record points at.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Target {
    /// A literal IPv4 or IPv6 address (A/AAAA records).
    Address(String),

    /// A hostname (CNAME, NS, MX, SRV, PTR records).
    Host(NormalizedName),
}

fn host_target(raw: &str, zone: &NormalizedName) -> Option<Target> {
    let name = NormalizedName::target(raw, zone);
    // An empty name here means the RDATA was "." (e.g. a null MX or an
    // SRV record declaring the service unavailable).
    if name.is_empty() {
        None
    } else {
        Some(Target::Host(name))
    }
}

/// The parsed RDATA of an MX record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mx {
    /// The preference value, or [`None`] if it was not numeric or not
    /// present at all.
    pub priority: Option<u16>,

    /// The exchange hostname, as written.
    pub exchange: String,
}

/// Parses MX content. The first whitespace-delimited token is the
/// priority and the remainder is the exchange. If there is only one
/// token, it is the exchange and `priority_field` supplies the
/// priority. A non-numeric priority is treated as absent.
pub fn parse_mx(content: &str, priority_field: Option<u16>) -> Option<Mx> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }
    match content.split_once(char::is_whitespace) {
        Some((priority, exchange)) => Some(Mx {
            priority: priority.parse().ok(),
            exchange: exchange.trim().to_owned(),
        }),
        None => Some(Mx {
            priority: priority_field,
            exchange: content.to_owned(),
        }),
    }
}

/// Extracts the target of SRV content. In the full presentation form
/// (`priority weight port target`) this is the token after the first
/// three fields. Providers that split the priority out give only
/// `weight port target`, in which case the third token is used.
pub fn srv_target(content: &str, priority_field: Option<u16>) -> Option<&str> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    match fields.len() {
        n if n >= 4 => Some(fields[3]),
        3 if priority_field.is_some() => Some(fields[2]),
        _ => None,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> NormalizedName {
        NormalizedName::new("example.com")
    }

    #[test]
    fn mx_priority_and_exchange_are_split() {
        let mx = parse_mx("10 mail.example.com.", None).unwrap();
        assert_eq!(mx.priority, Some(10));
        assert_eq!(mx.exchange, "mail.example.com.");
    }

    #[test]
    fn mx_non_numeric_priority_is_absent() {
        let mx = parse_mx("high mail.example.com", Some(5)).unwrap();
        assert_eq!(mx.priority, None);
        assert_eq!(mx.exchange, "mail.example.com");
    }

    #[test]
    fn mx_single_token_uses_priority_field() {
        let mx = parse_mx("mx1.example.net", Some(20)).unwrap();
        assert_eq!(mx.priority, Some(20));
        assert_eq!(mx.exchange, "mx1.example.net");
    }

    #[test]
    fn srv_target_handles_both_layouts() {
        assert_eq!(srv_target("0 5 5060 sip.example.com", None), Some("sip.example.com"));
        assert_eq!(srv_target("5 5060 sip.example.com", Some(0)), Some("sip.example.com"));
        assert_eq!(srv_target("5 5060", None), None);
    }

    #[test]
    fn record_targets_by_type() {
        let cname = DnsRecord::new("www", Type::CNAME, "Edge.Example.NET.");
        assert_eq!(
            cname.target(&zone()),
            Some(Target::Host(NormalizedName::new("edge.example.net")))
        );

        let a = DnsRecord::new("www", Type::A, " 192.0.2.1 ");
        assert_eq!(a.target(&zone()), Some(Target::Address("192.0.2.1".into())));

        let mx = DnsRecord::new("@", Type::MX, "10 @");
        assert_eq!(
            mx.target(&zone()),
            Some(Target::Host(NormalizedName::new("example.com")))
        );

        let txt = DnsRecord::new("@", Type::TXT, "v=spf1 -all");
        assert_eq!(txt.target(&zone()), None);
    }

    #[test]
    fn null_targets_are_ignored() {
        let null_mx = DnsRecord::new("@", Type::MX, "0 .");
        assert_eq!(null_mx.target(&zone()), None);
        let empty = DnsRecord::new("www", Type::CNAME, "  ");
        assert_eq!(empty.target(&zone()), None);
    }

    #[test]
    #[cfg(feature = "doh")]
    fn records_deserialize_from_provider_json() {
        let json = r#"{"id":"r1","name":"www.example.com","type":"cname",
                       "content":"example.com","ttl":300,"proxied":true}"#;
        let record: DnsRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.rr_type, Type::CNAME);
        assert_eq!(record.proxied, Some(true));
        assert_eq!(record.priority, None);
    }
}
