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

//! The external fallback resolver.
//!
//! When local resolution ends at a name with no in-zone addresses (the
//! usual case for CNAMEs pointing at third-party infrastructure), the
//! [`ExternalResolver`] follows the chain further with out-of-band DNS
//! queries. The queries themselves are made through the [`Lookup`]
//! trait. The `dns` module provides a plain DNS implementation and the
//! `doh` module a DNS-over-HTTPS one; a [`FallbackLookup`] combines
//! the two.
//!
//! Every query is best-effort. A query that fails or times out is
//! treated as an empty answer, and the failure is recorded in the
//! [`ExternalResolution::error`] field rather than propagated.
//!
//! Results are kept in an [`EnrichmentCache`], and lookups are grouped
//! into [`EnrichmentRound`]s tagged with an [`Epoch`] so that stale
//! results can be recognized and discarded when they arrive.
//!
//! The [`reachability`] module checks whether the hosts behind detected
//! services answer over HTTP.

use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;
use tokio::time::timeout;

use crate::name::{reverse_lookup_name, NormalizedName};
use crate::record::Type;
use crate::resolve::{HopLimit, Resolution};
use crate::util::push_unique;

mod cache;
#[cfg(feature = "dns")]
pub mod dns;
#[cfg(feature = "doh")]
pub mod doh;
mod enrich;
mod error;
mod fallback;
pub mod reachability;
pub use cache::EnrichmentCache;
pub use enrich::{EnrichmentResults, EnrichmentRound, Epoch, ROUND_PARALLELISM};
pub use error::LookupError;
pub use fallback::FallbackLookup;
pub use reachability::{Reachability, ReachabilityResults, ServiceReachability};

/// The error recorded on a resolution that found nothing at all.
pub const UNRESOLVED_MESSAGE: &str = "no CNAME/A/AAAA records found";

////////////////////////////////////////////////////////////////////////
// RESOLUTION RESULTS                                                 //
////////////////////////////////////////////////////////////////////////

/// Where the addresses of a resolved name came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// In-zone A/AAAA records.
    Local,

    /// Out-of-band DNS queries.
    External,

    /// Nowhere: no addresses were found.
    None,
}

/// The PTR hostnames found for one address.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReverseHostnames {
    pub ip: String,
    pub hostnames: Vec<NormalizedName>,
}

/// The result of resolving a name with out-of-band queries.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExternalResolution {
    #[serde(flatten)]
    pub resolution: Resolution,

    /// PTR hostnames of the resolved addresses. Empty unless reverse
    /// lookups are enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverse_hostnames: Vec<ReverseHostnames>,

    /// Always [`Source::External`].
    pub source: Source,

    /// The first lookup failure encountered, or [`UNRESOLVED_MESSAGE`]
    /// if nothing at all was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExternalResolution {
    /// Returns the name that was resolved.
    pub fn name(&self) -> &NormalizedName {
        self.resolution
            .chain
            .first()
            .unwrap_or(&self.resolution.terminal)
    }

    /// Returns whether any addresses were found.
    pub fn has_addresses(&self) -> bool {
        self.resolution.has_addresses()
    }
}

////////////////////////////////////////////////////////////////////////
// LOOKUPS                                                            //
////////////////////////////////////////////////////////////////////////

/// A source of out-of-band DNS answers.
pub trait Lookup: Send + Sync {
    /// Queries `name` for records of type `rr_type` and returns the
    /// RDATA of each answer in presentation form. An empty vector means
    /// the name has no such records.
    fn query(
        &self,
        name: &str,
        rr_type: Type,
    ) -> impl Future<Output = Result<Vec<String>, LookupError>> + Send;
}

/// Options for the [`ExternalResolver`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResolverOptions {
    pub max_hops: HopLimit,
    pub timeout: Duration,
    pub reverse_lookups: bool,
}

impl ResolverOptions {
    pub const MIN_TIMEOUT_MS: u64 = 250;
    pub const MAX_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_TIMEOUT_MS: u64 = 1200;

    /// Converts a per-query timeout in milliseconds, clamping it into
    /// the supported range.
    pub fn timeout_from_millis(ms: u64) -> Duration {
        Duration::from_millis(ms.clamp(Self::MIN_TIMEOUT_MS, Self::MAX_TIMEOUT_MS))
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_hops: HopLimit::default(),
            timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
            reverse_lookups: false,
        }
    }
}

/// Resolves names with out-of-band queries through a [`Lookup`].
#[derive(Debug)]
pub struct ExternalResolver<L> {
    lookup: L,
    options: ResolverOptions,
}

impl<L: Lookup> ExternalResolver<L> {
    /// Creates a new resolver.
    pub fn new(lookup: L, options: ResolverOptions) -> Self {
        Self { lookup, options }
    }

    /// Returns the resolver's options.
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves `name`.
    ///
    /// The CNAME chain is followed one query at a time, bounded by the
    /// hop limit and stopped on a repeated name, exactly as in local
    /// resolution. The final name is then queried for A and AAAA
    /// records concurrently. This never fails: the outcome of failed
    /// queries is an empty answer plus an `error` annotation.
    pub async fn resolve(&self, name: &NormalizedName) -> ExternalResolution {
        let mut first_error = None;
        let mut chain = vec![name.clone()];
        let mut seen = HashSet::new();
        seen.insert(name.clone());
        let mut current = name.clone();

        for _ in 0..self.options.max_hops.get() {
            let next = match self.query(&current, Type::CNAME).await {
                Ok(answers) => answers
                    .iter()
                    .map(|answer| NormalizedName::new(answer))
                    .find(|answer| !answer.is_empty()),
                Err(e) => {
                    note_error(&mut first_error, &current, Type::CNAME, e);
                    None
                }
            };
            match next {
                Some(next) if !seen.contains(&next) => {
                    seen.insert(next.clone());
                    chain.push(next.clone());
                    current = next;
                }
                _ => break,
            }
        }

        let (v4_answers, v6_answers) = tokio::join!(
            self.query(&current, Type::A),
            self.query(&current, Type::AAAA)
        );
        let ipv4 = addresses(v4_answers, &mut first_error, &current, Type::A, IpAddr::is_ipv4);
        let ipv6 = addresses(v6_answers, &mut first_error, &current, Type::AAAA, IpAddr::is_ipv6);

        let reverse_hostnames = if self.options.reverse_lookups {
            self.reverse_hostnames(ipv4.iter().chain(ipv6.iter())).await
        } else {
            Vec::new()
        };

        let unresolved = chain.len() <= 1 && ipv4.is_empty() && ipv6.is_empty();
        let error = match first_error {
            Some(e) => Some(e.to_string()),
            None if unresolved => Some(UNRESOLVED_MESSAGE.to_owned()),
            None => None,
        };
        trace!("Externally resolved {} to {} via {} hop(s).", name, current, chain.len() - 1);

        ExternalResolution {
            resolution: Resolution {
                chain,
                terminal: current,
                ipv4,
                ipv6,
            },
            reverse_hostnames,
            source: Source::External,
            error,
        }
    }

    /// Performs a single query, subject to the configured timeout.
    async fn query(&self, name: &str, rr_type: Type) -> Result<Vec<String>, LookupError> {
        match timeout(self.options.timeout, self.lookup.query(name, rr_type)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout),
        }
    }

    /// Looks up PTR hostnames for each of `ips`. Failures are ignored.
    async fn reverse_hostnames<'a>(
        &self,
        ips: impl Iterator<Item = &'a String>,
    ) -> Vec<ReverseHostnames> {
        let mut out = Vec::new();
        for ip in ips {
            let Ok(parsed) = ip.parse::<IpAddr>() else {
                continue;
            };
            let reverse_name = reverse_lookup_name(parsed);
            let Ok(answers) = self.query(&reverse_name, Type::PTR).await else {
                continue;
            };
            let mut hostnames = Vec::new();
            for answer in answers {
                let host = NormalizedName::new(&answer);
                if !host.is_empty() {
                    push_unique(&mut hostnames, host);
                }
            }
            if !hostnames.is_empty() {
                out.push(ReverseHostnames {
                    ip: ip.clone(),
                    hostnames,
                });
            }
        }
        out
    }
}

/// Records `error` as the first error of a resolution, unless one was
/// already recorded.
fn note_error(first_error: &mut Option<LookupError>, name: &str, rr_type: Type, error: LookupError) {
    debug!("External {} lookup for {} failed: {}", rr_type, name, error);
    first_error.get_or_insert(error);
}

/// Extracts the distinct addresses of the wanted family from a query
/// result. Answers that are not addresses (e.g. a CNAME included in an
/// A response) are skipped.
fn addresses(
    answers: Result<Vec<String>, LookupError>,
    first_error: &mut Option<LookupError>,
    name: &str,
    rr_type: Type,
    family: fn(&IpAddr) -> bool,
) -> Vec<String> {
    let mut out = Vec::new();
    match answers {
        Ok(answers) => {
            for answer in answers {
                if let Ok(ip) = answer.trim().parse::<IpAddr>() {
                    if family(&ip) {
                        push_unique(&mut out, ip.to_string());
                    }
                }
            }
        }
        Err(e) => note_error(first_error, name, rr_type, e),
    }
    out
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
