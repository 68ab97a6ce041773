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

//! A [`Lookup`] implementation sending conventional DNS queries over
//! UDP/TCP port 53 to a single recursive server.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use log::trace;

use super::{Lookup, LookupError};
use crate::name::NormalizedName;
use crate::record::Type;
use crate::util::push_unique;

/// The recursive server used when none is configured.
pub const DEFAULT_DNS_SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));

/// The DNS port.
pub const DNS_PORT: u16 = 53;

/// The resolver's own per-attempt timeout. The external resolver's
/// timeout still bounds each query as a whole.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// A plain DNS client for one recursive server.
#[derive(Clone)]
pub struct DnsLookup {
    resolver: TokioAsyncResolver,
    server: IpAddr,
}

impl DnsLookup {
    /// Creates a client for `server`. Nothing is sent until the first
    /// query.
    pub fn new(server: IpAddr) -> Self {
        let servers = NameServerConfigGroup::from_ips_clear(&[server], DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, Vec::new(), servers);
        let mut options = ResolverOpts::default();
        options.timeout = ATTEMPT_TIMEOUT;
        options.attempts = 1;
        // Every answer is wanted exactly as the server gives it.
        options.cache_size = 0;
        Self {
            resolver: TokioAsyncResolver::tokio(config, options),
            server,
        }
    }

    pub fn server(&self) -> IpAddr {
        self.server
    }
}

impl Default for DnsLookup {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_SERVER)
    }
}

impl std::fmt::Debug for DnsLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DnsLookup").field("server", &self.server).finish()
    }
}

impl Lookup for DnsLookup {
    fn query(
        &self,
        name: &str,
        rr_type: Type,
    ) -> impl Future<Output = Result<Vec<String>, LookupError>> + Send {
        let resolver = self.resolver.clone();
        let server = self.server;
        // A fully qualified name keeps the resolver from appending
        // search domains.
        let fqdn = format!("{}.", name.trim_end_matches('.'));
        let wanted = RecordType::from(u16::from(rr_type));

        async move {
            let lookup = match resolver.lookup(fqdn.as_str(), wanted).await {
                Ok(lookup) => lookup,
                Err(e) => return no_records_or_error(e),
            };

            let mut out = Vec::new();
            for rdata in lookup.iter().filter(|rdata| rdata.record_type() == wanted) {
                if let Some(value) = presentation(&rdata.to_string(), rr_type) {
                    push_unique(&mut out, value);
                }
            }
            trace!("{} answered {} {} with {} record(s).", server, fqdn, rr_type, out.len());
            Ok(out)
        }
    }
}

/// Converts the text of one answer into the form the [`Lookup`] trait
/// promises: hostnames normalized, everything else trimmed.
fn presentation(data: &str, rr_type: Type) -> Option<String> {
    let data = data.trim();
    let value: String = match rr_type {
        Type::CNAME | Type::PTR => NormalizedName::new(data).into(),
        _ => data.to_owned(),
    };
    Some(value).filter(|value| !value.is_empty())
}

/// Maps a resolver error. A negative answer is an empty answer, not an
/// error.
fn no_records_or_error(error: ResolveError) -> Result<Vec<String>, LookupError> {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
        ResolveErrorKind::Timeout => Err(LookupError::Timeout),
        _ => Err(LookupError::Transport(error.to_string())),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_are_put_in_presentation_form() {
        assert_eq!(
            presentation("Edge.CDN.Example.NET.", Type::CNAME).as_deref(),
            Some("edge.cdn.example.net")
        );
        assert_eq!(presentation(" 192.0.2.1 ", Type::A).as_deref(), Some("192.0.2.1"));
        assert_eq!(presentation(".", Type::PTR), None);
        assert_eq!(presentation("", Type::A), None);
    }

    #[test]
    fn resolver_errors_are_mapped() {
        let timeout = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(no_records_or_error(timeout), Err(LookupError::Timeout));
        let other = ResolveError::from(ResolveErrorKind::Message("refused"));
        assert!(matches!(no_records_or_error(other), Err(LookupError::Transport(_))));
    }

    #[tokio::test]
    async fn lookups_remember_their_server() {
        let lookup = DnsLookup::new("9.9.9.9".parse().unwrap());
        assert_eq!(lookup.server(), IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)));
        assert_eq!(DnsLookup::default().server(), DEFAULT_DNS_SERVER);
    }
}
