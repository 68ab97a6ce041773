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

//! The per-zone-view session, which owns all state that outlives a
//! single topology build.
//!
//! A [`TopologySession`] holds the current record set, the build
//! options, the enrichment cache and epoch, the memoized build, the
//! render state, and the viewport. The host drives it:
//!
//! 1. [`TopologySession::set_records`] whenever its record list may
//!    have changed. The session fingerprints the records and, if they
//!    really changed, starts a new epoch with an empty cache.
//! 2. [`TopologySession::topology`] to get the (memoized) build.
//! 3. [`TopologySession::begin_enrichment`], then the lookups of the
//!    returned round, then [`TopologySession::complete_enrichment`].
//!    ([`TopologySession::enrich`] does all three.) Results from a
//!    round that began in an earlier epoch are discarded.
//! 4. Optionally [`TopologySession::check_services`], which requests
//!    the hosts of detected services over HTTP(S) and attaches the
//!    results to the summary.
//! 5. [`TopologySession::render`] with the host's renderer, which also
//!    feeds the rendered bounds to the viewport.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use sha2::{Digest, Sha256};

use crate::export::{export, ExportError, ExportFormat};
use crate::external::reachability::check_hosts;
use crate::external::{
    EnrichmentCache, EnrichmentResults, EnrichmentRound, Epoch, ExternalResolver, Lookup,
    Reachability, ReachabilityResults, ServiceReachability,
};
use crate::graph::{missing_terminals, Topology, TopologyBuilder, TopologyOptions};
use crate::name::NormalizedName;
use crate::record::DnsRecord;
use crate::render::{RenderState, Rendered, Renderer};
use crate::service::ServiceMatcher;
use crate::viewport::{Annotation, Size, ViewportController};

/// A SHA-256 fingerprint of a zone name and record set.
type Fingerprint = [u8; 32];

/// What a memoized build was built from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct MemoKey {
    fingerprint: Fingerprint,
    options: TopologyOptions,
    cache_generation: u64,
    services_generation: u64,
    reachability_generation: u64,
}

/// The state of one zone view.
pub struct TopologySession {
    zone: String,
    records: Vec<DnsRecord>,
    fingerprint: Fingerprint,
    options: TopologyOptions,
    services: ServiceMatcher,
    services_generation: u64,
    epoch: Epoch,
    cache: EnrichmentCache,
    cache_generation: u64,
    in_flight: HashSet<NormalizedName>,
    reachability: ReachabilityResults,
    reachability_generation: u64,
    memo: Option<(MemoKey, Topology)>,
    render: RenderState,
    viewport: ViewportController,
}

impl TopologySession {
    /// Creates a session for `zone` with no records.
    pub fn new(zone: &str, options: TopologyOptions, viewport: Size) -> Self {
        Self {
            zone: zone.to_owned(),
            records: Vec::new(),
            fingerprint: fingerprint(zone, &[]),
            options,
            services: ServiceMatcher::new(),
            services_generation: 0,
            epoch: Epoch::default(),
            cache: EnrichmentCache::new(),
            cache_generation: 0,
            in_flight: HashSet::new(),
            reachability: ReachabilityResults::new(),
            reachability_generation: 0,
            memo: None,
            render: RenderState::new(),
            viewport: ViewportController::new(viewport),
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn records(&self) -> &[DnsRecord] {
        &self.records
    }

    pub fn options(&self) -> TopologyOptions {
        self.options
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    /// Returns the reachability results. They are keyed by host and
    /// survive record changes.
    pub fn reachability(&self) -> &ReachabilityResults {
        &self.reachability
    }

    /// Replaces the record set. If the records differ from the current
    /// ones, a new epoch begins: the enrichment cache is dropped, and
    /// the results of rounds already in flight will be discarded.
    /// Returns whether the records changed.
    pub fn set_records(&mut self, records: Vec<DnsRecord>) -> bool {
        let fingerprint = fingerprint(&self.zone, &records);
        if fingerprint == self.fingerprint {
            return false;
        }
        self.records = records;
        self.fingerprint = fingerprint;
        self.epoch = self.epoch.next();
        self.cache = EnrichmentCache::new();
        self.cache_generation = 0;
        self.in_flight.clear();
        self.memo = None;
        debug!(
            "The records of {} changed ({} record(s)); now in epoch {:?}.",
            self.zone,
            self.records.len(),
            self.epoch,
        );
        true
    }

    pub fn set_options(&mut self, options: TopologyOptions) {
        self.options = options;
    }

    /// Replaces the service patterns.
    pub fn set_services(&mut self, services: ServiceMatcher) {
        self.services = services;
        self.services_generation += 1;
    }

    /// Returns the topology of the current records and options,
    /// building it only if something it depends on has changed.
    pub fn topology(&mut self) -> &Topology {
        let key = MemoKey {
            fingerprint: self.fingerprint,
            options: self.options,
            cache_generation: self.cache_generation,
            services_generation: self.services_generation,
            reachability_generation: self.reachability_generation,
        };
        if matches!(&self.memo, Some((memo_key, _)) if *memo_key != key) {
            self.memo = None;
        }
        let (_, topology) = self.memo.get_or_insert_with(|| {
            let topology = TopologyBuilder::new(&self.records, &self.zone, self.options)
                .services(&self.services)
                .external(&self.cache)
                .reachability(&self.reachability)
                .build();
            (key, topology)
        });
        topology
    }

    ////////////////////////////////////////////////////////////////////
    // ENRICHMENT                                                     //
    ////////////////////////////////////////////////////////////////////

    /// Starts an enrichment round for the dead-end names that are
    /// neither cached nor already in flight. Returns [`None`] if there
    /// is nothing to look up.
    pub fn begin_enrichment(&mut self) -> Option<EnrichmentRound> {
        let terminals = missing_terminals(&self.records, &self.zone, self.options.max_hops);
        let names: Vec<NormalizedName> = self
            .cache
            .missing(&terminals)
            .into_iter()
            .filter(|name| !self.in_flight.contains(name))
            .collect();
        if names.is_empty() {
            return None;
        }
        self.in_flight.extend(names.iter().cloned());
        Some(EnrichmentRound::new(self.epoch, names))
    }

    /// Merges the results of a round into the cache. Results from an
    /// earlier epoch are discarded. Returns whether the results were
    /// accepted.
    pub fn complete_enrichment(&mut self, results: EnrichmentResults) -> bool {
        if results.epoch() != self.epoch {
            debug!(
                "Discarding {} stale external resolution(s) from epoch {:?} (now {:?}).",
                results.resolutions().len(),
                results.epoch(),
                self.epoch,
            );
            return false;
        }
        for resolution in results.resolutions() {
            self.in_flight.remove(resolution.name());
        }
        if self.cache.merge(results.into_resolutions()) > 0 {
            self.cache_generation += 1;
        }
        true
    }

    /// Runs one complete enrichment round with `resolver`. Returns
    /// whether new results were accepted.
    pub async fn enrich<L: Lookup + 'static>(
        &mut self,
        resolver: &Arc<ExternalResolver<L>>,
    ) -> bool {
        let Some(round) = self.begin_enrichment() else {
            return false;
        };
        let results = resolver.run_round(round).await;
        self.complete_enrichment(results)
    }

    ////////////////////////////////////////////////////////////////////
    // SERVICE REACHABILITY                                           //
    ////////////////////////////////////////////////////////////////////

    /// Returns the hosts of the detected services that have not been
    /// checked yet, in summary order.
    pub fn unchecked_service_hosts(&mut self) -> Vec<NormalizedName> {
        let topology = self.topology();
        let hosts: Vec<NormalizedName> = topology
            .summary
            .detected_services
            .iter()
            .flat_map(|detected| detected.hosts.iter().cloned())
            .collect();
        self.reachability.missing(&hosts)
    }

    /// Records reachability results. Returns whether any were new.
    pub fn complete_service_checks(&mut self, results: Vec<ServiceReachability>) -> bool {
        if self.reachability.merge(results) == 0 {
            return false;
        }
        self.reachability_generation += 1;
        true
    }

    /// Checks every unchecked service host with `checker`. Returns
    /// whether new results were recorded.
    pub async fn check_services<R: Reachability + 'static>(&mut self, checker: &Arc<R>) -> bool {
        let hosts = self.unchecked_service_hosts();
        if hosts.is_empty() {
            return false;
        }
        let results = check_hosts(checker, &hosts).await;
        self.complete_service_checks(results)
    }

    ////////////////////////////////////////////////////////////////////
    // RENDERING AND PRESENTATION                                     //
    ////////////////////////////////////////////////////////////////////

    /// Renders the current diagram. On success, the viewport learns the
    /// new diagram bounds; on failure, the last good output stays in
    /// place and the error is available from
    /// [`TopologySession::render_state`].
    pub fn render(&mut self, renderer: &impl Renderer) -> Option<&Rendered> {
        let source = self.topology().diagram_source.clone();
        let bounds = self.render.update(renderer, &source).map(|rendered| rendered.bounds);
        if let Some(bounds) = bounds {
            self.viewport.set_content_bounds(bounds);
        }
        bounds.and(self.render.rendered())
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    /// Exports the current diagram with the viewport's annotations.
    pub fn export(&mut self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        let source = self.topology().diagram_source.clone();
        let annotations: Vec<Annotation> = self.viewport.annotations().cloned().collect();
        let title = format!("{} topology", self.zone);
        export(format, &title, &source, self.render.rendered(), &annotations)
    }
}

/// Computes the fingerprint of a zone and its records. Every field of
/// every record contributes, in order.
fn fingerprint(zone: &str, records: &[DnsRecord]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(zone.as_bytes());
    hasher.update([0]);
    for record in records {
        for field in [&record.id, &record.name, &record.content] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(u16::from(record.rr_type).to_be_bytes());
        hasher.update(record.ttl.to_be_bytes());
        match record.priority {
            Some(priority) => {
                hasher.update([1]);
                hasher.update(priority.to_be_bytes());
            }
            None => hasher.update([0]),
        }
        hasher.update([match record.proxied {
            None => 0,
            Some(false) => 1,
            Some(true) => 2,
        }]);
    }
    hasher.finalize().into()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::external::reachability::tests::StaticReachability;
    use crate::external::tests::StaticLookup;
    use crate::external::{ResolverOptions, Source};
    use crate::graph::NodeSummary;
    use crate::record::Type;
    use crate::render::RenderError;

    fn records() -> Vec<DnsRecord> {
        vec![
            DnsRecord::new("www", Type::CNAME, "edge.cdn.test"),
            DnsRecord::new("api", Type::A, "192.0.2.1"),
        ]
    }

    fn session() -> TopologySession {
        let mut session = TopologySession::new(
            "example.com",
            TopologyOptions::default(),
            Size::new(800.0, 600.0),
        );
        session.set_records(records());
        session
    }

    #[test]
    fn unchanged_records_keep_the_epoch() {
        let mut session = session();
        let epoch = session.epoch();
        assert!(!session.set_records(records()));
        assert_eq!(session.epoch(), epoch);

        let mut changed = records();
        changed[1].ttl = 300;
        assert!(session.set_records(changed));
        assert_eq!(session.epoch(), epoch.next());
    }

    #[test]
    fn builds_are_memoized() {
        let mut session = session();
        let first = session.topology().diagram_source.clone();
        let second = session.topology().diagram_source.clone();
        assert_eq!(first, second);

        session.set_options(TopologyOptions {
            dark_mode: true,
            ..TopologyOptions::default()
        });
        assert_ne!(session.topology().diagram_source, first);
    }

    #[test]
    fn rounds_are_deduplicated_against_cache_and_in_flight() {
        let mut session = session();
        let round = session.begin_enrichment().unwrap();
        assert_eq!(round.names(), [NormalizedName::new("edge.cdn.test")]);
        assert_eq!(round.epoch(), session.epoch());
        assert!(session.begin_enrichment().is_none());
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut session = session();
        let round = session.begin_enrichment().unwrap();
        let mut changed = records();
        changed.push(DnsRecord::new("blog", Type::CNAME, "edge.cdn.test"));
        session.set_records(changed);

        let results = EnrichmentResults::new(round.epoch(), Vec::new());
        assert!(!session.complete_enrichment(results));
        assert!(session.cache().is_empty());
        // The name is requested again in the new epoch.
        assert!(session.begin_enrichment().is_some());
    }

    fn www_summary(session: &mut TopologySession) -> NodeSummary {
        session
            .topology()
            .summary
            .node_summaries
            .iter()
            .find(|summary| summary.label == "www")
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn enrichment_completes_the_topology() {
        let lookup = StaticLookup::default().answer("edge.cdn.test", Type::A, &["198.51.100.4"]);
        let resolver = Arc::new(ExternalResolver::new(lookup, ResolverOptions::default()));
        let mut session = session();

        let before = www_summary(&mut session).source;
        assert_eq!(before, Some(Source::None));
        assert!(session.enrich(&resolver).await);
        assert_eq!(session.cache().len(), 1);
        assert!(!session.enrich(&resolver).await);

        let www = www_summary(&mut session);
        assert_eq!(www.source, Some(Source::External));
        assert_eq!(www.resolution.unwrap().ipv4, ["198.51.100.4"]);
    }

    #[tokio::test]
    async fn service_checks_are_attached_once() {
        let mut session = session();
        let mut changed = records();
        changed.push(DnsRecord::new("shop", Type::CNAME, "shops.myshopify.com"));
        session.set_records(changed);
        assert_eq!(
            session.unchecked_service_hosts(),
            [NormalizedName::new("shops.myshopify.com")]
        );

        let checker = Arc::new(StaticReachability::default().up("https://shops.myshopify.com"));
        assert!(session.check_services(&checker).await);
        assert!(!session.check_services(&checker).await);
        assert_eq!(checker.requests.load(Ordering::Relaxed), 2);
        assert!(session.unchecked_service_hosts().is_empty());

        let detected = &session.topology().summary.detected_services[0];
        assert_eq!(detected.service, "Shopify");
        let result = &detected.reachability[0];
        assert!(result.https_up);
        assert!(!result.http_up);
    }

    #[test]
    fn render_feeds_the_viewport_and_keeps_last_good_output() {
        let mut session = session();
        let good = |source: &str| -> Result<Rendered, RenderError> {
            Ok(Rendered {
                svg: source.to_owned(),
                png: None,
                bounds: Size::new(1600.0, 600.0),
            })
        };
        let bad = |_: &str| -> Result<Rendered, RenderError> {
            Err(RenderError::Rejected("parse error".into()))
        };

        assert!(session.render(&good).is_some());
        assert!((session.viewport().state().zoom - 0.5).abs() < 1e-9);
        assert!(session.render(&bad).is_none());
        assert!(session.render_state().error().is_some());
        assert!(session.render_state().rendered().is_some());

        let html = session.export(ExportFormat::Html).unwrap();
        assert!(String::from_utf8(html).unwrap().contains("example.com topology"));
    }
}
