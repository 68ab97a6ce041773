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

//! The graph builder, which ties the other components together.
//!
//! One build takes a record set and a [`TopologyOptions`] and produces
//! a [`Topology`]: the relationship [`Graph`], the Mermaid source for
//! it, and a [`TopologySummary`]. A build is a pure function of its
//! inputs plus (optionally) an [`EnrichmentCache`]; given the same
//! inputs it produces byte-identical output. To that end nothing here
//! iterates over a hash map; every output order derives from the order
//! of the records or from sorted maps.
//!
//! # Graph shape
//!
//! * A single *zone* node.
//! * One *record* node ("unit") per record, except that the A records
//!   of a name are aggregated into one unit, as are its AAAA records.
//!   Every unit hangs off the zone node.
//! * *Hostname* and *address* nodes for everything the records point
//!   at. Hostname targets are traced through their CNAME chains, with
//!   alias edges between the hostnames of the chain and address edges
//!   from the terminal. Where the chain leaves the zone and an external
//!   resolution is cached, the chain continues with edges marked as
//!   external.
//! * *Service* nodes for hostnames matching a service fingerprint.
//!
//! Nodes are interned by `(kind, value)`, so a name referenced from any
//! number of records is a single node. Edges are deduplicated by
//! `(from, relation, to)`.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use serde::Serialize;

use crate::area::{classify, Area, AreaSet};
use crate::cluster::{shared_addresses, SharedIp};
use crate::diagram::render_mermaid;
use crate::external::{EnrichmentCache, ReachabilityResults, ServiceReachability, Source};
use crate::index::RecordIndex;
use crate::mx::{email_path_names, mx_trails, MxTrail};
use crate::name::NormalizedName;
use crate::record::{DnsRecord, Target, Type};
use crate::resolve::{HopLimit, Resolution};
use crate::service::ServiceMatcher;
use crate::util::canonical_address;

/// The note attached to names whose resolution found no addresses.
pub const NO_TERMINAL_ADDRESS: &str = "no terminal address found";

/// The minimum length of a CNAME chain (counting the starting name)
/// reported in the summary.
pub const MIN_REPORTED_CHAIN: usize = 3;

////////////////////////////////////////////////////////////////////////
// NODES AND EDGES                                                    //
////////////////////////////////////////////////////////////////////////

/// The kinds of graph nodes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Zone,
    Record,
    Hostname,
    Address,
    Service,
}

/// A node of the topology graph.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Node {
    /// The node's identifier, `n0`, `n1`, and so on in order of
    /// creation.
    pub id: String,
    pub kind: NodeKind,

    /// The value the node was interned under.
    pub value: String,
    pub label: String,

    /// For record nodes, the primary area of the owner name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<Area>,
}

/// The relationship an edge expresses.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Zone to record unit.
    Contains,

    /// Record unit to the name or address it points at.
    Target,

    /// One link of a CNAME chain.
    Alias,

    /// Terminal hostname to one of its addresses.
    Resolves,

    /// Hostname to the service it was fingerprinted as.
    Service,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Target => "target",
            Self::Alias => "alias",
            Self::Resolves => "resolves",
            Self::Service => "service",
        }
    }
}

/// An edge of the topology graph.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Edge {
    pub from: String,
    pub relation: Relation,
    pub to: String,

    /// Whether the edge came from external lookups rather than the
    /// zone's own records.
    pub external: bool,
}

/// The topology graph: nodes and edges in creation order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,

    #[serde(skip)]
    node_ids: HashMap<(NodeKind, String), usize>,
    #[serde(skip)]
    edge_keys: HashSet<(usize, Relation, usize)>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the node for `(kind, value)`, creating it
    /// with `label` if it does not exist yet. The label and area of an
    /// existing node are never changed.
    pub fn intern(
        &mut self,
        kind: NodeKind,
        value: &str,
        label: impl FnOnce() -> String,
        area: Option<Area>,
    ) -> usize {
        if let Some(&index) = self.node_ids.get(&(kind, value.to_owned())) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(Node {
            id: format!("n{}", index),
            kind,
            value: value.to_owned(),
            label: label(),
            area,
        });
        self.node_ids.insert((kind, value.to_owned()), index);
        index
    }

    /// Adds an edge unless an edge with the same endpoints and relation
    /// exists. Returns whether the edge was added.
    pub fn connect(&mut self, from: usize, relation: Relation, to: usize, external: bool) -> bool {
        if !self.edge_keys.insert((from, relation, to)) {
            return false;
        }
        self.edges.push(Edge {
            from: self.nodes[from].id.clone(),
            relation,
            to: self.nodes[to].id.clone(),
            external,
        });
        true
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Looks up the node interned under `(kind, value)`.
    pub fn node(&self, kind: NodeKind, value: &str) -> Option<&Node> {
        self.node_ids
            .get(&(kind, value.to_owned()))
            .map(|&index| &self.nodes[index])
    }

    /// Returns the edges leading into the node with the given ID.
    pub fn edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.to == id)
    }
}

////////////////////////////////////////////////////////////////////////
// SUMMARY                                                            //
////////////////////////////////////////////////////////////////////////

/// A CNAME chain worth reporting.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CnameChain {
    pub from: NormalizedName,
    pub chain: Vec<NormalizedName>,
    pub terminal: NormalizedName,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub source: Source,
}

/// A fingerprinted service and the hostnames that led to it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DetectedService {
    pub service: String,
    pub hosts: Vec<NormalizedName>,

    /// The reachability of those hosts that have been checked, in host
    /// order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reachability: Vec<ServiceReachability>,
}

/// The number of names in each area. A name with several areas counts
/// towards each of them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AreaCounts {
    pub email: usize,
    pub web: usize,
    pub infra: usize,
    pub misc: usize,
}

impl AreaCounts {
    fn add(&mut self, areas: AreaSet) {
        for area in areas.iter() {
            match area {
                Area::Email => self.email += 1,
                Area::Web => self.web += 1,
                Area::Infra => self.infra += 1,
                Area::Misc => self.misc += 1,
            }
        }
    }

    pub fn get(&self, area: Area) -> usize {
        match area {
            Area::Email => self.email,
            Area::Web => self.web,
            Area::Infra => self.infra,
            Area::Misc => self.misc,
        }
    }
}

/// Per-name information for tabular display.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: NormalizedName,

    /// The name relative to the zone (`@` for the apex).
    pub label: String,
    pub areas: AreaSet,

    /// The distinct record types at the name, in record order.
    pub record_types: Vec<String>,

    /// The resolution of the name, for names owning address or CNAME
    /// records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// The reachability of the terminal name, if it was checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachability: Option<ServiceReachability>,

    /// PTR hostnames of the name's externally found addresses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverse_hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

/// The structured summary of a topology build.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TopologySummary {
    pub cname_chains: Vec<CnameChain>,
    pub shared_ips: Vec<SharedIp>,
    pub detected_services: Vec<DetectedService>,
    pub mx_trails: Vec<MxTrail>,
    pub area_counts: AreaCounts,
    pub node_summaries: Vec<NodeSummary>,
}

////////////////////////////////////////////////////////////////////////
// BUILDING                                                           //
////////////////////////////////////////////////////////////////////////

/// The options of a topology build.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TopologyOptions {
    pub max_hops: HopLimit,
    pub dark_mode: bool,
}

/// The output of a topology build.
#[derive(Clone, Debug)]
pub struct Topology {
    pub diagram_source: String,
    pub summary: TopologySummary,
    pub graph: Graph,
}

/// Builds the topology of `records` in the zone `zone` with the
/// built-in service patterns and no external data.
pub fn build_topology(
    records: &[DnsRecord],
    zone: &str,
    max_hops: HopLimit,
    dark_mode: bool,
) -> Topology {
    TopologyBuilder::new(records, zone, TopologyOptions { max_hops, dark_mode }).build()
}

/// A configurable topology build.
#[derive(Clone, Debug)]
pub struct TopologyBuilder<'a> {
    records: &'a [DnsRecord],
    zone: &'a str,
    options: TopologyOptions,
    services: Option<&'a ServiceMatcher>,
    external: Option<&'a EnrichmentCache>,
    reachability: Option<&'a ReachabilityResults>,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(records: &'a [DnsRecord], zone: &'a str, options: TopologyOptions) -> Self {
        Self {
            records,
            zone,
            options,
            services: None,
            external: None,
            reachability: None,
        }
    }

    /// Uses `services` instead of the built-in service patterns.
    pub fn services(mut self, services: &'a ServiceMatcher) -> Self {
        self.services = Some(services);
        self
    }

    /// Completes dead-end resolutions with the results in `external`.
    pub fn external(mut self, external: &'a EnrichmentCache) -> Self {
        self.external = Some(external);
        self
    }

    /// Attaches the service reachability results in `reachability`.
    pub fn reachability(mut self, reachability: &'a ReachabilityResults) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Performs the build.
    pub fn build(self) -> Topology {
        let index = RecordIndex::build(self.records, self.zone);
        let services = match self.services {
            Some(services) => Cow::Borrowed(services),
            None => Cow::Owned(ServiceMatcher::new()),
        };
        let mut pass = Pass {
            index: &index,
            options: self.options,
            services: &services,
            external: self.external,
            reachability: self.reachability,
            graph: Graph::new(),
            areas: BTreeMap::new(),
            traced: HashSet::new(),
            detected: Vec::new(),
        };

        let trails = mx_trails(&index, self.options.max_hops, self.external);
        let email_paths = email_path_names(&trails);
        for name in index.names() {
            let areas = classify(name, index.records_at(name), &email_paths);
            pass.areas.insert(name.clone(), areas);
        }

        let units = pass.add_units();
        let summary = TopologySummary {
            cname_chains: pass.cname_chains(),
            shared_ips: shared_addresses(&index),
            detected_services: pass.detected_services(),
            mx_trails: trails,
            area_counts: pass.area_counts(),
            node_summaries: pass.node_summaries(),
        };
        let graph = pass.graph;
        let diagram_source = render_mermaid(&graph, self.options.dark_mode);

        debug!(
            "Built the topology of {} with {} unit(s), {} node(s), and {} edge(s).",
            index.zone(),
            units,
            graph.nodes().len(),
            graph.edges().len(),
        );
        Topology {
            diagram_source,
            summary,
            graph,
        }
    }
}

/// Returns the terminal names of the zone's hostname targets that have
/// no in-zone addresses: the names for which external resolution is
/// worthwhile. Each name appears once, in order of first appearance.
pub fn missing_terminals(
    records: &[DnsRecord],
    zone: &str,
    max_hops: HopLimit,
) -> Vec<NormalizedName> {
    let index = RecordIndex::build(records, zone);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in index.records() {
        let Some(Target::Host(host)) = record.target(index.zone()) else {
            continue;
        };
        let resolution = index.resolve(&host, max_hops);
        let terminal = resolution.terminal;
        if resolution.ipv4.is_empty()
            && resolution.ipv6.is_empty()
            && !terminal.is_ip_literal()
            && seen.insert(terminal.clone())
        {
            out.push(terminal);
        }
    }
    out
}

/// The state of one build.
struct Pass<'p, 'a> {
    index: &'p RecordIndex<'a>,
    options: TopologyOptions,
    services: &'p ServiceMatcher,
    external: Option<&'p EnrichmentCache>,
    reachability: Option<&'p ReachabilityResults>,
    graph: Graph,
    areas: BTreeMap<NormalizedName, AreaSet>,
    traced: HashSet<NormalizedName>,
    detected: Vec<DetectedService>,
}

impl Pass<'_, '_> {
    /// Adds the zone node, one unit per record (aggregating A/AAAA
    /// records by name), and everything reachable from the units.
    /// Returns the number of units.
    fn add_units(&mut self) -> usize {
        let index = self.index;
        let zone = index.zone();
        let zone_node = self.graph.intern(NodeKind::Zone, zone, || zone.to_string(), None);
        let mut units = 0;

        for (position, (owner, record)) in index.records_with_owners().enumerate() {
            if record.is_blank() {
                continue;
            }
            let target = record.target(zone);

            let key = if record.rr_type.is_address() {
                format!("{} {}", record.rr_type, owner)
            } else {
                format!("{} {} #{}", record.rr_type, owner, position)
            };
            let area = self.areas.get(owner).map(|areas| areas.primary());
            let before = self.graph.nodes().len();
            let unit = self
                .graph
                .intern(NodeKind::Record, &key, || unit_label(owner, zone, record), area);
            if self.graph.nodes().len() > before {
                units += 1;
            }
            self.graph.connect(zone_node, Relation::Contains, unit, false);

            match target {
                Some(Target::Address(ip)) => {
                    let address = self.address_node(&ip);
                    self.graph.connect(unit, Relation::Target, address, false);
                }
                Some(Target::Host(host)) => {
                    let host_node = self.host_node(&host);
                    self.graph.connect(unit, Relation::Target, host_node, false);
                    self.trace(&host);
                }
                None => (),
            }
        }

        units
    }

    /// Traces `host` through its CNAME chain, adding alias edges, the
    /// terminal's address edges, and service edges. Each host is traced
    /// at most once per build.
    fn trace(&mut self, host: &NormalizedName) {
        if !self.traced.insert(host.clone()) {
            return;
        }
        let local = self.index.resolve(host, self.options.max_hops);
        self.link_chain(&local.chain, false);
        for ip in local.ipv4.iter().chain(&local.ipv6) {
            self.link_address(&local.terminal, ip, false);
        }

        let mut hosts = local.chain.clone();
        if !local.has_addresses() {
            if let Some(found) = self.external.and_then(|cache| cache.get(&local.terminal)) {
                let chain = &found.resolution.chain;
                self.link_chain(chain, true);
                for ip in found.resolution.ipv4.iter().chain(&found.resolution.ipv6) {
                    self.link_address(&found.resolution.terminal, ip, true);
                }
                for name in chain {
                    if !hosts.contains(name) {
                        hosts.push(name.clone());
                    }
                }
            }
        }

        for name in &hosts {
            self.fingerprint(name);
        }
    }

    fn link_chain(&mut self, chain: &[NormalizedName], external: bool) {
        for pair in chain.windows(2) {
            let from = self.host_node(&pair[0]);
            let to = self.host_node(&pair[1]);
            self.graph.connect(from, Relation::Alias, to, external);
        }
    }

    fn link_address(&mut self, terminal: &NormalizedName, ip: &str, external: bool) {
        let from = self.host_node(terminal);
        let to = self.address_node(ip);
        self.graph.connect(from, Relation::Resolves, to, external);
    }

    fn fingerprint(&mut self, host: &NormalizedName) {
        let Some(service) = self.services.match_host(host) else {
            return;
        };
        let service = service.to_owned();
        let from = self.host_node(host);
        let to = self
            .graph
            .intern(NodeKind::Service, &service, || service.clone(), None);
        self.graph.connect(from, Relation::Service, to, false);

        match self.detected.iter_mut().find(|d| d.service == service) {
            Some(detected) => {
                if !detected.hosts.contains(host) {
                    detected.hosts.push(host.clone());
                }
            }
            None => self.detected.push(DetectedService {
                service,
                hosts: vec![host.clone()],
                reachability: Vec::new(),
            }),
        }
    }

    fn host_node(&mut self, host: &NormalizedName) -> usize {
        self.graph
            .intern(NodeKind::Hostname, host, || host.to_string(), None)
    }

    fn address_node(&mut self, ip: &str) -> usize {
        let ip = canonical_address(ip);
        self.graph
            .intern(NodeKind::Address, &ip, || ip.clone(), None)
    }

    /// Resolves `name`, completing the resolution with external results
    /// if needed.
    fn resolve_fully(&self, name: &NormalizedName) -> (Resolution, Source) {
        let mut resolution = self.index.resolve(name, self.options.max_hops);
        let source = if resolution.has_addresses() {
            Source::Local
        } else if self
            .external
            .map_or(false, |cache| cache.complete(&mut resolution))
        {
            Source::External
        } else {
            Source::None
        };
        (resolution, source)
    }

    fn cname_chains(&self) -> Vec<CnameChain> {
        let mut seen = HashSet::new();
        let mut chains = Vec::new();
        for (owner, record) in self.index.records_with_owners() {
            if record.rr_type != Type::CNAME || !seen.insert(owner) {
                continue;
            }
            let (resolution, source) = self.resolve_fully(owner);
            if resolution.chain.len() < MIN_REPORTED_CHAIN {
                continue;
            }
            chains.push(CnameChain {
                from: owner.clone(),
                chain: resolution.chain,
                terminal: resolution.terminal,
                ipv4: resolution.ipv4,
                ipv6: resolution.ipv6,
                source,
            });
        }
        chains
    }

    fn detected_services(&mut self) -> Vec<DetectedService> {
        let mut detected = std::mem::take(&mut self.detected);
        if let Some(results) = self.reachability {
            for service in &mut detected {
                service.reachability = service
                    .hosts
                    .iter()
                    .filter_map(|host| results.get(host))
                    .cloned()
                    .collect();
            }
        }
        detected
    }

    fn area_counts(&self) -> AreaCounts {
        let mut counts = AreaCounts::default();
        for areas in self.areas.values() {
            counts.add(*areas);
        }
        counts
    }

    fn node_summaries(&self) -> Vec<NodeSummary> {
        let zone = self.index.zone();
        let mut summaries = Vec::new();

        for name in self.index.names() {
            let records = self.index.records_at(name);
            let mut record_types = Vec::new();
            for record in records {
                let rr_type = record.rr_type.to_string();
                if !record_types.contains(&rr_type) {
                    record_types.push(rr_type);
                }
            }

            let resolvable = records
                .iter()
                .any(|record| record.rr_type.is_address() || record.rr_type == Type::CNAME);
            let (resolution, source) = if resolvable {
                let (resolution, source) = self.resolve_fully(name);
                (Some(resolution), Some(source))
            } else {
                (None, None)
            };

            let terminal = resolution.as_ref().map(|r| &r.terminal);
            let service = terminal
                .and_then(|terminal| self.services.match_host(terminal))
                .map(str::to_owned);
            let reachability = terminal
                .and_then(|terminal| self.reachability?.get(terminal))
                .cloned();
            let reverse_hostnames = terminal
                .and_then(|terminal| self.external?.get(terminal))
                .map(|found| {
                    let mut hostnames = Vec::new();
                    for reverse in &found.reverse_hostnames {
                        for host in &reverse.hostnames {
                            let host = host.to_string();
                            if !hostnames.contains(&host) {
                                hostnames.push(host);
                            }
                        }
                    }
                    hostnames
                })
                .unwrap_or_default();
            let note = match &resolution {
                Some(resolution) if !resolution.has_addresses() => Some(NO_TERMINAL_ADDRESS),
                _ => None,
            };

            summaries.push(NodeSummary {
                name: name.clone(),
                label: name.relative_to(zone).to_owned(),
                areas: self.areas.get(name).copied().unwrap_or_default(),
                record_types,
                resolution,
                source,
                service,
                reachability,
                reverse_hostnames,
                note,
            });
        }

        summaries
    }
}

/// Produces the label of a record unit: the zone-relative owner and the
/// record type, plus a short excerpt of the content for records that do
/// not point anywhere (TXT and the like).
fn unit_label(owner: &NormalizedName, zone: &NormalizedName, record: &DnsRecord) -> String {
    const EXCERPT_CHARS: usize = 40;

    let owner = owner.relative_to(zone);
    if record.target(zone).is_some() || record.rr_type == Type::CNAME {
        return format!("{} {}", owner, record.rr_type);
    }
    let content = record.content.trim();
    let mut excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
    if content.chars().count() > EXCERPT_CHARS {
        excerpt.push_str("...");
    }
    format!("{} {}\n{}", owner, record.rr_type, excerpt)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::external::ExternalResolution;

    lazy_static! {
        static ref RECORDS: Vec<DnsRecord> = vec![
            DnsRecord::new("@", Type::NS, "ns1.example.net."),
            DnsRecord::new("@", Type::MX, "10 mail.example.com"),
            DnsRecord::new("@", Type::TXT, "\"v=spf1 mx -all\""),
            DnsRecord::new("mail", Type::A, "192.0.2.25"),
            DnsRecord::new("www", Type::CNAME, "web.example.com"),
            DnsRecord::new("web", Type::CNAME, "lb.example.com"),
            DnsRecord::new("lb", Type::A, "192.0.2.10"),
            DnsRecord::new("lb", Type::A, "192.0.2.11"),
            DnsRecord::new("api", Type::A, "192.0.2.10"),
            DnsRecord::new("shop", Type::CNAME, "shops.myshopify.com."),
            DnsRecord::new("cdn", Type::CNAME, "d111.cloudfront.net."),
            DnsRecord::new("blank", Type::A, ""),
        ];
    }

    fn build(records: &[DnsRecord]) -> Topology {
        build_topology(records, "example.com", HopLimit::default(), false)
    }

    #[test]
    fn builds_are_deterministic() {
        let first = build(&RECORDS);
        let second = build(&RECORDS);
        assert_eq!(first.diagram_source, second.diagram_source);
        assert_eq!(first.summary, second.summary);

        let dark = build_topology(&RECORDS, "example.com", HopLimit::default(), true);
        assert_ne!(first.diagram_source, dark.diagram_source);
    }

    #[test]
    fn shared_targets_are_a_single_node() {
        let records = vec![
            DnsRecord::new("www", Type::CNAME, "target.example.net"),
            DnsRecord::new("blog", Type::CNAME, "target.example.net."),
        ];
        let topology = build(&records);
        let graph = &topology.graph;
        let hosts: Vec<&Node> = graph
            .nodes()
            .iter()
            .filter(|node| node.kind == NodeKind::Hostname)
            .collect();
        assert_eq!(hosts.len(), 1);
        let target = graph.node(NodeKind::Hostname, "target.example.net").unwrap();
        let incoming: Vec<&Edge> = graph.edges_into(&target.id).collect();
        assert_eq!(incoming.len(), 2);
        assert!(incoming.iter().all(|edge| edge.relation == Relation::Target));
    }

    #[test]
    fn address_records_are_aggregated_per_name() {
        let topology = build(&RECORDS);
        let graph = &topology.graph;
        assert!(graph.node(NodeKind::Record, "A lb.example.com").is_some());
        let lb_unit = graph.node(NodeKind::Record, "A lb.example.com").unwrap();
        let targets = graph
            .edges()
            .iter()
            .filter(|edge| edge.from == lb_unit.id && edge.relation == Relation::Target)
            .count();
        assert_eq!(targets, 2);
        assert!(graph.node(NodeKind::Record, "A blank.example.com").is_none());
    }

    #[test]
    fn address_spellings_share_one_node() {
        let records = vec![
            DnsRecord::new("a", Type::AAAA, "2001:DB8::1"),
            DnsRecord::new("b", Type::AAAA, "2001:db8:0::1"),
            DnsRecord::new("c", Type::CNAME, "a.example.com"),
        ];
        let topology = build(&records);
        let graph = &topology.graph;
        let addresses: Vec<&str> = graph
            .nodes()
            .iter()
            .filter(|node| node.kind == NodeKind::Address)
            .map(|node| node.value.as_str())
            .collect();
        assert_eq!(addresses, ["2001:db8::1"]);

        let address = graph.node(NodeKind::Address, "2001:db8::1").unwrap();
        assert_eq!(graph.edges_into(&address.id).count(), 3);
        assert_eq!(topology.summary.shared_ips.len(), 1);
        assert_eq!(topology.summary.shared_ips[0].names, ["a", "b"]);
    }

    #[test]
    fn chains_are_traced_without_duplicate_edges() {
        let records = vec![
            DnsRecord::new("a", Type::CNAME, "hop.example.com"),
            DnsRecord::new("b", Type::CNAME, "hop.example.com"),
            DnsRecord::new("hop", Type::CNAME, "end.example.com"),
            DnsRecord::new("end", Type::A, "192.0.2.1"),
        ];
        let topology = build(&records);
        let graph = &topology.graph;
        let aliases = graph
            .edges()
            .iter()
            .filter(|edge| edge.relation == Relation::Alias)
            .count();
        assert_eq!(aliases, 1);
        let resolves = graph
            .edges()
            .iter()
            .filter(|edge| edge.relation == Relation::Resolves)
            .count();
        assert_eq!(resolves, 1);

        let mut keys = HashSet::new();
        for edge in graph.edges() {
            assert!(keys.insert((&edge.from, edge.relation, &edge.to)));
        }
    }

    #[test]
    fn summary_reports_long_chains_and_clusters() {
        let summary = build(&RECORDS).summary;

        assert_eq!(summary.cname_chains.len(), 1);
        let chain = &summary.cname_chains[0];
        assert_eq!(chain.from, "www.example.com");
        assert_eq!(chain.terminal, "lb.example.com");
        assert_eq!(chain.ipv4, ["192.0.2.10", "192.0.2.11"]);
        assert_eq!(chain.source, Source::Local);

        assert_eq!(summary.shared_ips.len(), 1);
        assert_eq!(summary.shared_ips[0].ip, "192.0.2.10");
        assert_eq!(summary.shared_ips[0].names, ["api", "lb"]);

        assert_eq!(summary.mx_trails.len(), 1);
        assert_eq!(summary.mx_trails[0].ipv4, ["192.0.2.25"]);
    }

    #[test]
    fn summary_detects_services_and_areas() {
        let summary = build(&RECORDS).summary;
        let services: Vec<&str> = summary
            .detected_services
            .iter()
            .map(|d| d.service.as_str())
            .collect();
        assert_eq!(services, ["Shopify", "AWS CloudFront"]);

        let apex = summary
            .node_summaries
            .iter()
            .find(|s| s.label == "@")
            .unwrap();
        assert!(apex.areas.contains(Area::Email));
        assert!(apex.areas.contains(Area::Infra));
        assert_eq!(apex.record_types, ["NS", "MX", "TXT"]);

        let mail = summary
            .node_summaries
            .iter()
            .find(|s| s.label == "mail")
            .unwrap();
        assert!(mail.areas.contains(Area::Email));
        assert!(mail.areas.contains(Area::Web));
        assert!(summary.area_counts.get(Area::Email) >= 2);
    }

    #[test]
    fn dead_ends_are_noted_in_the_summary() {
        let summary = build(&RECORDS).summary;
        let shop = summary
            .node_summaries
            .iter()
            .find(|s| s.label == "shop")
            .unwrap();
        assert_eq!(shop.note, Some(NO_TERMINAL_ADDRESS));
        assert_eq!(shop.source, Some(Source::None));
        assert_eq!(shop.service.as_deref(), Some("Shopify"));
    }

    #[test]
    fn external_results_extend_chains() {
        let mut cache = EnrichmentCache::new();
        cache.merge([ExternalResolution {
            resolution: Resolution {
                chain: vec![
                    NormalizedName::new("d111.cloudfront.net"),
                    NormalizedName::new("edge.cloudfront.net"),
                ],
                terminal: NormalizedName::new("edge.cloudfront.net"),
                ipv4: vec!["198.51.100.1".into()],
                ipv6: Vec::new(),
            },
            reverse_hostnames: Vec::new(),
            source: Source::External,
            error: None,
        }]);
        let options = TopologyOptions::default();
        let topology = TopologyBuilder::new(&RECORDS, "example.com", options)
            .external(&cache)
            .build();

        let cdn_chain = topology
            .summary
            .cname_chains
            .iter()
            .find(|c| c.from == "cdn.example.com")
            .unwrap();
        assert_eq!(cdn_chain.source, Source::External);
        assert_eq!(cdn_chain.terminal, "edge.cloudfront.net");
        assert_eq!(cdn_chain.ipv4, ["198.51.100.1"]);

        let graph = &topology.graph;
        let address = graph.node(NodeKind::Address, "198.51.100.1").unwrap();
        let incoming: Vec<&Edge> = graph.edges_into(&address.id).collect();
        assert_eq!(incoming.len(), 1);
        assert!(incoming[0].external);
    }

    #[test]
    fn reachability_is_attached_to_services_and_names() {
        let mut results = ReachabilityResults::new();
        let shop = ServiceReachability {
            host: NormalizedName::new("shops.myshopify.com"),
            https_up: true,
            http_up: false,
        };
        results.merge([shop.clone()]);
        let topology = TopologyBuilder::new(&RECORDS, "example.com", TopologyOptions::default())
            .reachability(&results)
            .build();
        let summary = &topology.summary;

        let shopify = &summary.detected_services[0];
        assert_eq!(shopify.service, "Shopify");
        assert_eq!(shopify.reachability, [shop.clone()]);
        assert!(summary.detected_services[1].reachability.is_empty());

        let node = summary
            .node_summaries
            .iter()
            .find(|s| s.label == "shop")
            .unwrap();
        assert_eq!(node.reachability.as_ref(), Some(&shop));
        let cdn = summary
            .node_summaries
            .iter()
            .find(|s| s.label == "cdn")
            .unwrap();
        assert_eq!(cdn.reachability, None);
    }

    #[test]
    fn missing_terminals_lists_dead_ends_once() {
        let mut records = RECORDS.clone();
        records.push(DnsRecord::new("store", Type::CNAME, "shops.myshopify.com"));
        let missing = missing_terminals(&records, "example.com", HopLimit::default());
        let names: Vec<&str> = missing.iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            ["ns1.example.net", "shops.myshopify.com", "d111.cloudfront.net"]
        );
    }
}
