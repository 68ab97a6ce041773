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

//! A topology engine for the DNS records of a single zone.
//!
//! Given a zone's record list (as a hosted DNS provider returns it),
//! this crate works out how the zone's names connect: CNAME chains and
//! where they end, which addresses each name reaches, where mail is
//! delivered, which third-party services the zone points at, and which
//! names share addresses. The result is a deterministic graph, a
//! Mermaid flowchart of that graph, and a structured summary.
//!
//! The main entry points are:
//!
//! * [`graph::build_topology`] and [`graph::TopologyBuilder`], which
//!   build a [`graph::Topology`] from records;
//! * [`external::ExternalResolver`], which resolves dead-end names
//!   through an external [`external::Lookup`] (plain DNS, DNS-over-HTTPS,
//!   or a [`external::FallbackLookup`] combining the two);
//! * [`session::TopologySession`], which ties builds, enrichment,
//!   rendering, and the [`viewport::ViewportController`] together for
//!   one zone view.
//!
//! Rendering Mermaid source is left to the host, through the
//! [`render::Renderer`] trait.

pub mod area;
pub mod cluster;
pub mod diagram;
pub mod export;
pub mod external;
pub mod graph;
pub mod index;
pub mod mx;
pub mod name;
pub mod record;
pub mod render;
pub mod resolve;
pub mod service;
pub mod session;
pub mod viewport;

mod util;
