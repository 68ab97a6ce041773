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

//! Implements the `build` and `export` commands.

use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use env_logger::Env;
use log::{error, info, warn};
use serde_json::Value;
use tokio::runtime::Runtime;

use zonetopo::export::{file_name, ExportFormat};
use zonetopo::external::dns::DnsLookup;
use zonetopo::external::doh::DohLookup;
use zonetopo::external::reachability::HttpReachability;
use zonetopo::external::{ExternalResolver, FallbackLookup, Lookup};
use zonetopo::record::DnsRecord;
use zonetopo::render::{RenderError, Rendered};
use zonetopo::session::TopologySession;
use zonetopo::viewport::{Point, Size};

use crate::args::{BuildArgs, Command, ExportArgs, SourceArgs};
use crate::config::{self, Config, ResolverMode};

/// The viewport size assumed before a rendering gives the real bounds.
const DEFAULT_VIEWPORT: Size = Size {
    width: 1280.0,
    height: 800.0,
};

/// Runs a command.
pub fn run(command: Command) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    let result = match command {
        Command::Build(args) => build(args),
        Command::Export(args) => export(args),
    };
    if let Err(e) = result {
        let mut message = String::from("Failed to map the zone:");
        for (i, cause) in e.chain().enumerate() {
            let _ = write!(message, "\n[{}] {}", i + 1, cause);
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
}

/// Implements the `build` command: writes the Mermaid source and the
/// JSON summary.
fn build(args: BuildArgs) -> Result<()> {
    let mut session = open_session(&args.source)?;

    let mermaid = session
        .export(ExportFormat::Mermaid)
        .context("failed to export the diagram source")?;
    let mermaid_path = file_name(&args.output, ExportFormat::Mermaid);
    write_output(&mermaid_path, &mermaid)?;

    let summary = serde_json::to_vec_pretty(&session.topology().summary)
        .context("failed to serialize the summary")?;
    let summary_path = summary_file_name(&args.output);
    write_output(&summary_path, &summary)?;
    Ok(())
}

/// Implements the `export` command.
fn export(args: ExportArgs) -> Result<()> {
    let mut session = open_session(&args.source)?;

    if let Some(ref svg_path) = args.svg {
        let svg = fs::read_to_string(svg_path)
            .with_context(|| format!("failed to read {}", svg_path.display()))?;
        let png = match args.png {
            Some(ref png_path) => Some(
                fs::read(png_path)
                    .with_context(|| format!("failed to read {}", png_path.display()))?,
            ),
            None => None,
        };
        let bounds = svg_bounds(&svg).unwrap_or(DEFAULT_VIEWPORT);
        let renderer = move |_: &str| -> Result<Rendered, RenderError> {
            Ok(Rendered {
                svg: svg.clone(),
                png: png.clone(),
                bounds,
            })
        };
        if session.render(&renderer).is_none() {
            return Err(anyhow!("the supplied rendering was not accepted"));
        }

        // With the viewport the size of the diagram, the fitted view
        // maps diagram coordinates to themselves.
        let viewport = session.viewport_mut();
        viewport.set_viewport_size(bounds);
        viewport.fit_to_view();
        for annotation in &args.annotations {
            let point = Point::new(annotation.x, annotation.y);
            if viewport.place_annotation(point, &annotation.text).is_none() {
                warn!("Skipping the annotation at ({}, {}).", annotation.x, annotation.y);
            }
        }
    } else if !args.annotations.is_empty() {
        warn!("Annotations need a rendering (--svg); ignoring them.");
    }

    let bytes = session.export(args.format).context("failed to export the topology")?;
    write_output(&file_name(&args.output, args.format), &bytes)
}

/// Loads the configuration and records, builds the session, and
/// resolves dead-end names externally if enabled.
fn open_session(source: &SourceArgs) -> Result<TopologySession> {
    let config = if let Some(ref config_path) = source.config {
        info!("Loading the configuration from {}.", config_path.display());
        config::load_from_path(config_path).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(source).context("failed to load the configuration")?
    };

    let records = read_records(&config.records)
        .with_context(|| format!("failed to load records from {}", config.records.display()))?;
    info!("Loaded {} record(s) for {}.", records.len(), config.zone.0);

    let mut session =
        TopologySession::new(&config.zone.0, config.topology_options(), DEFAULT_VIEWPORT);
    session.set_services(config.service_matcher());
    session.set_records(records);

    if config.resolver.enabled {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start the async runtime")?;
        let _guard = runtime.enter();

        let doh = DohLookup::new(config.resolver.doh_endpoints());
        match config.resolver.mode {
            ResolverMode::Dns => {
                let dns = DnsLookup::new(config.resolver.dns_server.0);
                let lookup = FallbackLookup::new(dns, doh);
                enrich(&runtime, &mut session, lookup, &config);
            }
            ResolverMode::Doh => enrich(&runtime, &mut session, doh, &config),
        }

        if config.resolver.check_services {
            let checker =
                HttpReachability::new().context("failed to set up the HTTP client")?;
            check_services(&runtime, &mut session, checker);
        }
    }
    Ok(session)
}

/// Runs an enrichment round through `lookup`.
fn enrich<L: Lookup + 'static>(
    runtime: &Runtime,
    session: &mut TopologySession,
    lookup: L,
    config: &Config,
) {
    let options = config.resolver.resolver_options(config.hop_limit());
    let resolver = Arc::new(ExternalResolver::new(lookup, options));
    if runtime.block_on(session.enrich(&resolver)) {
        info!(
            "Resolved dead-end names externally; {} cached.",
            session.cache().len(),
        );
    } else {
        info!("No names needed external resolution.");
    }
}

/// Checks whether the hosts of detected services answer over HTTP(S).
fn check_services(runtime: &Runtime, session: &mut TopologySession, checker: HttpReachability) {
    let checker = Arc::new(checker);
    if runtime.block_on(session.check_services(&checker)) {
        let results = session.reachability();
        info!("Checked {} service host(s) over HTTP(S).", results.len());
    } else {
        info!("No service hosts needed checking.");
    }
}

/// Reads a record list. The file holds either a JSON array of records
/// or a provider response object with the array under `result`.
/// Entries that are not valid records are skipped.
fn read_records(path: &Path) -> Result<Vec<DnsRecord>> {
    let raw = fs::read(path).context("failed to read the records file")?;
    let value: Value = serde_json::from_slice(&raw).context("failed to parse the records file")?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("result") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(anyhow!("the records file has no \"result\" array")),
        },
        _ => return Err(anyhow!("the records file must hold an array of records")),
    };

    let mut records = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping record {} of {}: {}.", i, path.display(), e),
        }
    }
    Ok(records)
}

/// Extracts the size of an SVG document from its `viewBox`.
fn svg_bounds(svg: &str) -> Option<Size> {
    let start = svg.find("viewBox=\"")? + "viewBox=\"".len();
    let end = start + svg[start..].find('"')?;
    let values: Vec<f64> = svg[start..end]
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values[..] {
        [_, _, width, height] => Some(Size::new(width, height)).filter(|size| size.is_usable()),
        _ => None,
    }
}

/// Returns the summary file name matching the diagram file name.
fn summary_file_name(requested: &str) -> String {
    let mermaid = file_name(requested, ExportFormat::Mermaid);
    let stem = mermaid.strip_suffix(".mmd").unwrap_or(&mermaid);
    format!("{}.json", stem)
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path))?;
    info!("Wrote {} ({} bytes).", path, bytes.len());
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_bounds_reads_view_box() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="-8 -8 640.5 320">"#;
        assert_eq!(svg_bounds(svg), Some(Size::new(640.5, 320.0)));
        assert_eq!(svg_bounds("<svg>"), None);
        assert_eq!(svg_bounds(r#"<svg viewBox="0 0 0 10">"#), None);
    }

    #[test]
    fn summary_file_name_follows_diagram_name() {
        assert_eq!(summary_file_name(""), "zone-topology.json");
        assert_eq!(summary_file_name("example.mmd"), "example.json");
        assert_eq!(summary_file_name("example"), "example.json");
    }
}
