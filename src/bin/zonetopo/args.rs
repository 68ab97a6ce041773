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

//! Implements command-line argument parsing.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand};

use zonetopo::export::ExportFormat;
use zonetopo::name::NormalizedName;

use crate::config::ResolverMode;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Maps the topology of a DNS zone
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the topology and write the diagram source and summary
    Build(BuildArgs),

    /// Build the topology and export it in one format
    Export(ExportArgs),
}

/// The arguments that select the records and the build settings.
#[derive(Debug, ClapArgs)]
#[command(group(ArgGroup::new("input").required(true).args(["config", "records"])))]
pub struct SourceArgs {
    /// Set the configuration file to use
    #[arg(
        long,
        conflicts_with_all = [
            "records",
            "zone",
            "max_hops",
            "dark",
            "offline",
            "endpoints",
            "timeout_ms",
            "reverse_lookups",
            "mode",
            "dns_server",
            "no_service_checks",
        ],
        value_name = "FILE"
    )]
    pub config: Option<PathBuf>,

    /// Set the JSON file holding the zone's records
    #[arg(long, value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// Set the zone name (inferred from a records file named <ZONE>.json
    /// if omitted)
    #[arg(long, value_name = "NAME")]
    pub zone: Option<NormalizedName>,

    /// Set the maximum number of CNAME hops to follow (1 to 15)
    #[arg(long, value_name = "HOPS")]
    pub max_hops: Option<u32>,

    /// Use the dark diagram theme
    #[arg(long)]
    pub dark: bool,

    /// Do not resolve dead-end names externally
    #[arg(long)]
    pub offline: bool,

    /// Set the preferred DNS-over-HTTPS endpoints
    #[arg(long, value_delimiter = ',', value_name = "URL,...")]
    pub endpoints: Vec<String>,

    /// Set the per-query lookup timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Look up PTR names for externally found addresses
    #[arg(long)]
    pub reverse_lookups: bool,

    /// Set how external lookups are sent [default: dns]
    #[arg(long, value_enum)]
    pub mode: Option<ResolverMode>,

    /// Set the DNS server queried in dns mode [default: 1.1.1.1]
    #[arg(long, value_name = "IP")]
    pub dns_server: Option<IpAddr>,

    /// Do not check whether the hosts of detected services answer over
    /// HTTP(S)
    #[arg(long)]
    pub no_service_checks: bool,
}

#[derive(Debug, ClapArgs)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Set the output file name, without extension
    #[arg(long, short, default_value = "", value_name = "NAME")]
    pub output: String,
}

#[derive(Debug, ClapArgs)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Set the export format (png, svg, mmd, or html)
    #[arg(long, short, value_name = "FORMAT")]
    pub format: ExportFormat,

    /// Set the SVG rendering of the diagram, as produced by a Mermaid
    /// renderer
    #[arg(long, value_name = "FILE")]
    pub svg: Option<PathBuf>,

    /// Set a PNG rendering of the diagram
    #[arg(long, value_name = "FILE", requires = "svg")]
    pub png: Option<PathBuf>,

    /// Pin a note to the diagram at the given diagram coordinates
    #[arg(long = "annotation", value_name = "X,Y,TEXT")]
    pub annotations: Vec<AnnotationArg>,

    /// Set the output file name
    #[arg(long, short, default_value = "", value_name = "NAME")]
    pub output: String,
}

/// An annotation given on the command line with `--annotation`, in the
/// form `X,Y,TEXT`. The text may itself contain commas.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationArg {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

impl FromStr for AnnotationArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ',');
        let (Some(x), Some(y), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(anyhow!("an annotation must have the form X,Y,TEXT"));
        };
        let coordinate = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| anyhow!("invalid annotation coordinate: {}", value.trim()))
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("the annotation text is empty"));
        }
        Ok(Self {
            x: coordinate(x)?,
            y: coordinate(y)?,
            text: text.to_owned(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_arg_from_str_keeps_commas_in_text() {
        let arg: AnnotationArg = "10, 20.5,origin, primary".parse().unwrap();
        assert_eq!(
            arg,
            AnnotationArg {
                x: 10.0,
                y: 20.5,
                text: "origin, primary".into(),
            }
        );
    }

    #[test]
    fn annotation_arg_from_str_rejects_bad_input() {
        assert!("10,20".parse::<AnnotationArg>().is_err());
        assert!("x,20,text".parse::<AnnotationArg>().is_err());
        assert!("10,20,  ".parse::<AnnotationArg>().is_err());
    }

    #[test]
    fn config_conflicts_with_settings() {
        let result = Args::try_parse_from([
            "zonetopo",
            "build",
            "--config",
            "zonetopo.toml",
            "--dark",
        ]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "zonetopo",
            "export",
            "--records",
            "example.com.json",
            "--format",
            "code",
            "--annotation",
            "1,2,note",
        ])
        .unwrap();
        let Command::Export(export) = args.command else {
            panic!("expected the export command");
        };
        assert_eq!(export.format, ExportFormat::Mermaid);
        assert_eq!(export.annotations.len(), 1);
    }

    #[test]
    fn resolver_flags_are_parsed() {
        let args = Args::try_parse_from([
            "zonetopo",
            "build",
            "--records",
            "example.com.json",
            "--mode",
            "doh",
            "--dns-server",
            "9.9.9.9",
            "--no-service-checks",
        ])
        .unwrap();
        let Command::Build(build) = args.command else {
            panic!("expected the build command");
        };
        assert_eq!(build.source.mode, Some(ResolverMode::Doh));
        assert_eq!(build.source.dns_server, Some("9.9.9.9".parse().unwrap()));
        assert!(build.source.no_service_checks);

        let conflicting = Args::try_parse_from([
            "zonetopo",
            "build",
            "--config",
            "zonetopo.toml",
            "--mode",
            "dns",
        ]);
        assert!(conflicting.is_err());
    }
}
