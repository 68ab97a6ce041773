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

//! Implements the configuration file.

use std::ffi::OsStr;
use std::fmt::{self, Write};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use clap::ValueEnum;
use paste::paste;
use serde::{de, Deserialize};

use zonetopo::external::dns::DEFAULT_DNS_SERVER;
use zonetopo::external::doh::{endpoint_for_server, endpoints_for};
use zonetopo::external::ResolverOptions;
use zonetopo::graph::TopologyOptions;
use zonetopo::name::NormalizedName;
use zonetopo::resolve::HopLimit;
use zonetopo::service::{ServiceMatcher, ServicePattern};

use crate::args::SourceArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // When loading the configuration from a path, the records path is
    // interpreted relative to the configuration file's directory.
    if config.records.is_relative() {
        config.records = dir.join(&config.records);
    }

    log_config_summary(&config);
    Ok(config)
}

/// Loads the configuration from the parsed command line arguments
/// given by `args`.
pub fn load_from_args(args: &SourceArgs) -> Result<Config> {
    let records = match args.records {
        Some(ref records) => records.clone(),
        None => return Err(anyhow!("no records file was given")),
    };
    let zone = match args.zone {
        Some(ref zone) => zone.clone(),
        None => zone_from_records_path(&records)?,
    };

    let config = Config {
        zone: ConfigName(zone),
        records,
        max_hops: args.max_hops.unwrap_or_else(default_max_hops),
        dark_mode: args.dark,
        resolver: ResolverConfig {
            enabled: !args.offline,
            endpoints: args
                .endpoints
                .iter()
                .map(|endpoint| {
                    endpoint
                        .parse()
                        .map(ConfigUrl)
                        .map_err(|e| anyhow!("invalid endpoint URL {}: {}", endpoint, e))
                })
                .collect::<Result<_>>()?,
            timeout_ms: args.timeout_ms.unwrap_or(ResolverOptions::DEFAULT_TIMEOUT_MS),
            reverse_lookups: args.reverse_lookups,
            mode: args.mode.unwrap_or_default(),
            dns_server: ConfigIp(args.dns_server.unwrap_or(DEFAULT_DNS_SERVER)),
            check_services: !args.no_service_checks,
        },
        services: Vec::new(),
    };
    log_config_summary(&config);
    Ok(config)
}

/// Infers the zone name from a records file named `<ZONE>.json`.
fn zone_from_records_path(path: &Path) -> Result<NormalizedName> {
    if path.extension() != Some(OsStr::new("json")) {
        return Err(anyhow!(
            "if no zone name is provided, the records file name must have the form <ZONE>.json",
        ));
    }
    path.file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| anyhow!("failed to compute the zone name from the records file path"))?
        .parse()
        .map_err(|e| anyhow!("invalid zone name: {}", e))
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let resolver_status = if config.resolver.enabled {
        "enabled"
    } else {
        "disabled"
    };

    let mut message = format!(
        "Configuration loaded:\n\
         Zone:             {}\n\
         Records:          {}\n\
         Maximum hops:     {}\n\
         Theme:            {}\n\
         External lookups: {}",
        config.zone.0,
        config.records.display(),
        config.hop_limit().get(),
        if config.dark_mode { "dark" } else { "light" },
        resolver_status,
    );
    if config.resolver.enabled {
        let _ = write!(message, "\n  Mode:           {}", config.resolver.mode.as_str());
        if config.resolver.mode == ResolverMode::Dns {
            let _ = write!(message, "\n  DNS server:     {}", config.resolver.dns_server.0);
        }
        for endpoint in config.resolver.doh_endpoints() {
            let _ = write!(message, "\n  {}", endpoint);
        }
        let _ = write!(
            message,
            "\nService checks:   {}",
            if config.resolver.check_services { "enabled" } else { "disabled" },
        );
    }
    if config.services.is_empty() {
        message.push_str("\nCustom services:  none");
    } else {
        for pattern in &config.services {
            let _ = write!(message, "\n  {} => {}", pattern.suffix, pattern.service);
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub zone: ConfigName,
    pub records: PathBuf,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub services: Vec<ServicePattern>,
}

fn default_max_hops() -> u32 {
    HopLimit::MAX.into()
}

impl Config {
    /// Returns the configured hop limit, clamped into range.
    pub fn hop_limit(&self) -> HopLimit {
        HopLimit::new(self.max_hops)
    }

    pub fn topology_options(&self) -> TopologyOptions {
        TopologyOptions {
            max_hops: self.hop_limit(),
            dark_mode: self.dark_mode,
        }
    }

    /// Returns a matcher trying the configured services before the
    /// built-in ones.
    pub fn service_matcher(&self) -> ServiceMatcher {
        ServiceMatcher::with_custom(
            self.services
                .iter()
                .map(|pattern| ServicePattern::new(&pattern.suffix, pattern.service.clone()))
                .collect(),
        )
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: RESOLVER                                    //
////////////////////////////////////////////////////////////////////////

/// How external lookups are sent.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Plain DNS to `dns_server`, falling back to DNS-over-HTTPS per
    /// query.
    #[default]
    Dns,

    /// DNS-over-HTTPS only.
    Doh,
}

impl ResolverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Doh => "doh",
        }
    }
}

/// The configuration of external lookups and service checks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoints: Vec<ConfigUrl>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub reverse_lookups: bool,
    #[serde(default)]
    pub mode: ResolverMode,
    #[serde(default = "default_dns_server")]
    pub dns_server: ConfigIp,
    #[serde(default = "default_true")]
    pub check_services: bool,
}

fn default_true() -> bool {
    true
}

fn default_dns_server() -> ConfigIp {
    ConfigIp(DEFAULT_DNS_SERVER)
}

fn default_timeout_ms() -> u64 {
    ResolverOptions::DEFAULT_TIMEOUT_MS
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoints: Vec::new(),
            timeout_ms: default_timeout_ms(),
            reverse_lookups: false,
            mode: ResolverMode::default(),
            dns_server: default_dns_server(),
            check_services: true,
        }
    }
}

impl ResolverConfig {
    pub fn resolver_options(&self, max_hops: HopLimit) -> ResolverOptions {
        ResolverOptions {
            max_hops,
            timeout: ResolverOptions::timeout_from_millis(self.timeout_ms),
            reverse_lookups: self.reverse_lookups,
        }
    }

    /// Returns the DNS-over-HTTPS endpoints to use: the configured ones,
    /// then the endpoint run by the operator of `dns_server`, then the
    /// defaults.
    pub fn doh_endpoints(&self) -> Vec<String> {
        let preferred = self
            .endpoints
            .iter()
            .map(|url| url.0.as_str())
            .chain(endpoint_for_server(self.dns_server.0));
        endpoints_for(preferred)
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER TYPES FOR SERDE                                      //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type,
/// using its [`FromStr`](std::str::FromStr) implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, NormalizedName, "zone name");
make_serde_wrapper!(ConfigUrl, reqwest::Url, "DNS-over-HTTPS endpoint URL");
make_serde_wrapper!(ConfigIp, IpAddr, "DNS server address");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
