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

//! A [`Lookup`] implementation using the JSON flavor of
//! DNS-over-HTTPS, as served by the major public resolvers.

use std::future::Future;
use std::net::IpAddr;

use log::trace;
use serde::Deserialize;
use tokio::task::JoinSet;

use super::{Lookup, LookupError};
use crate::name::NormalizedName;
use crate::record::Type;
use crate::util::push_unique;

/// The endpoints used when none are configured.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/resolve",
    "https://dns.quad9.net:5053/dns-query",
];

/// The maximum number of endpoints raced for a single query.
pub const MAX_CONCURRENT_ENDPOINTS: usize = 3;

const DNS_JSON: &str = "application/dns-json";

/// Returns the endpoint list: `preferred` first (in order), followed by
/// the [`DEFAULT_ENDPOINTS`], with blanks and duplicates removed.
pub fn endpoints_for<'a>(preferred: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut endpoints = Vec::new();
    for endpoint in preferred.into_iter().chain(DEFAULT_ENDPOINTS) {
        let endpoint = endpoint.trim();
        if !endpoint.is_empty() {
            push_unique(&mut endpoints, endpoint.to_owned());
        }
    }
    endpoints
}

/// Returns the DNS-over-HTTPS endpoint run by the operator of the
/// well-known public resolver at `server`, if it is one.
pub fn endpoint_for_server(server: IpAddr) -> Option<&'static str> {
    let server = server.to_string();
    match server.as_str() {
        "1.1.1.1" | "1.0.0.1" | "2606:4700:4700::1111" | "2606:4700:4700::1001" => {
            Some(DEFAULT_ENDPOINTS[0])
        }
        "8.8.8.8" | "8.8.4.4" | "2001:4860:4860::8888" | "2001:4860:4860::8844" => {
            Some(DEFAULT_ENDPOINTS[1])
        }
        "9.9.9.9" | "149.112.112.112" | "2620:fe::fe" | "2620:fe::9" => Some(DEFAULT_ENDPOINTS[2]),
        _ => None,
    }
}

/// A DNS-over-HTTPS JSON client.
///
/// Each query is sent to the first [`MAX_CONCURRENT_ENDPOINTS`]
/// endpoints at once. The first endpoint to return a non-empty answer
/// wins; the remaining requests are abandoned.
#[derive(Clone, Debug)]
pub struct DohLookup {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl DohLookup {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(client: reqwest::Client, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

impl Default for DohLookup {
    fn default() -> Self {
        Self::new(endpoints_for([]))
    }
}

impl Lookup for DohLookup {
    fn query(
        &self,
        name: &str,
        rr_type: Type,
    ) -> impl Future<Output = Result<Vec<String>, LookupError>> + Send {
        let client = self.client.clone();
        let endpoints: Vec<String> = self
            .endpoints
            .iter()
            .take(MAX_CONCURRENT_ENDPOINTS)
            .cloned()
            .collect();
        let name = name.to_owned();

        async move {
            if endpoints.is_empty() {
                return Err(LookupError::NoEndpoints);
            }

            let mut requests = JoinSet::new();
            for endpoint in endpoints {
                requests.spawn(query_endpoint(client.clone(), endpoint, name.clone(), rr_type));
            }

            let mut answered = false;
            let mut first_error = None;
            while let Some(joined) = requests.join_next().await {
                match joined {
                    Ok(Ok(answers)) if !answers.is_empty() => return Ok(answers),
                    Ok(Ok(_)) => answered = true,
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(e) => {
                        first_error.get_or_insert(LookupError::Transport(e.to_string()));
                    }
                }
            }

            // An empty answer from any endpoint outranks failures.
            match first_error {
                Some(e) if !answered => Err(e),
                _ => Ok(Vec::new()),
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SINGLE-ENDPOINT QUERIES                                            //
////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
struct DnsJsonResponse {
    #[serde(rename = "Answer", default)]
    answer: Option<Vec<DnsJsonAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DnsJsonAnswer {
    #[serde(rename = "type", default)]
    rr_type: Option<u16>,
    #[serde(default)]
    data: Option<String>,
}

async fn query_endpoint(
    client: reqwest::Client,
    endpoint: String,
    name: String,
    rr_type: Type,
) -> Result<Vec<String>, LookupError> {
    let type_text = rr_type.to_string();
    let response = client
        .get(&endpoint)
        .header(reqwest::header::ACCEPT, DNS_JSON)
        .query(&[("name", name.as_str()), ("type", type_text.as_str())])
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(LookupError::Status(status.as_u16()));
    }
    let body = response.bytes().await.map_err(transport_error)?;
    let answers = parse_answers(&body, rr_type)?;
    trace!("{} answered {} {} with {} record(s).", endpoint, name, rr_type, answers.len());
    Ok(answers)
}

/// Extracts the RDATA of each answer of type `rr_type` from a DNS JSON
/// response body. Hostname answers are normalized; all answers are
/// deduplicated preserving their order.
fn parse_answers(body: &[u8], rr_type: Type) -> Result<Vec<String>, LookupError> {
    let response: DnsJsonResponse =
        serde_json::from_slice(body).map_err(|e| LookupError::Parse(e.to_string()))?;

    let mut out = Vec::new();
    for answer in response.answer.unwrap_or_default() {
        if answer.rr_type.map_or(false, |t| t != u16::from(rr_type)) {
            continue;
        }
        let data = answer.data.unwrap_or_default();
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        let value: String = match rr_type {
            Type::CNAME | Type::PTR => NormalizedName::new(data).into(),
            _ => data.to_owned(),
        };
        if !value.is_empty() {
            push_unique(&mut out, value);
        }
    }
    Ok(out)
}

fn transport_error(error: reqwest::Error) -> LookupError {
    if error.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Transport(error.to_string())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
