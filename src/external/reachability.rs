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

//! HTTP reachability of the hosts behind detected services.
//!
//! Each host is requested once over `https://` and once over `http://`.
//! A host counts as up on a scheme if any HTTP response at all comes
//! back within [`CHECK_TIMEOUT`]; the status code does not matter.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::name::NormalizedName;

/// The maximum number of hosts checked concurrently.
pub const CHECK_PARALLELISM: usize = 8;

/// The time allowed for a single request.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// The reachability of one host.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ServiceReachability {
    pub host: NormalizedName,
    pub https_up: bool,
    pub http_up: bool,
}

/// Something that can tell whether a URL answers.
pub trait Reachability: Send + Sync {
    /// Requests `url` and returns whether any response came back.
    fn is_up(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// Checks every distinct host of `hosts`, at most
/// [`CHECK_PARALLELISM`] at a time. Results are in order of first
/// appearance. A check whose task fails counts as down on both schemes.
pub async fn check_hosts<R: Reachability + 'static>(
    checker: &Arc<R>,
    hosts: &[NormalizedName],
) -> Vec<ServiceReachability> {
    let mut seen = HashSet::new();
    let hosts: Vec<&NormalizedName> = hosts
        .iter()
        .filter(|host| !host.is_empty() && seen.insert(*host))
        .collect();
    let mut out = Vec::with_capacity(hosts.len());

    for chunk in hosts.chunks(CHECK_PARALLELISM) {
        let mut tasks = JoinSet::new();
        for (i, host) in chunk.iter().enumerate() {
            let checker = Arc::clone(checker);
            let host = (*host).clone();
            tasks.spawn(async move { (i, check_host(&*checker, host).await) });
        }

        let mut slots: Vec<Option<ServiceReachability>> = vec![None; chunk.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, reachability)) => slots[i] = Some(reachability),
                Err(e) => debug!("A reachability task failed: {}", e),
            }
        }

        for (slot, host) in slots.into_iter().zip(chunk) {
            out.push(slot.unwrap_or_else(|| ServiceReachability {
                host: (*host).clone(),
                https_up: false,
                http_up: false,
            }));
        }
    }

    debug!("Checked the reachability of {} service host(s).", out.len());
    out
}

async fn check_host<R: Reachability>(checker: &R, host: NormalizedName) -> ServiceReachability {
    let https = format!("https://{}", host);
    let http = format!("http://{}", host);
    let (https_up, http_up) = tokio::join!(
        is_up_within(checker, &https),
        is_up_within(checker, &http)
    );
    ServiceReachability {
        host,
        https_up,
        http_up,
    }
}

async fn is_up_within<R: Reachability>(checker: &R, url: &str) -> bool {
    timeout(CHECK_TIMEOUT, checker.is_up(url)).await.unwrap_or(false)
}

////////////////////////////////////////////////////////////////////////
// RESULTS                                                            //
////////////////////////////////////////////////////////////////////////

/// Reachability results keyed by host. Like the
/// [`EnrichmentCache`](super::EnrichmentCache), it only grows.
#[derive(Clone, Debug, Default)]
pub struct ReachabilityResults {
    entries: HashMap<NormalizedName, ServiceReachability>,
}

impl ReachabilityResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<&ServiceReachability> {
        self.entries.get(host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds results, skipping hosts already present. Returns the number
    /// of entries added.
    pub fn merge(&mut self, results: impl IntoIterator<Item = ServiceReachability>) -> usize {
        let mut added = 0;
        for result in results {
            if !self.entries.contains_key(&result.host) {
                self.entries.insert(result.host.clone(), result);
                added += 1;
            }
        }
        added
    }

    /// Returns the distinct hosts among `hosts` with no result, in
    /// order of first appearance.
    pub fn missing<'a>(
        &self,
        hosts: impl IntoIterator<Item = &'a NormalizedName>,
    ) -> Vec<NormalizedName> {
        let mut seen = HashSet::new();
        hosts
            .into_iter()
            .filter(|host| !self.entries.contains_key(*host) && seen.insert(*host))
            .cloned()
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////
// HTTP CHECKS                                                        //
////////////////////////////////////////////////////////////////////////

#[cfg(feature = "doh")]
pub use http::HttpReachability;

#[cfg(feature = "doh")]
mod http {
    use std::future::Future;
    use std::time::Duration;

    use reqwest::redirect::Policy;

    use super::Reachability;

    const MAX_REDIRECTS: usize = 4;
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

    /// Checks URLs with plain `GET` requests.
    #[derive(Clone, Debug)]
    pub struct HttpReachability {
        client: reqwest::Client,
    }

    impl HttpReachability {
        /// Creates a checker following at most four redirects.
        pub fn new() -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .redirect(Policy::limited(MAX_REDIRECTS))
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()?;
            Ok(Self::with_client(client))
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl Reachability for HttpReachability {
        fn is_up(&self, url: &str) -> impl Future<Output = bool> + Send {
            let request = self.client.get(url);
            async move { request.send().await.is_ok() }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// An in-memory [`Reachability`] for tests: the listed URLs are up,
    /// the listed slow URLs never answer.
    #[derive(Default)]
    pub struct StaticReachability {
        up: HashSet<String>,
        slow: HashSet<String>,
        pub requests: AtomicUsize,
    }

    impl StaticReachability {
        pub fn up(mut self, url: &str) -> Self {
            self.up.insert(url.to_owned());
            self
        }

        pub fn slow(mut self, url: &str) -> Self {
            self.slow.insert(url.to_owned());
            self
        }
    }

    impl Reachability for StaticReachability {
        fn is_up(&self, url: &str) -> impl Future<Output = bool> + Send {
            self.requests.fetch_add(1, Ordering::Relaxed);
            let up = self.up.contains(url);
            let slow = self.slow.contains(url);
            async move {
                if slow {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                up
            }
        }
    }

    fn name(s: &str) -> NormalizedName {
        NormalizedName::new(s)
    }

    #[tokio::test]
    async fn hosts_are_checked_on_both_schemes() {
        let checker = Arc::new(
            StaticReachability::default()
                .up("https://shop.myshopify.com")
                .up("http://shop.myshopify.com")
                .up("http://legacy.test"),
        );
        let hosts = [name("shop.myshopify.com"), name("legacy.test"), name("shop.myshopify.com")];
        let results = check_hosts(&checker, &hosts).await;
        assert_eq!(
            results,
            [
                ServiceReachability {
                    host: name("shop.myshopify.com"),
                    https_up: true,
                    http_up: true,
                },
                ServiceReachability {
                    host: name("legacy.test"),
                    https_up: false,
                    http_up: true,
                },
            ]
        );
        assert_eq!(checker.requests.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn many_hosts_keep_their_order() {
        let mut checker = StaticReachability::default();
        let hosts: Vec<NormalizedName> = (0..20).map(|i| name(&format!("h{}.test", i))).collect();
        for host in hosts.iter().step_by(2) {
            checker = checker.up(&format!("https://{}", host));
        }
        let results = check_hosts(&Arc::new(checker), &hosts).await;
        let checked: Vec<&NormalizedName> = results.iter().map(|r| &r.host).collect();
        assert_eq!(checked, hosts.iter().collect::<Vec<_>>());
        assert!(results[18].https_up);
        assert!(!results[19].https_up);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_hosts_time_out_as_down() {
        let checker = Arc::new(
            StaticReachability::default()
                .up("http://slow.test")
                .slow("https://slow.test"),
        );
        let results = check_hosts(&checker, &[name("slow.test")]).await;
        assert!(!results[0].https_up);
        assert!(results[0].http_up);
    }

    #[test]
    fn results_only_grow() {
        let mut results = ReachabilityResults::new();
        let up = ServiceReachability {
            host: name("a.test"),
            https_up: true,
            http_up: false,
        };
        assert_eq!(results.merge([up.clone()]), 1);
        let down = ServiceReachability {
            https_up: false,
            ..up.clone()
        };
        assert_eq!(results.merge([down]), 0);
        assert_eq!(results.get("a.test"), Some(&up));

        let hosts = [name("a.test"), name("b.test"), name("b.test")];
        assert_eq!(results.missing(&hosts), [name("b.test")]);
    }
}
