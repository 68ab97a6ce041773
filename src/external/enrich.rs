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

//! Enrichment rounds: batches of external resolutions tagged with the
//! epoch of the record set that requested them.

use std::sync::Arc;

use log::debug;
use tokio::task::JoinSet;

use super::{ExternalResolution, ExternalResolver, Lookup, Source, UNRESOLVED_MESSAGE};
use crate::name::NormalizedName;
use crate::resolve::Resolution;

/// The maximum number of names resolved concurrently within a round.
pub const ROUND_PARALLELISM: usize = 16;

/// A generation counter for record sets.
///
/// A session advances its epoch each time its record set changes. A
/// round remembers the epoch it was started in, so that its results
/// can be recognized as stale if they arrive after a further change.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Epoch(u64);

impl Epoch {
    /// Returns the following epoch.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A batch of names to resolve externally.
#[derive(Clone, Debug)]
pub struct EnrichmentRound {
    epoch: Epoch,
    names: Vec<NormalizedName>,
}

impl EnrichmentRound {
    /// Creates a round. The caller is responsible for deduplicating
    /// `names` against the cache and against other in-flight rounds.
    pub fn new(epoch: Epoch, names: Vec<NormalizedName>) -> Self {
        Self { epoch, names }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn names(&self) -> &[NormalizedName] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The results of an [`EnrichmentRound`].
#[derive(Clone, Debug)]
pub struct EnrichmentResults {
    epoch: Epoch,
    resolutions: Vec<ExternalResolution>,
}

impl EnrichmentResults {
    pub fn new(epoch: Epoch, resolutions: Vec<ExternalResolution>) -> Self {
        Self { epoch, resolutions }
    }

    /// Returns the epoch of the round that produced these results.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Returns the resolutions, in the order the names were requested.
    pub fn resolutions(&self) -> &[ExternalResolution] {
        &self.resolutions
    }

    pub fn into_resolutions(self) -> Vec<ExternalResolution> {
        self.resolutions
    }
}

impl<L: Lookup + 'static> ExternalResolver<L> {
    /// Resolves every name of `round`, at most [`ROUND_PARALLELISM`] at
    /// a time.
    ///
    /// Each name yields exactly one resolution. Should a resolution
    /// task fail to complete (which only happens if it panics), the
    /// name is reported as unresolved with the task's error.
    pub async fn run_round(self: &Arc<Self>, round: EnrichmentRound) -> EnrichmentResults {
        let mut resolutions = Vec::with_capacity(round.names.len());

        for chunk in round.names.chunks(ROUND_PARALLELISM) {
            let mut tasks = JoinSet::new();
            for (i, name) in chunk.iter().enumerate() {
                let resolver = Arc::clone(self);
                let name = name.clone();
                tasks.spawn(async move { (i, resolver.resolve(&name).await) });
            }

            let mut slots: Vec<Option<ExternalResolution>> = vec![None; chunk.len()];
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((i, resolution)) => slots[i] = Some(resolution),
                    Err(e) => debug!("An external resolution task failed: {}", e),
                }
            }

            for (slot, name) in slots.into_iter().zip(chunk) {
                resolutions.push(slot.unwrap_or_else(|| abandoned(name)));
            }
        }

        debug!(
            "Enrichment round for epoch {:?} resolved {} name(s).",
            round.epoch,
            resolutions.len(),
        );
        EnrichmentResults::new(round.epoch, resolutions)
    }
}

/// Builds the resolution reported for a name whose task did not finish.
fn abandoned(name: &NormalizedName) -> ExternalResolution {
    ExternalResolution {
        resolution: Resolution {
            chain: vec![name.clone()],
            terminal: name.clone(),
            ..Resolution::default()
        },
        reverse_hostnames: Vec::new(),
        source: Source::External,
        error: Some(UNRESOLVED_MESSAGE.to_owned()),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::external::tests::StaticLookup;
    use crate::external::ResolverOptions;
    use crate::record::Type;

    #[test]
    fn epochs_advance() {
        let epoch = Epoch::default();
        assert!(epoch.next() > epoch);
        assert_ne!(epoch.next(), epoch);
    }

    #[tokio::test]
    async fn large_rounds_resolve_every_name_in_order() {
        let mut lookup = StaticLookup::default();
        let names: Vec<NormalizedName> = (0..40)
            .map(|i| NormalizedName::new(&format!("h{}.test", i)))
            .collect();
        for (i, name) in names.iter().enumerate() {
            let ip = format!("192.0.2.{}", i);
            lookup = lookup.answer(name, Type::A, &[ip.as_str()]);
        }
        let resolver = Arc::new(ExternalResolver::new(lookup, ResolverOptions::default()));
        let epoch = Epoch::default().next();
        let results = resolver
            .run_round(EnrichmentRound::new(epoch, names.clone()))
            .await;

        assert_eq!(results.epoch(), epoch);
        let resolved: Vec<&NormalizedName> = results.resolutions().iter().map(|r| r.name()).collect();
        assert_eq!(resolved, names.iter().collect::<Vec<_>>());
        assert_eq!(results.resolutions()[39].resolution.ipv4, ["192.0.2.39"]);
        // One CNAME, one A and one AAAA query per name.
        assert_eq!(resolver.lookup.queries.load(Ordering::Relaxed), 120);
    }
}
