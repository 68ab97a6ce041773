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

//! Implementation of [`FallbackLookup`].

use std::future::Future;

use log::trace;

use super::{Lookup, LookupError};
use crate::record::Type;

/// A [`Lookup`] that asks a primary source first and a secondary source
/// only when the primary's answer is empty or fails.
///
/// This is how plain DNS and DNS-over-HTTPS are combined: queries go to
/// a conventional resolver, and DoH fills in whatever it could not
/// answer. The fallback is decided per query, so a name whose A query
/// succeeds over DNS can still have its AAAA records found over DoH.
#[derive(Clone, Debug)]
pub struct FallbackLookup<P, S> {
    primary: P,
    secondary: S,
}

impl<P: Lookup, S: Lookup> FallbackLookup<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

impl<P: Lookup, S: Lookup> Lookup for FallbackLookup<P, S> {
    fn query(
        &self,
        name: &str,
        rr_type: Type,
    ) -> impl Future<Output = Result<Vec<String>, LookupError>> + Send {
        async move {
            let primary = self.primary.query(name, rr_type).await;
            if matches!(&primary, Ok(answers) if !answers.is_empty()) {
                return primary;
            }
            trace!("Falling back for {} {}.", name, rr_type);

            // An empty answer from either source outranks failures, and
            // the primary's failure is the one reported.
            match (primary, self.secondary.query(name, rr_type).await) {
                (_, Ok(answers)) => Ok(answers),
                (Ok(empty), Err(_)) => Ok(empty),
                (Err(e), Err(_)) => Err(e),
            }
        }
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

    #[tokio::test]
    async fn answered_queries_skip_the_secondary() {
        let lookup = FallbackLookup::new(
            StaticLookup::default().answer("www.test", Type::A, &["192.0.2.1"]),
            StaticLookup::default().answer("www.test", Type::A, &["192.0.2.2"]),
        );
        assert_eq!(lookup.query("www.test", Type::A).await.unwrap(), ["192.0.2.1"]);
        assert_eq!(lookup.secondary().queries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn empty_or_failed_queries_use_the_secondary() {
        let lookup = FallbackLookup::new(
            StaticLookup::default()
                .answer("www.test", Type::A, &["192.0.2.1"])
                .fail("cdn.test", Type::A, LookupError::Timeout),
            StaticLookup::default()
                .answer("www.test", Type::AAAA, &["2001:db8::1"])
                .answer("cdn.test", Type::A, &["192.0.2.9"]),
        );
        // The families are filled in independently.
        assert_eq!(lookup.query("www.test", Type::A).await.unwrap(), ["192.0.2.1"]);
        assert_eq!(lookup.query("www.test", Type::AAAA).await.unwrap(), ["2001:db8::1"]);
        assert_eq!(lookup.query("cdn.test", Type::A).await.unwrap(), ["192.0.2.9"]);
        assert_eq!(lookup.secondary().queries.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn primary_errors_are_reported_when_both_fail() {
        let lookup = FallbackLookup::new(
            StaticLookup::default().fail("www.test", Type::A, LookupError::Timeout),
            StaticLookup::default().fail("www.test", Type::A, LookupError::Status(503)),
        );
        assert_eq!(lookup.query("www.test", Type::A).await, Err(LookupError::Timeout));

        let lookup = FallbackLookup::new(
            StaticLookup::default(),
            StaticLookup::default().fail("www.test", Type::A, LookupError::Status(503)),
        );
        assert_eq!(lookup.query("www.test", Type::A).await, Ok(Vec::new()));
    }
}
