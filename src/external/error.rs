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

//! Implementation of the [`LookupError`] type.

use std::fmt;

/// Errors that arise from a single out-of-band DNS query.
///
/// None of these are fatal to a topology build: the resolver records
/// them on the affected [`ExternalResolution`](super::ExternalResolution)
/// and carries on with whatever it has.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum LookupError {
    /// The query did not complete within its timeout.
    Timeout,

    /// The server answered with a non-success HTTP status.
    Status(u16),

    /// The request could not be sent or the response not received.
    Transport(String),

    /// The response could not be parsed.
    Parse(String),

    /// No endpoints were configured to send the query to.
    NoEndpoints,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("the lookup timed out"),
            Self::Status(status) => write!(f, "the server responded with HTTP status {}", status),
            Self::Transport(message) => write!(f, "the request failed: {}", message),
            Self::Parse(message) => write!(f, "the response could not be parsed: {}", message),
            Self::NoEndpoints => f.write_str("no resolver endpoints are configured"),
        }
    }
}

impl std::error::Error for LookupError {}
