// Copyright 2021 Matthew Ingwersen.
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

//! Implementation of the [`NormalizedName`] type.
//!
//! Hosted DNS providers hand out owner names and record targets in a
//! variety of shapes: fully qualified with or without a trailing dot,
//! relative to the zone, in mixed case, or as the editor shorthand `@`
//! for the zone apex. Every map in this crate is keyed on a single
//! canonical form, which this module produces:
//!
//! * ASCII letters are lowercased;
//! * surrounding whitespace and a trailing dot are stripped;
//! * `@` and the empty name denote the zone apex; and
//! * owner names that are not at or below the zone apex are treated as
//!   relative and qualified with the zone name.
//!
//! Record *targets* (the right-hand side of a CNAME, MX, etc.) are
//! never qualified, since they routinely point outside the zone.

use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;
use std::str::FromStr;

use serde::Serialize;

mod reverse;
pub use reverse::reverse_lookup_name;

/// The owner name used by record editors to denote the zone apex.
pub const APEX_MARKER: &str = "@";

/// A domain name in the canonical form used throughout the crate.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Normalizes `raw` without any zone context. `@` is kept as-is;
    /// use [`NormalizedName::target`] or [`NormalizedName::owner`] when
    /// the zone is known.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().trim_end_matches('.').to_ascii_lowercase())
    }

    /// Normalizes a record owner name within `zone`. The apex marker
    /// and the empty name map to the zone apex, and names outside the
    /// zone are qualified with it.
    pub fn owner(raw: &str, zone: &NormalizedName) -> Self {
        let name = Self::new(raw);
        if name.is_empty() || name.0 == APEX_MARKER {
            zone.clone()
        } else if zone.is_empty() || name.is_within(zone) {
            name
        } else {
            Self(format!("{}.{}", name.0, zone.0))
        }
    }

    /// Normalizes a record target. Only the apex marker is substituted;
    /// targets are otherwise taken to be fully qualified.
    pub fn target(raw: &str, zone: &NormalizedName) -> Self {
        let name = Self::new(raw);
        if name.0 == APEX_MARKER {
            zone.clone()
        } else {
            name
        }
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this name is at or below `zone`.
    pub fn is_within(&self, zone: &NormalizedName) -> bool {
        if zone.is_empty() {
            return true;
        }
        self.0 == zone.0
            || (self.0.len() > zone.0.len()
                && self.0.ends_with(zone.as_str())
                && self.0.as_bytes()[self.0.len() - zone.0.len() - 1] == b'.')
    }

    /// Returns the label used to display this name relative to `zone`:
    /// `@` for the apex, the leading labels for names within the zone,
    /// and the full name otherwise.
    pub fn relative_to(&self, zone: &NormalizedName) -> &str {
        if zone.is_empty() {
            &self.0
        } else if self.0 == zone.0 {
            APEX_MARKER
        } else if self.is_within(zone) {
            &self.0[..self.0.len() - zone.0.len() - 1]
        } else {
            &self.0
        }
    }

    /// Returns whether this "name" is actually an IPv4 or IPv6 address
    /// literal.
    pub fn is_ip_literal(&self) -> bool {
        self.0.parse::<IpAddr>().is_ok()
    }
}

impl Deref for NormalizedName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NormalizedName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<NormalizedName> for String {
    fn from(name: NormalizedName) -> Self {
        name.0
    }
}

impl PartialEq<str> for NormalizedName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NormalizedName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Parses a name that must not be empty after normalization. This is
/// used where a name is required, e.g. the zone name in a
/// configuration file.
impl FromStr for NormalizedName {
    type Err = EmptyNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = Self::new(s);
        if name.is_empty() || name.0 == APEX_MARKER {
            Err(EmptyNameError)
        } else {
            Ok(name)
        }
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An error signaling that a name was empty after normalization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EmptyNameError;

impl fmt::Display for EmptyNameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the name is empty")
    }
}

impl std::error::Error for EmptyNameError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> NormalizedName {
        NormalizedName::new("Example.COM.")
    }

    #[test]
    fn new_lowercases_and_strips_trailing_dot() {
        assert_eq!(NormalizedName::new("  WWW.Example.com. "), "www.example.com");
    }

    #[test]
    fn owner_substitutes_apex() {
        assert_eq!(NormalizedName::owner("@", &zone()), "example.com");
        assert_eq!(NormalizedName::owner("", &zone()), "example.com");
        assert_eq!(NormalizedName::owner("example.com.", &zone()), "example.com");
    }

    #[test]
    fn owner_qualifies_relative_names() {
        assert_eq!(NormalizedName::owner("mail", &zone()), "mail.example.com");
        assert_eq!(
            NormalizedName::owner("Mail.Example.Com", &zone()),
            "mail.example.com"
        );
    }

    #[test]
    fn owner_does_not_confuse_label_suffixes() {
        // "notexample.com" ends with "example.com" but is not within it.
        assert_eq!(
            NormalizedName::owner("notexample.com", &zone()),
            "notexample.com.example.com"
        );
    }

    #[test]
    fn target_only_substitutes_apex() {
        assert_eq!(NormalizedName::target("@", &zone()), "example.com");
        assert_eq!(NormalizedName::target("ghs.googlehosted.com.", &zone()), "ghs.googlehosted.com");
        assert_eq!(NormalizedName::target("mail", &zone()), "mail");
    }

    #[test]
    fn relative_to_produces_display_labels() {
        let zone = zone();
        assert_eq!(NormalizedName::new("example.com").relative_to(&zone), "@");
        assert_eq!(NormalizedName::new("a.b.example.com").relative_to(&zone), "a.b");
        assert_eq!(NormalizedName::new("other.org").relative_to(&zone), "other.org");
    }

    #[test]
    fn ip_literals_are_detected() {
        assert!(NormalizedName::new("192.0.2.1").is_ip_literal());
        assert!(NormalizedName::new("2001:db8::1").is_ip_literal());
        assert!(!NormalizedName::new("www.example.com").is_ip_literal());
    }

    #[test]
    fn from_str_rejects_empty_names() {
        assert!("".parse::<NormalizedName>().is_err());
        assert!("@".parse::<NormalizedName>().is_err());
        assert_eq!("Example.com.".parse::<NormalizedName>().unwrap(), "example.com");
    }
}
