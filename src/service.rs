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

//! Fingerprinting of third-party services by hostname suffix.

use serde::{Deserialize, Serialize};

use crate::name::NormalizedName;

/// A suffix pattern and the service it identifies.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServicePattern {
    pub suffix: String,
    pub service: String,
}

impl ServicePattern {
    /// Creates a pattern. The suffix is normalized, so that a leading
    /// dot, trailing dot, or capital letters are all accepted.
    pub fn new(suffix: &str, service: impl Into<String>) -> Self {
        Self {
            suffix: NormalizedName::new(suffix.trim().trim_start_matches('.')).into(),
            service: service.into(),
        }
    }

    /// Returns whether `host` is the suffix itself or a name below it.
    pub fn matches(&self, host: &str) -> bool {
        if self.suffix.is_empty() {
            return false;
        }
        host == self.suffix
            || (host.len() > self.suffix.len()
                && host.ends_with(self.suffix.as_str())
                && host.as_bytes()[host.len() - self.suffix.len() - 1] == b'.')
    }
}

/// The built-in pattern table. Order matters: more specific suffixes
/// come before the general ones they fall under.
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("cloudfront.net", "AWS CloudFront"),
    ("elb.amazonaws.com", "AWS Elastic Load Balancing"),
    ("s3.amazonaws.com", "AWS S3"),
    ("amazonaws.com", "AWS"),
    ("awsdns.com", "AWS Route 53"),
    ("azurewebsites.net", "Azure App Service"),
    ("azureedge.net", "Azure CDN"),
    ("trafficmanager.net", "Azure Traffic Manager"),
    ("cloudapp.azure.com", "Azure"),
    ("herokudns.com", "Heroku"),
    ("herokuapp.com", "Heroku"),
    ("github.io", "GitHub Pages"),
    ("netlify.app", "Netlify"),
    ("netlify.com", "Netlify"),
    ("vercel-dns.com", "Vercel"),
    ("vercel.app", "Vercel"),
    ("fastly.net", "Fastly"),
    ("akamaiedge.net", "Akamai"),
    ("akamai.net", "Akamai"),
    ("edgekey.net", "Akamai"),
    ("ghs.googlehosted.com", "Google Sites"),
    ("googlehosted.com", "Google"),
    ("aspmx.l.google.com", "Google Workspace"),
    ("google.com", "Google"),
    ("mail.protection.outlook.com", "Microsoft 365"),
    ("outlook.com", "Microsoft Outlook"),
    ("mailgun.org", "Mailgun"),
    ("sendgrid.net", "SendGrid"),
    ("zendesk.com", "Zendesk"),
    ("myshopify.com", "Shopify"),
    ("squarespace.com", "Squarespace"),
    ("wixdns.net", "Wix"),
    ("cloudflare.net", "Cloudflare"),
    ("cloudflare.com", "Cloudflare"),
];

/// Matches hostnames against an ordered table of suffix patterns.
#[derive(Clone, Debug)]
pub struct ServiceMatcher {
    patterns: Vec<ServicePattern>,
}

impl ServiceMatcher {
    /// Creates a matcher with only the built-in patterns.
    pub fn new() -> Self {
        Self::with_custom(Vec::new())
    }

    /// Creates a matcher whose `custom` patterns are tried before the
    /// built-in ones.
    pub fn with_custom(custom: Vec<ServicePattern>) -> Self {
        let mut patterns = custom;
        patterns.extend(
            BUILTIN_PATTERNS
                .iter()
                .map(|(suffix, service)| ServicePattern::new(suffix, *service)),
        );
        Self { patterns }
    }

    pub fn patterns(&self) -> &[ServicePattern] {
        &self.patterns
    }

    /// Returns the service of the first pattern matching `host`.
    /// Address literals never match.
    pub fn match_host(&self, host: &NormalizedName) -> Option<&str> {
        if host.is_empty() || host.is_ip_literal() {
            return None;
        }
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(host))
            .map(|pattern| pattern.service.as_str())
    }
}

impl Default for ServiceMatcher {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> NormalizedName {
        NormalizedName::new(s)
    }

    #[test]
    fn suffixes_are_anchored_at_label_boundaries() {
        let matcher = ServiceMatcher::new();
        assert_eq!(matcher.match_host(&host("d111.cloudfront.net")), Some("AWS CloudFront"));
        assert_eq!(matcher.match_host(&host("cloudfront.net")), Some("AWS CloudFront"));
        assert_eq!(matcher.match_host(&host("notcloudfront.net")), None);
        assert_eq!(matcher.match_host(&host("cloudfront.net.example.com")), None);
    }

    #[test]
    fn first_match_wins() {
        let matcher = ServiceMatcher::new();
        assert_eq!(
            matcher.match_host(&host("my-lb-1.us-east-1.elb.amazonaws.com")),
            Some("AWS Elastic Load Balancing")
        );
        assert_eq!(matcher.match_host(&host("ec2.amazonaws.com")), Some("AWS"));
    }

    #[test]
    fn custom_patterns_take_precedence() {
        let matcher = ServiceMatcher::with_custom(vec![ServicePattern::new(
            ".Edge.CloudFront.NET.",
            "Internal CDN",
        )]);
        assert_eq!(matcher.match_host(&host("x.edge.cloudfront.net")), Some("Internal CDN"));
        assert_eq!(matcher.match_host(&host("x.cloudfront.net")), Some("AWS CloudFront"));
    }

    #[test]
    fn address_literals_never_match() {
        let matcher = ServiceMatcher::with_custom(vec![ServicePattern::new("1", "Numbers")]);
        assert_eq!(matcher.match_host(&host("192.0.2.1")), None);
    }
}
