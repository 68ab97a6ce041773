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

//! Construction of reverse-lookup (PTR) names, as described in
//! [RFC 1035 § 3.5] and [RFC 3596 § 2.5].
//!
//! [RFC 1035 § 3.5]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.5
//! [RFC 3596 § 2.5]: https://datatracker.ietf.org/doc/html/rfc3596#section-2.5

use std::fmt::Write;
use std::net::IpAddr;

use super::NormalizedName;
use crate::util::nibble_to_ascii_hex_digit;

/// Returns the `in-addr.arpa.` or `ip6.arpa.` name under which PTR
/// records for `ip` are published.
pub fn reverse_lookup_name(ip: IpAddr) -> NormalizedName {
    let mut name = String::new();
    match ip {
        IpAddr::V4(v4) => {
            for octet in v4.octets().iter().rev() {
                let _ = write!(name, "{}.", octet);
            }
            name.push_str("in-addr.arpa");
        }
        IpAddr::V6(v6) => {
            for octet in v6.octets().iter().rev() {
                name.push(nibble_to_ascii_hex_digit(octet & 0xf) as char);
                name.push('.');
                name.push(nibble_to_ascii_hex_digit(octet >> 4) as char);
                name.push('.');
            }
            name.push_str("ip6.arpa");
        }
    }
    NormalizedName::new(&name)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_reverse_name_reverses_octets() {
        let ip: IpAddr = "192.0.2.10".parse().unwrap();
        assert_eq!(reverse_lookup_name(ip), "10.2.0.192.in-addr.arpa");
        let ip: IpAddr = "255.0.0.1".parse().unwrap();
        assert_eq!(reverse_lookup_name(ip), "1.0.0.255.in-addr.arpa");
    }

    #[test]
    fn ipv6_reverse_name_reverses_nibbles() {
        let ip: IpAddr = "2001:db8::567:89ab".parse().unwrap();
        assert_eq!(
            reverse_lookup_name(ip),
            "b.a.9.8.7.6.5.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa"
        );
    }
}
