//! Proxy host label encoding.
//!
//! Instances are reachable through a DNS label derived from their session id
//! and internal address, e.g. `ip10-0-0-1-aaaabbbbcccc`. The encoding is pure:
//! the same inputs always give the same label and distinct addresses within a
//! session give distinct labels.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ip(\d{1,3})-(\d{1,3})-(\d{1,3})-(\d{1,3})-([0-9a-z]+)(?:-(\d{1,5}))?(?:\.(.+))?$")
        .expect("host label pattern is valid")
});

/// Optional parts of an encoded host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOpts {
    /// Domain appended after the label
    pub tld: String,
    /// Port suffix; omitted when zero
    pub encoded_port: u16,
}

/// A proxy host resolved back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHost {
    pub session_id: String,
    pub ip: Ipv4Addr,
    pub port: Option<u16>,
    pub tld: Option<String>,
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Encode a routable host label for an instance address in a session.
pub fn encode_host(session_id: &str, ip: &str, opts: &HostOpts) -> String {
    let mut host = format!("ip{}-{}", sanitize(ip), sanitize(session_id));
    if opts.encoded_port > 0 {
        host.push_str(&format!("-{}", opts.encoded_port));
    }
    if !opts.tld.is_empty() {
        host.push('.');
        host.push_str(&opts.tld.to_ascii_lowercase());
    }
    host
}

/// Decode a label produced by [`encode_host`] for an IPv4 address.
pub fn decode_host(host: &str) -> Option<DecodedHost> {
    let caps = HOST_LABEL.captures(host)?;

    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps.get(i + 1)?.as_str().parse().ok()?;
    }

    let port = match caps.get(6) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };

    Some(DecodedHost {
        session_id: caps.get(5)?.as_str().to_string(),
        ip: Ipv4Addr::from(octets),
        port,
        tld: caps.get(7).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_host() {
        assert_eq!(
            encode_host("aaaabbbbcccc", "10.0.0.1", &HostOpts::default()),
            "ip10-0-0-1-aaaabbbbcccc"
        );

        let opts = HostOpts {
            tld: "play-with-docker.com".to_string(),
            encoded_port: 8080,
        };
        assert_eq!(
            encode_host("aaaabbbbcccc", "10.0.0.1", &opts),
            "ip10-0-0-1-aaaabbbbcccc-8080.play-with-docker.com"
        );
    }

    #[test]
    fn test_encode_host_is_deterministic_and_distinct() {
        let opts = HostOpts::default();
        let first = encode_host("aaaabbbbcccc", "10.0.0.1", &opts);
        assert_eq!(first, encode_host("aaaabbbbcccc", "10.0.0.1", &opts));
        assert_ne!(first, encode_host("aaaabbbbcccc", "10.0.0.2", &opts));
        assert_ne!(first, encode_host("aaaabbbbcccd", "10.0.0.1", &opts));
    }

    #[test]
    fn test_encode_host_malformed_input_is_dns_safe() {
        let host = encode_host("Session_ID!", "fe80::1%eth0", &HostOpts::default());
        assert_eq!(host, "ipfe80--1-eth0-session-id-");
        assert!(host
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));

        assert_eq!(encode_host("", "", &HostOpts::default()), "ip-");
    }

    #[test]
    fn test_decode_host() {
        let decoded = decode_host("ip10-0-0-1-aaaabbbbcccc").unwrap();
        assert_eq!(decoded.session_id, "aaaabbbbcccc");
        assert_eq!(decoded.ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(decoded.port, None);
        assert_eq!(decoded.tld, None);

        let decoded = decode_host("ip192-168-1-20-aaaabbbbcccc-2375.labs.example.com").unwrap();
        assert_eq!(decoded.ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(decoded.port, Some(2375));
        assert_eq!(decoded.tld.as_deref(), Some("labs.example.com"));

        assert!(decode_host("ip300-0-0-1-aaaabbbbcccc").is_none());
        assert!(decode_host("node1").is_none());
    }

    #[test]
    fn test_decode_inverts_encode() {
        let opts = HostOpts {
            tld: "localhost".to_string(),
            encoded_port: 80,
        };
        let host = encode_host("abc123", "172.18.0.4", &opts);
        let decoded = decode_host(&host).unwrap();
        assert_eq!(decoded.session_id, "abc123");
        assert_eq!(decoded.ip, Ipv4Addr::new(172, 18, 0, 4));
        assert_eq!(decoded.port, Some(80));
        assert_eq!(decoded.tld.as_deref(), Some("localhost"));
    }
}
