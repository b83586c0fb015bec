//! URL helpers shared by link expansion and scraping.

use std::net::IpAddr;

use url::Url;

/// Dedup key for a link: hash fragment removed and a single trailing slash
/// stripped from non-root paths. Query string and case are left untouched.
///
/// The result is only ever used as a key; links are emitted in their original form.
pub fn normalize_url(link: &str) -> String {
    let without_fragment = match link.find('#') {
        Some(idx) => &link[..idx],
        None => link,
    };

    let (base, query) = match without_fragment.find('?') {
        Some(idx) => without_fragment.split_at(idx),
        None => (without_fragment, ""),
    };

    let path_start = match base.find("://") {
        Some(idx) => base[idx + 3..].find('/').map(|p| idx + 3 + p),
        None => Some(0),
    };

    let mut normalized = base.to_string();
    if let Some(start) = path_start {
        let path = &base[start..];
        if path.len() > 1 && path.ends_with('/') {
            normalized.pop();
        }
    }
    normalized.push_str(query);
    normalized
}

/// True if `link` contains any of `domains` as a substring.
pub fn matches_any_domain<S: AsRef<str>>(link: &str, domains: &[S]) -> bool {
    domains.iter().any(|d| {
        let d = d.as_ref();
        !d.is_empty() && link.contains(d)
    })
}

/// Check if a URL targets a non-HTTP scheme or a private/loopback host.
pub fn is_private_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
