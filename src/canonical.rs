//! # URL canonicalization
//!
//! Normalizes story URLs for identity comparison so that links differing only
//! by tracking parameters, fragments, or scheme/host case collapse to one key.
//!
//! - Scheme and host are lowercased; path, user-info and port are kept
//!   byte-for-byte (no default-port removal, no dot-segment resolution, no
//!   re-encoding).
//! - The fragment is dropped.
//! - Query parameters named `utm_*` (any case), `gclid` or `fbclid` are removed;
//!   an empty remainder drops the `?` entirely.
//! - Anything that does not parse as an absolute URL is returned unchanged.
//!
//! `url::Url` only validates; the output is spliced from the input so the
//! parser's own normalization never leaks into the result.

use url::Url;

/// Query parameter names removed regardless of their value (compared lowercase).
const TRACKING_PARAMS: [&str; 2] = ["gclid", "fbclid"];
const TRACKING_PREFIX: &str = "utm_";

/// Best-effort canonical form of `url`. Never fails: malformed or blank input
/// is passed through as-is.
pub fn canonicalize(url: &str) -> String {
    if url.trim().is_empty() || Url::parse(url).is_err() {
        return url.to_string();
    }
    let Some((scheme, rest)) = url.split_once(':') else {
        return url.to_string();
    };

    // Fragment first: a `?` after `#` belongs to the fragment.
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (hier, query) = match rest.split_once('?') {
        Some((h, q)) => (h, Some(q)),
        None => (rest, None),
    };

    let mut out = String::with_capacity(url.len());
    out.push_str(&scheme.to_ascii_lowercase());
    out.push(':');

    match hier.strip_prefix("//") {
        Some(after) => {
            let (authority, path) = after.split_at(after.find('/').unwrap_or(after.len()));
            let (userinfo, hostport) = match authority.rfind('@') {
                Some(i) => authority.split_at(i + 1),
                None => ("", authority),
            };
            let (host, port) = split_port(hostport);
            out.push_str("//");
            out.push_str(userinfo);
            out.push_str(&host.to_ascii_lowercase());
            out.push_str(port);
            out.push_str(path);
        }
        // No authority (`mailto:`, `urn:`...): nothing to lowercase.
        None => out.push_str(hier),
    }

    if let Some(q) = query {
        let kept = strip_tracking(q);
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept);
        }
    }
    out
}

/// `host[:port]` → (`host`, `:port` or ""). Bracketed IPv6 literals keep
/// their colons.
fn split_port(hostport: &str) -> (&str, &str) {
    let search_from = if hostport.starts_with('[') {
        hostport.find(']').unwrap_or(0)
    } else {
        0
    };
    match hostport[search_from..].find(':') {
        Some(i) => hostport.split_at(search_from + i),
        None => (hostport, ""),
    }
}

/// Looser identity used for grouping: canonical form, trimmed, lowercased and
/// without trailing slashes. Empty when the URL carries no usable identity.
pub fn identity_key(url: &str) -> String {
    let canonical = canonicalize(url.trim());
    canonical
        .trim()
        .to_lowercase()
        .trim_end_matches('/')
        .to_string()
}

/// Drops tracking pairs; every other segment (empty ones included) is kept
/// verbatim and in order.
fn strip_tracking(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !is_tracking_param(pair.split('=').next().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("&")
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with(TRACKING_PREFIX) || TRACKING_PARAMS.contains(&name.as_str())
}
