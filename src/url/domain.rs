use url::Url;

/// Multi-label public suffixes that need three labels for a registrable
/// domain. Deliberately small; the common cases a crawler meets.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.jp", "or.jp", "ne.jp",
    "co.nz", "com.br", "com.mx", "co.in", "co.za",
];

/// Extracts the lowercase host from a URL
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Computes the registrable domain of a host
///
/// `blog.example.com` → `example.com`; `a.b.co.uk` → `b.co.uk`. IP
/// addresses and single-label hosts (e.g. `localhost`) are returned as-is.
///
/// # Examples
///
/// ```
/// use dredge::url::registrable_domain;
///
/// assert_eq!(registrable_domain("blog.example.com"), "example.com");
/// assert_eq!(registrable_domain("a.b.co.uk"), "b.co.uk");
/// assert_eq!(registrable_domain("localhost"), "localhost");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.to_lowercase();

    // IPv4/IPv6 literals have no registrable domain
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };

    if labels.len() <= keep {
        host
    } else {
        labels[labels.len() - keep..].join(".")
    }
}

/// Checks whether a candidate host belongs to the same site as a root host
///
/// True when the candidate equals the root's registrable domain or is a
/// subdomain of it.
pub fn same_site(root_host: &str, candidate_host: &str) -> bool {
    let base = registrable_domain(root_host);
    let candidate = candidate_host.to_lowercase();

    candidate == base || candidate.ends_with(&format!(".{base}"))
}
