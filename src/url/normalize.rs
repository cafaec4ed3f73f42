use crate::UrlError;
use std::collections::HashSet;
use url::Url;

/// Canonicalizes a URL string
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase scheme and host (the parser already enforces this)
/// 3. Drop default ports (80 for http, 443 for https)
/// 4. Re-encode the path in canonical percent form: unreserved characters
///    are decoded, everything else keeps an uppercase `%XX` escape
/// 5. Strip the fragment
/// 6. Sort query parameters by key, then value; an empty query is removed
///
/// Canonicalization is idempotent: applying it to its own output yields the
/// same URL.
///
/// # Examples
///
/// ```
/// use dredge::url::canonicalize;
///
/// let url = canonicalize("HTTPS://Example.COM:443/a/%7Euser?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a/~user?a=1&b=2");
/// ```
pub fn canonicalize(url_str: &str) -> Result<Url, UrlError> {
    canonicalize_with(url_str, &HashSet::new())
}

/// Canonicalizes a URL, preserving query order for parameter-sensitive hosts
///
/// Some sites use query-parameter order as part of the resource identifier;
/// hosts listed in `param_sensitive_hosts` keep their query string verbatim.
pub fn canonicalize_with(
    url_str: &str,
    param_sensitive_hosts: &HashSet<String>,
) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "only HTTP and HTTPS are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_string();

    // The parser already lowercases scheme and host and drops default ports;
    // the path still needs a canonical percent-encoding pass.
    let canonical_path = canonical_percent_encode(url.path());
    url.set_path(&canonical_path);

    url.set_fragment(None);

    if url.query().is_some() && !param_sensitive_hosts.contains(&host) {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params.iter());
        }
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Re-encodes a path in canonical percent form
///
/// Unreserved characters (`A-Z a-z 0-9 - . _ ~`) inside `%XX` escapes are
/// decoded; all other escapes are kept with uppercase hex digits. Literal
/// characters pass through unchanged (the parser has already encoded what
/// must be encoded).
fn canonical_percent_encode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = hi * 16 + lo;
                if is_unreserved(decoded) {
                    out.push(decoded as char);
                } else {
                    out.push('%');
                    out.push(to_hex_upper(hi));
                    out.push(to_hex_upper(lo));
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn to_hex_upper(v: u8) -> char {
    char::from_digit(v as u32, 16)
        .unwrap_or('0')
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_scheme_and_host() {
        let url = canonicalize("HTTP://EXAMPLE.COM/Page").unwrap();
        assert_eq!(url.as_str(), "http://example.com/Page");
    }

    #[test]
    fn test_default_ports_removed() {
        assert_eq!(
            canonicalize("https://example.com:443/").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            canonicalize("http://example.com:80/a").unwrap().as_str(),
            "http://example.com/a"
        );
    }

    #[test]
    fn test_non_default_port_kept() {
        let url = canonicalize("http://example.com:8080/a").unwrap();
        assert_eq!(url.as_str(), "http://example.com:8080/a");
    }

    #[test]
    fn test_fragment_stripped() {
        let url = canonicalize("https://example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_sorted() {
        let url = canonicalize("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_query_sorted_by_value_on_equal_keys() {
        let url = canonicalize("https://example.com/?x=2&x=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/?x=1&x=2");
    }

    #[test]
    fn test_empty_query_removed() {
        let url = canonicalize("https://example.com/page?").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_param_sensitive_host_preserves_order() {
        let mut hosts = HashSet::new();
        hosts.insert("picky.example".to_string());

        let url = canonicalize_with("https://picky.example/p?b=2&a=1", &hosts).unwrap();
        assert_eq!(url.as_str(), "https://picky.example/p?b=2&a=1");
    }

    #[test]
    fn test_unreserved_escapes_decoded() {
        let url = canonicalize("https://example.com/%7Euser/%41bc").unwrap();
        assert_eq!(url.as_str(), "https://example.com/~user/Abc");
    }

    #[test]
    fn test_reserved_escapes_uppercased() {
        let url = canonicalize("https://example.com/a%2fb").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a%2Fb");
    }

    #[test]
    fn test_dot_segments_resolved() {
        let url = canonicalize("https://example.com/a/../b/./c").unwrap();
        assert_eq!(url.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(matches!(
            canonicalize("ftp://example.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(canonicalize("not a url").is_err());
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "HTTPS://Example.COM:443/a/%7Euser?b=2&a=1#top",
            "http://example.com/a%2fb?q=hello%20world",
            "https://example.com/",
            "https://example.com/path?z=26&a=1&m=13",
        ];

        for input in inputs {
            let once = canonicalize(input).unwrap();
            let twice = canonicalize(once.as_str()).unwrap();
            assert_eq!(once.as_str(), twice.as_str(), "not idempotent for {input}");
        }
    }
}
