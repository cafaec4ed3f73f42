//! Sitemap discovery
//!
//! Fetches `/sitemap.xml` for the crawl root and collects page URLs,
//! recursing into sitemap indexes. Bounded by a URL budget and an index
//! depth so hostile sitemaps cannot spin the seeder.

use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::HashSet;
use std::io::Cursor;
use url::Url;

const MAX_INDEX_DEPTH: usize = 3;

/// Collects page URLs from the root's sitemap, up to `limit`
///
/// Unreachable or malformed sitemaps yield an empty list; sitemap seeding
/// is always best-effort.
pub async fn discover_sitemap_urls(client: &reqwest::Client, root: &Url, limit: usize) -> Vec<Url> {
    let sitemap_url = format!(
        "{}://{}{}/sitemap.xml",
        root.scheme(),
        root.host_str().unwrap_or(""),
        root.port().map(|p| format!(":{p}")).unwrap_or_default()
    );

    let mut collected = Vec::new();
    let mut visited = HashSet::new();
    collect(client, &sitemap_url, limit, 0, &mut collected, &mut visited).await;

    tracing::debug!(
        "Sitemap discovery for {} yielded {} URLs",
        root,
        collected.len()
    );
    collected
}

async fn collect(
    client: &reqwest::Client,
    sitemap_url: &str,
    limit: usize,
    depth: usize,
    collected: &mut Vec<Url>,
    visited: &mut HashSet<String>,
) {
    if collected.len() >= limit
        || depth > MAX_INDEX_DEPTH
        || !visited.insert(sitemap_url.to_string())
    {
        return;
    }

    let body = match client.get(sitemap_url).send().await {
        Ok(response) if response.status().is_success() => {
            response.text().await.unwrap_or_default()
        }
        _ => return,
    };

    let mut child_sitemaps = Vec::new();
    for entity in SiteMapReader::new(Cursor::new(body.into_bytes())) {
        if collected.len() >= limit {
            break;
        }
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(loc) = entry.loc.get_url() {
                    collected.push(loc);
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Some(loc) = entry.loc.get_url() {
                    child_sitemaps.push(loc.to_string());
                }
            }
            SiteMapEntity::Err(_) => {}
        }
    }

    for child in child_sitemaps {
        if collected.len() >= limit {
            break;
        }
        Box::pin(collect(client, &child, limit, depth + 1, collected, visited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[tokio::test]
    async fn test_simple_sitemap() {
        let server = MockServer::start().await;
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>{0}/a</loc></url>
                <url><loc>{0}/b</loc></url>
            </urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let urls = discover_sitemap_urls(&client(), &root, 100).await;

        assert_eq!(urls.len(), 2);
        assert!(urls[0].path().ends_with("/a"));
    }

    #[tokio::test]
    async fn test_sitemap_index_recursion() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <sitemap><loc>{0}/sitemap-pages.xml</loc></sitemap>
            </sitemapindex>"#,
            server.uri()
        );
        let pages = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>{0}/deep</loc></url>
            </urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-pages.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(pages))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let urls = discover_sitemap_urls(&client(), &root, 100).await;

        assert_eq!(urls.len(), 1);
        assert!(urls[0].path().ends_with("/deep"));
    }

    #[tokio::test]
    async fn test_missing_sitemap_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        assert!(discover_sitemap_urls(&client(), &root, 100).await.is_empty());
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let server = MockServer::start().await;
        let mut body = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        );
        for i in 0..50 {
            body.push_str(&format!("<url><loc>{}/p{}</loc></url>", server.uri(), i));
        }
        body.push_str("</urlset>");
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let urls = discover_sitemap_urls(&client(), &root, 10).await;
        assert_eq!(urls.len(), 10);
    }
}
