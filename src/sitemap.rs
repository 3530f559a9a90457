//! XML sitemap: the site root plus one entry per product.

use tracing::{info, warn};

use crate::catalog::FilterCriteria;
use crate::upstream::ProductSource;

/// Upper bound on listing pages walked while collecting ids.
pub const MAX_PAGES: usize = 50;
pub const PAGE_SIZE: u32 = 100;

pub fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `SITE_URL` without its trailing slash, else `https://{host}`.
pub fn resolve_site_url(configured: Option<&str>, request_host: &str) -> String {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(url) => url.strip_suffix('/').unwrap_or(url).to_string(),
        None => format!("https://{request_host}"),
    }
}

/// Walk every listing page (soon-to-be-released products included) and
/// collect product ids. Stops at the first failed page, at the last page, or
/// after [`MAX_PAGES`].
pub async fn collect_product_ids(source: &dyn ProductSource) -> Vec<String> {
    let criteria = FilterCriteria {
        include_soon: Some(true),
        limit: Some(PAGE_SIZE),
        ..FilterCriteria::default()
    };

    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;
    for page_no in 0..MAX_PAGES {
        let page = match source.fetch_page(&criteria, cursor.as_deref()).await {
            Ok(page) => page,
            Err(err) => {
                warn!(page = page_no, error = %err, "sitemap listing stopped early");
                break;
            }
        };
        ids.extend(page.products.into_iter().map(|p| p.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    info!(products = ids.len(), "collected product ids for sitemap");
    ids
}

fn url_entry(loc: &str, changefreq: &str, priority: &str) -> String {
    format!(
        "  <url>\n    <loc>{}</loc>\n    <changefreq>{changefreq}</changefreq>\n    <priority>{priority}</priority>\n  </url>",
        escape_xml(loc)
    )
}

pub fn build_sitemap_xml(site_url: &str, ids: &[String]) -> String {
    let mut urls = Vec::with_capacity(ids.len() + 1);
    urls.push(url_entry(&format!("{site_url}/"), "daily", "1.0"));
    for id in ids {
        urls.push(url_entry(&format!("{site_url}/products/{id}"), "weekly", "0.7"));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}\n</urlset>",
        urls.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::product::sample_product;
    use crate::catalog::{ProductPage, Store};
    use crate::error::UpstreamError;
    use crate::upstream::testing::ScriptedSource;

    fn sitemap_criteria() -> FilterCriteria {
        FilterCriteria {
            include_soon: Some(true),
            limit: Some(PAGE_SIZE),
            ..FilterCriteria::default()
        }
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_xml("a&b<c>"), "a&amp;b&lt;c&gt;");
    }

    #[test]
    fn root_entry_comes_first() {
        let xml = build_sitemap_xml("https://takonbini.example", &["p&1".to_string()]);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset"));
        let root = xml.find("<loc>https://takonbini.example/</loc>").unwrap();
        let product = xml
            .find("<loc>https://takonbini.example/products/p&amp;1</loc>")
            .unwrap();
        assert!(root < product);
        assert!(xml.contains("<changefreq>daily</changefreq>\n    <priority>1.0</priority>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>\n    <priority>0.7</priority>"));
        assert!(xml.ends_with("</urlset>"));
    }

    #[test]
    fn site_url_prefers_configuration() {
        assert_eq!(resolve_site_url(Some("https://a.example/"), "b.example"), "https://a.example");
        assert_eq!(resolve_site_url(None, "b.example:8080"), "https://b.example:8080");
        assert_eq!(resolve_site_url(Some(""), "b.example"), "https://b.example");
    }

    #[tokio::test]
    async fn follows_cursors_until_exhausted() {
        let source = ScriptedSource::new();
        let criteria = sitemap_criteria();
        source.script(
            &criteria,
            None,
            ProductPage {
                products: vec![sample_product("a", Store::Lawson)],
                next_cursor: Some("n1".into()),
            },
        );
        source.script(
            &criteria,
            Some("n1"),
            ProductPage {
                products: vec![sample_product("b", Store::Lawson)],
                next_cursor: None,
            },
        );
        assert_eq!(collect_product_ids(source.as_ref()).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stops_at_the_page_cap() {
        let source = ScriptedSource::new();
        let criteria = sitemap_criteria();
        // Every page points back at the same cursor: an endless listing.
        let endless = ProductPage {
            products: vec![sample_product("x", Store::FamilyMart)],
            next_cursor: Some("again".into()),
        };
        source.script(&criteria, None, endless.clone());
        source.script(&criteria, Some("again"), endless);

        let ids = collect_product_ids(source.as_ref()).await;
        assert_eq!(ids.len(), MAX_PAGES);
        assert_eq!(source.calls(), MAX_PAGES);
    }

    #[tokio::test]
    async fn keeps_ids_gathered_before_a_failure() {
        let source = ScriptedSource::new();
        let criteria = sitemap_criteria();
        source.script(
            &criteria,
            None,
            ProductPage {
                products: vec![sample_product("a", Store::Lawson)],
                next_cursor: Some("n1".into()),
            },
        );
        source.script_error(&criteria, Some("n1"), UpstreamError::status(500, "boom"));
        assert_eq!(collect_product_ids(source.as_ref()).await, vec!["a"]);
    }
}
