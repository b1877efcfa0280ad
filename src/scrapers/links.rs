//! Article link harvesting from a listing page.
//!
//! News home pages and section pages link to far more than articles: menus,
//! tag pages, author pages, login. We keep links whose path *looks* like a
//! story, based on the shapes Brazilian and international outlets use.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::has_date_segment;
use crate::fetch::{FetchError, PageFetcher};
use crate::utils::{canonicalize_url, domain_of, same_site};

static ANCHORS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static ARTICLE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:noticia|noticias|artigo|post|materia|reportagem)/").expect("static regex")
});

/// Outcome of harvesting one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Harvest {
    Links(Vec<String>),
    /// 403/429 or a block page; the source should not be hit again this cycle.
    Blocked,
    /// Timeout, connection failure or unexpected status.
    Failed,
}

impl Harvest {
    pub fn links(&self) -> &[String] {
        match self {
            Harvest::Links(links) => links,
            _ => &[],
        }
    }
}

/// Fetch `page_url` and return up to `max_links` article links on its site.
#[instrument(level = "info", skip_all, fields(page = %page_url, max_links = max_links))]
pub async fn harvest_links<F: PageFetcher>(fetcher: &F, page_url: &str, max_links: usize) -> Harvest {
    let page = match fetcher.fetch(page_url).await {
        Ok(page) => page,
        Err(e @ FetchError::Blocked { .. }) => {
            warn!(error = %e, "Harvest blocked");
            return Harvest::Blocked;
        }
        Err(e) => {
            warn!(error = %e, "Harvest failed");
            return Harvest::Failed;
        }
    };

    let links = extract_article_links(&page.body, page_url, max_links);
    info!(count = links.len(), "Harvested article links");
    debug!(urls = ?links, "Harvested URLs");
    Harvest::Links(links)
}

/// Extract canonical article links from `html`, in page order.
pub fn extract_article_links(html: &str, page_url: &str, max_links: usize) -> Vec<String> {
    let (Ok(base), Some(domain)) = (Url::parse(page_url), domain_of(page_url)) else {
        return Vec::new();
    };
    let page_canonical = canonicalize_url(page_url, None);
    let document = Html::parse_document(html);

    let mut out: Vec<String> = Vec::new();
    for href in document.select(&ANCHORS).filter_map(|a| a.value().attr("href")) {
        if out.len() >= max_links {
            break;
        }
        let Some(link) = canonicalize_url(href, Some(&base)) else {
            continue;
        };
        if Some(&link) == page_canonical.as_ref() || out.contains(&link) {
            continue;
        }
        if is_article_url(&link, &domain) {
            out.push(link);
        }
    }
    out
}

/// Whether `url` looks like a single story on `domain`.
pub fn is_article_url(url: &str, domain: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if !same_site(host, domain) {
        return false;
    }

    let path = parsed.path().to_lowercase();
    if ARTICLE_PREFIX.is_match(&path) || has_date_segment(url) {
        return true;
    }
    if [".html", ".htm", ".ghtml"].iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.last() {
        Some(slug) if segments.len() >= 2 => slug.matches('-').count() >= 3,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{Canned, StaticFetcher};

    const PAGE: &str = "https://g1.globo.com/politica/";

    fn listing() -> String {
        r##"<html><body>
            <a href="/politica/">Política</a>
            <a href="https://g1.globo.com/politica/noticia/2025/06/19/stf-decide-x.ghtml?utm_source=home">1</a>
            <a href="https://g1.globo.com/politica/noticia/2025/06/19/stf-decide-x.ghtml#comentarios">dup</a>
            <a href="/economia/2025/06/18/juros-sobem/">2</a>
            <a href="/politica/blog/camara-aprova-projeto-de-lei-sobre-tema/">3</a>
            <a href="/sobre/">institucional</a>
            <a href="/busca/?q=stf">busca</a>
            <a href="mailto:g1@globo.com">email</a>
            <a href="https://outro.com/noticia/qualquer">fora</a>
            <a href="https://ge.globo.com/futebol/noticia/2025/06/19/jogo.ghtml">subdominio irmao</a>
        </body></html>"##
            .to_string()
    }

    #[test]
    fn test_is_article_url_shapes() {
        assert!(is_article_url("https://g1.globo.com/politica/noticia/2025/06/19/a.ghtml", "g1.globo.com"));
        assert!(is_article_url("https://www.oeste.com.br/politica/stf-decide-tema-de-impacto", "oeste.com.br"));
        assert!(is_article_url("https://www.oeste.com.br/19-06-2025/x", "oeste.com.br"));
        assert!(!is_article_url("https://www.oeste.com.br/politica", "oeste.com.br"));
        assert!(!is_article_url("https://www.oeste.com.br/politica/stf", "oeste.com.br"));
        assert!(!is_article_url("https://outro.com.br/noticia/x", "oeste.com.br"));
    }

    #[test]
    fn test_extract_filters_dedupes_and_keeps_order() {
        let links = extract_article_links(&listing(), PAGE, 20);
        assert_eq!(
            links,
            vec![
                "https://g1.globo.com/politica/noticia/2025/06/19/stf-decide-x.ghtml",
                "https://g1.globo.com/economia/2025/06/18/juros-sobem",
                "https://g1.globo.com/politica/blog/camara-aprova-projeto-de-lei-sobre-tema",
            ]
        );
    }

    #[test]
    fn test_extract_caps_count() {
        assert_eq!(extract_article_links(&listing(), PAGE, 2).len(), 2);
    }

    #[tokio::test]
    async fn test_harvest_outcomes() {
        let fetcher = StaticFetcher::new()
            .page(PAGE, listing())
            .canned("https://g1.globo.com/economia/", Canned::Blocked)
            .canned("https://g1.globo.com/mundo/", Canned::Timeout)
            .page("https://g1.globo.com/brasil/", "<title>Just a moment...</title>");

        assert_eq!(harvest_links(&fetcher, PAGE, 20).await.links().len(), 3);
        assert_eq!(harvest_links(&fetcher, "https://g1.globo.com/economia/", 20).await, Harvest::Blocked);
        assert_eq!(harvest_links(&fetcher, "https://g1.globo.com/mundo/", 20).await, Harvest::Failed);
        assert_eq!(harvest_links(&fetcher, "https://g1.globo.com/brasil/", 20).await, Harvest::Blocked);
    }
}
