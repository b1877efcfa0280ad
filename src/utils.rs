//! URL canonicalization, domain extraction and small string helpers.
//!
//! Every URL that enters the pipeline goes through [`canonicalize_url`] so
//! that the same article reached through different links (tracking
//! parameters, fragments, trailing slashes) collapses to one dedup key.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Normalize a URL into its canonical dedup form.
///
/// Relative `href`s are resolved against `base` when one is given. Returns
/// `None` for unparseable input and for non-HTTP(S) schemes such as
/// `mailto:` or `javascript:`.
///
/// # Examples
///
/// ```
/// use news_sentry::utils::canonicalize_url;
/// assert_eq!(
///     canonicalize_url("https://WWW.Example.com/a/b/?utm_source=x#top", None).as_deref(),
///     Some("https://www.example.com/a/b")
/// );
/// ```
pub fn canonicalize_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

/// Host of `url` with any leading `www.` removed, lowercased.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether `host` is `domain` itself or one of its subdomains.
pub fn same_site(host: &str, domain: &str) -> bool {
    let host = host.strip_prefix("www.").unwrap_or(host);
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Cuts on a char boundary so multi-byte text (accented headlines) never
/// panics, and appends how many bytes were dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
