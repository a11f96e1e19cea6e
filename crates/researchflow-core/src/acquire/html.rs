//! Locating the real PDF behind an HTML landing page.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};

static ARTICLE_VIEW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/article/view/[^/]+/\d+/?$").unwrap());
static PDF_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/pdf/[^/]").unwrap());

/// Search a landing page for a link to the PDF, in priority order:
///
/// 1. `<meta name="citation_pdf_url" content="...">`
/// 2. an `href` whose path ends in `.pdf`
/// 3. a journal-system "view" link (`/article/view/<id>/<galley>`)
/// 4. an `href` containing a `/pdf/` path segment
///
/// The returned link is exactly as written in the page (possibly relative).
pub fn find_pdf_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let meta_sel = Selector::parse("meta[name][content]").unwrap();
    let meta = document.select(&meta_sel).find_map(|el| {
        let name = el.value().attr("name")?;
        if !name.eq_ignore_ascii_case("citation_pdf_url") {
            return None;
        }
        let content = el.value().attr("content")?.trim();
        (!content.is_empty()).then(|| content.to_string())
    });
    if meta.is_some() {
        return meta;
    }

    let href_sel = Selector::parse("[href]").unwrap();
    let hrefs: Vec<&str> = document
        .select(&href_sel)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty() && !h.starts_with('#'))
        .collect();

    hrefs
        .iter()
        .find(|h| path_part(h).to_ascii_lowercase().ends_with(".pdf"))
        .or_else(|| hrefs.iter().find(|h| ARTICLE_VIEW_RE.is_match(path_part(h))))
        .or_else(|| hrefs.iter().find(|h| PDF_PATH_RE.is_match(path_part(h))))
        .map(|h| h.to_string())
}

/// Resolve `link` against the URL the page was actually served from.
pub fn resolve_link(base: &str, link: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(link).ok().map(|u| u.to_string())
}

/// The href without its query string or fragment.
fn path_part(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    &href[..end]
}
