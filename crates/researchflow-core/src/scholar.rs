//! Semantic Scholar: open-access PDF lookup for acquisition and paper search
//! for the article explorer.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::CoreError;
use crate::acquire::PaperIndex;

const API_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const SEARCH_FIELDS: &str = "title,authors,year,url,abstract,citationCount,journal";
const SEARCH_LIMIT: u32 = 20;
const MIN_YEAR: i32 = 1900;

static PAPER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"semanticscholar\.org/paper/.*?([a-fA-F0-9]{40})").unwrap());

/// Result ordering for [`SemanticScholar::search`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// The index's own relevance ranking.
    #[default]
    Default,
    Recency,
    Citations,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "" => Ok(SortOrder::Default),
            "recency" | "recent" => Ok(SortOrder::Recency),
            "citations" | "relevance" => Ok(SortOrder::Citations),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub sort: SortOrder,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub offset: u32,
    pub open_access_only: bool,
}

/// One search hit. Hits without an abstract are never returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleHit {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i64>,
    pub url: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(rename = "citationCount")]
    pub citation_count: u64,
    pub journal: String,
}

pub struct SemanticScholar {
    client: reqwest::Client,
    api_key: Option<String>,
    timeout: Duration,
}

impl SemanticScholar {
    pub fn new(client: reqwest::Client, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            timeout,
        }
    }

    /// Search papers. Requires an API key.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleHit>, CoreError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CoreError::Search("Semantic Scholar API key is not configured".into()))?;

        let url = search_url(query, filters, chrono::Local::now().year());
        tracing::info!(query = %query, sort = ?filters.sort, offset = filters.offset, "searching Semantic Scholar");

        let resp = self
            .client
            .get(&url)
            .header("x-api-key", key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CoreError::Search(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(CoreError::Search("rate limited (429)".into()));
        }
        if !status.is_success() {
            return Err(CoreError::Search(format!("HTTP {}", status)));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CoreError::Search(e.to_string()))?;
        let hits = parse_search_results(&data);
        tracing::debug!(hits = hits.len(), "search results with abstracts");
        Ok(hits)
    }
}

impl PaperIndex for SemanticScholar {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn paper_id(&self, url: &str) -> Option<String> {
        PAPER_ID_RE
            .captures(url)
            .map(|caps| caps[1].to_ascii_lowercase())
    }

    fn resolve_pdf<'a>(
        &'a self,
        paper_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{API_BASE}/paper/{paper_id}?fields=openAccessPdf,url");
            let mut req = self.client.get(&url).timeout(self.timeout);
            if let Some(ref key) = self.api_key {
                req = req.header("x-api-key", key);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(paper_id = %paper_id, error = %e, "Semantic Scholar lookup failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                tracing::warn!(paper_id = %paper_id, status = %resp.status(), "Semantic Scholar lookup returned an error status");
                return None;
            }
            let data: serde_json::Value = resp.json().await.ok()?;
            open_access_url(&data)
        })
    }
}

fn open_access_url(data: &serde_json::Value) -> Option<String> {
    data["openAccessPdf"]["url"]
        .as_str()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
}

/// `YYYY-YYYY` year filter, or `None` when the clamped range is the full
/// `[1900, current_year]` span.
fn year_range(filters: &SearchFilters, current_year: i32) -> Option<String> {
    let start = filters
        .year_from
        .filter(|&y| y > MIN_YEAR)
        .map(|y| y.min(current_year))
        .unwrap_or(MIN_YEAR);
    let end = filters
        .year_to
        .filter(|&y| y <= current_year)
        .map(|y| y.max(MIN_YEAR))
        .unwrap_or(current_year);
    (start != MIN_YEAR || end != current_year).then(|| format!("{start}-{end}"))
}

fn search_url(query: &str, filters: &SearchFilters, current_year: i32) -> String {
    let mut url = format!(
        "{API_BASE}/paper/search?query={}&limit={SEARCH_LIMIT}&offset={}&fields={SEARCH_FIELDS}",
        urlencoding::encode(query),
        filters.offset
    );
    match filters.sort {
        SortOrder::Recency => url.push_str("&sort=publicationDate:desc"),
        SortOrder::Citations => url.push_str("&sort=citationCount:desc"),
        SortOrder::Default => {}
    }
    if let Some(years) = year_range(filters, current_year) {
        url.push_str("&year=");
        url.push_str(&years);
    }
    if filters.open_access_only {
        url.push_str("&openAccessPdf=true");
    }
    url
}

fn parse_search_results(data: &serde_json::Value) -> Vec<ArticleHit> {
    let Some(items) = data["data"].as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let abstract_text = item["abstract"].as_str().map(str::trim).unwrap_or("");
            if abstract_text.is_empty() {
                return None;
            }
            let authors = item["authors"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|a| a["name"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let journal = item["journal"]["name"]
                .as_str()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("N/A")
                .to_string();
            Some(ArticleHit {
                title: item["title"].as_str().unwrap_or("").to_string(),
                authors,
                year: item["year"].as_i64(),
                url: item["url"].as_str().map(String::from),
                abstract_text: abstract_text.to_string(),
                citation_count: item["citationCount"].as_u64().unwrap_or(0),
                journal,
            })
        })
        .collect()
}
