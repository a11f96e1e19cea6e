use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

const WAYBACK_AVAILABLE_URL: &str = "http://archive.org/wayback/available";

/// A public web archive that may hold a copy of a dead page.
pub trait WebArchive: Send + Sync {
    fn name(&self) -> &str;

    /// URL of the closest archived snapshot of `url`, if any.
    ///
    /// Lookup failures are reported as `None`.
    fn available_snapshot<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

#[derive(Deserialize)]
struct AvailableResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Deserialize, Default)]
struct ArchivedSnapshots {
    closest: Option<Snapshot>,
}

#[derive(Deserialize)]
struct Snapshot {
    url: String,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

/// The Internet Archive's Wayback Machine availability API.
pub struct Wayback {
    client: reqwest::Client,
    timeout: Duration,
}

impl Wayback {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl WebArchive for Wayback {
    fn name(&self) -> &str {
        "Wayback Machine"
    }

    fn available_snapshot<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(WAYBACK_AVAILABLE_URL)
                .query(&[("url", url)])
                .timeout(self.timeout)
                .send()
                .await;
            let resp = match resp {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::warn!(status = %r.status(), "wayback lookup returned an error status");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "wayback lookup failed");
                    return None;
                }
            };
            match resp.json::<AvailableResponse>().await {
                Ok(data) => parse_snapshot(data),
                Err(e) => {
                    tracing::warn!(error = %e, "wayback lookup returned malformed JSON");
                    None
                }
            }
        })
    }
}

fn parse_snapshot(data: AvailableResponse) -> Option<String> {
    data.archived_snapshots
        .closest
        .filter(|s| s.available && !s.url.is_empty())
        .map(|s| s.url)
}
