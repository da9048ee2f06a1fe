use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::SearchProvider;
use crate::error::SearchError;

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";

/// DuckDuckGo search through the no-JavaScript HTML endpoint. Needs no API key.
pub struct DuckDuckGoSearch {
    base_url: String,
    client: Client,
    anchor_re: Regex,
    href_re: Regex,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("Mozilla/5.0 (X11; Linux x86_64) skillminer")
                .build()
                .context("failed to build HTTP client")?,
            anchor_re: Regex::new(r#"<a\b[^>]*class="[^"]*\bresult__a\b[^"]*"[^>]*>"#)
                .context("invalid result anchor pattern")?,
            href_re: Regex::new(r#"href="([^"]*)""#).context("invalid href pattern")?,
        })
    }

    /// Pull result URLs out of a results page, in page order.
    fn extract_links(&self, html: &str, max_results: usize) -> Vec<String> {
        self.anchor_re
            .find_iter(html)
            .filter_map(|anchor| {
                self.href_re
                    .captures(anchor.as_str())
                    .and_then(|caps| caps.get(1))
                    .and_then(|href| resolve_result_href(href.as_str()))
            })
            .take(max_results)
            .collect()
    }
}

/// Result anchors point at `//duckduckgo.com/l/?uddg=<encoded target>`; unwrap them.
/// Ads and anything that is not http(s) are dropped.
fn resolve_result_href(href: &str) -> Option<String> {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    };

    let parsed = Url::parse(&absolute).ok()?;
    let is_ddg = parsed
        .host_str()
        .map(|h| h.ends_with("duckduckgo.com"))
        .unwrap_or(false);

    let target = if is_ddg {
        let (_, value) = parsed.query_pairs().find(|(k, _)| k == "uddg")?;
        Url::parse(&value).ok()?
    } else {
        parsed
    };

    let target_is_ddg = target
        .host_str()
        .map(|h| h.ends_with("duckduckgo.com"))
        .unwrap_or(true);
    if target_is_ddg || !matches!(target.scheme(), "http" | "https") {
        return None;
    }
    Some(target.to_string())
}

fn classify_status(status: StatusCode) -> Option<SearchError> {
    if status == StatusCode::OK {
        return None;
    }
    // 202 is what the endpoint answers with when it wants a captcha solved
    if status == StatusCode::ACCEPTED
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Some(SearchError::Transient(format!(
            "DuckDuckGo returned {}",
            status
        )));
    }
    Some(SearchError::Fatal(format!("DuckDuckGo returned {}", status)))
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        let url = format!("{}/html/", self.base_url);
        debug!("POST {} q={:?}", url, query);

        let response = self
            .client
            .post(&url)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Transient(format!("request failed: {}", e)))?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Transient(format!("failed to read body: {}", e)))?;

        Ok(self.extract_links(&body, max_results))
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}
