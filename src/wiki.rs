//! MediaWiki query client.
//!
//! Only `action=query` is used. Results are paged with the `continue`
//! protocol: the `continue` object of each response is merged into the
//! original parameters for the next request until a response carries none.

use crate::config::{
    CATEGORY_PAGE_LIMIT, FETCH_MAX_ATTEMPTS, FETCH_RETRY_DELAY_MS, FETCH_TIMEOUT_SECS,
    MAX_CONTINUATIONS, USER_AGENT,
};
use crate::stats::RequestCounters;
use anyhow::{anyhow, bail, Context, Result};
use indicatif::ProgressBar;
use reqwest::StatusCode;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub type Params = BTreeMap<String, String>;

/// One `api.php` round trip. Implemented by [`WikiClient`] and by in-memory
/// fakes in tests.
pub trait QueryApi {
    fn query(&self, params: &Params) -> impl Future<Output = Result<Value>>;
}

enum Failure {
    /// Worth retrying: network errors, 5xx, 429, truncated bodies
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

pub struct WikiClient {
    http: reqwest::Client,
    api_url: String,
    max_attempts: u32,
    base_delay: Duration,
    counters: RequestCounters,
}

impl WikiClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            max_attempts: FETCH_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(FETCH_RETRY_DELAY_MS),
            counters: RequestCounters::new(),
        })
    }

    /// Attempts per query including the first; 1 disables retrying.
    pub fn with_retry_policy(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    async fn get_once(&self, params: &Params) -> std::result::Result<Value, Failure> {
        let resp = self
            .http
            .get(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await
            .map_err(|e| Failure::Transient(e.into()))?;

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Transient(anyhow!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Failure::Fatal(anyhow!("HTTP {}", status)));
        }

        let doc: Value = resp
            .json()
            .await
            .map_err(|e| Failure::Transient(anyhow::Error::new(e).context("Malformed response body")))?;

        if let Some(err) = doc.get("error") {
            let code = err.get("code").and_then(Value::as_str).unwrap_or("unknown");
            let info = err.get("info").and_then(Value::as_str).unwrap_or("");
            return Err(Failure::Fatal(anyhow!("API error {}: {}", code, info)));
        }
        Ok(doc)
    }
}

impl QueryApi for WikiClient {
    async fn query(&self, params: &Params) -> Result<Value> {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            self.counters.inc_requests();
            match self.get_once(params).await {
                Ok(doc) => return Ok(doc),
                Err(Failure::Transient(e)) if attempt < self.max_attempts => {
                    self.counters.inc_retries();
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Wiki request failed, retrying: {e:#}"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(Failure::Transient(e)) | Err(Failure::Fatal(e)) => {
                    self.counters.inc_failures();
                    return Err(e.context(format!(
                        "Wiki query to {} failed after {attempt} attempt(s)",
                        self.api_url
                    )));
                }
            }
        }

        bail!("Wiki query to {} was never attempted", self.api_url)
    }
}

fn base_params() -> Params {
    [("action", "query"), ("format", "json")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn with_content(mut params: Params) -> Params {
    params.insert("prop".to_string(), "revisions".to_string());
    params.insert("rvprop".to_string(), "content".to_string());
    params.insert("rvslots".to_string(), "main".to_string());
    params
}

/// Pages in `Category:<category>`, optionally with their latest revision.
pub fn category_params(category: &str, content: bool) -> Params {
    let mut params = base_params();
    params.insert("generator".to_string(), "categorymembers".to_string());
    params.insert("gcmtitle".to_string(), format!("Category:{}", category));
    params.insert("gcmtype".to_string(), "page".to_string());
    params.insert("gcmlimit".to_string(), CATEGORY_PAGE_LIMIT.to_string());
    if content {
        with_content(params)
    } else {
        params
    }
}

/// Latest revision of each of `titles`. Callers keep batches within the API's title limit.
pub fn titles_params(titles: &[String]) -> Params {
    let mut params = base_params();
    params.insert("titles".to_string(), titles.join("|"));
    with_content(params)
}

pub fn page_title(page: &Value) -> Option<&str> {
    page.get("title").and_then(Value::as_str)
}

pub fn page_id(page: &Value) -> Option<u64> {
    page.get("pageid").and_then(Value::as_u64)
}

/// Wikitext of the first revision, in either the slot or the legacy layout.
pub fn page_content(page: &Value) -> Option<&str> {
    let revision = page.get("revisions")?.get(0)?;
    revision
        .pointer("/slots/main/*")
        .or_else(|| revision.pointer("/slots/main/content"))
        .or_else(|| revision.get("*"))
        .or_else(|| revision.get("content"))
        .and_then(Value::as_str)
}

fn batch_pages(doc: &Value) -> Vec<&Value> {
    match doc.pointer("/query/pages") {
        Some(Value::Object(pages)) => pages.values().collect(),
        Some(Value::Array(pages)) => pages.iter().collect(),
        _ => Vec::new(),
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs a page-generating query to completion and returns every page once,
/// sorted by title.
///
/// With `prop=revisions` the API may list a page in one batch and deliver its
/// content in a later one, so pages are merged by title and a copy with
/// content always wins.
pub async fn query_pages<A: QueryApi>(api: &A, params: &Params, pb: &ProgressBar) -> Result<Vec<Value>> {
    let mut pages: FxHashMap<String, Value> = FxHashMap::default();
    let mut request = params.clone();

    for batch in 0..MAX_CONTINUATIONS {
        let doc = api.query(&request).await?;

        let mut new_titles = 0;
        for page in batch_pages(&doc) {
            let Some(title) = page_title(page) else {
                continue;
            };
            let has_content = page_content(page).is_some();
            match pages.get(title) {
                Some(existing) if page_content(existing).is_some() || !has_content => {}
                Some(_) => {
                    pages.insert(title.to_string(), page.clone());
                }
                None => {
                    new_titles += 1;
                    pages.insert(title.to_string(), page.clone());
                }
            }
        }
        pb.inc(new_titles);
        debug!(batch, pages = pages.len(), "Query batch received");

        match doc.get("continue").and_then(Value::as_object) {
            Some(cont) => {
                request = params.clone();
                for (key, value) in cont {
                    request.insert(key.clone(), param_value(value));
                }
            }
            None => {
                let mut pages: Vec<(String, Value)> = pages.into_iter().collect();
                pages.sort_by(|a, b| a.0.cmp(&b.0));
                return Ok(pages.into_iter().map(|(_, page)| page).collect());
            }
        }
    }

    bail!("Query did not finish within {} continuations", MAX_CONTINUATIONS)
}
