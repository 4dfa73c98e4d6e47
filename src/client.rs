//! Resilient Are.na API client.
//!
//! One [`ArenaClient`] wraps both upstream API generations behind typed
//! operations. Every request flows through the same engine: a bounded
//! concurrency limiter, a per-request timeout, and a retry loop driven by
//! the pure policy in [`crate::retry`]. Search additionally carries the
//! v2 fallback: a 403 from the current endpoint transparently retries
//! against the legacy host when enabled in configuration.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ArenaError;
use crate::models::{
    NormalizedBlock, NormalizedChannel, NormalizedConnection, NormalizedList,
    NormalizedSearchResult, NormalizedUser, SearchEntityType,
};
use crate::normalize;
use crate::retry::{parse_retry_after, RetryDecision, RetryPolicy};

/// Search request parameters for the typed `search` operation.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    /// Entity filters; empty searches everything. Multiple filters are
    /// comma-joined into a single `type` parameter.
    pub entities: Vec<SearchEntityType>,
    /// Upstream scope, e.g. `"my"` to search only the caller's content.
    pub scope: Option<String>,
    pub page: Option<u32>,
    pub per: Option<u32>,
}

/// Which upstream generation a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Api {
    V3,
    V2,
}

#[derive(Default)]
struct RequestOptions {
    query: Vec<(String, String)>,
    body: Option<Value>,
    expect_no_content: bool,
}

/// Query-string accumulator. Scalars are stringified, lists join with `,`,
/// and absent values are omitted entirely rather than sent empty.
#[derive(Debug, Default)]
pub(crate) struct Query(Vec<(String, String)>);

impl Query {
    fn push(&mut self, key: &str, value: impl ToString) {
        self.0.push((key.to_string(), value.to_string()));
    }

    fn push_opt(&mut self, key: &str, value: Option<impl ToString>) {
        if let Some(v) = value {
            self.push(key, v);
        }
    }

    fn push_list(&mut self, key: &str, values: &[impl ToString]) {
        if !values.is_empty() {
            let joined = values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            self.push(key, joined);
        }
    }
}

pub struct ArenaClient {
    http: reqwest::Client,
    config: ApiConfig,
    /// Bounded concurrency limiter shared by every operation on this
    /// client. Tokio semaphores release waiters in FIFO acquisition order.
    limiter: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl ArenaClient {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_requests));
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            base_ms: config.backoff_base_ms,
        };
        Ok(Self {
            http,
            config,
            limiter,
            policy,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn base(&self, api: Api) -> &str {
        match api {
            Api::V3 => &self.config.base_url,
            Api::V2 => &self.config.v2_base_url,
        }
    }

    /// Core request engine. Returns the parsed body, or `None` for an
    /// expected `204 No Content`.
    async fn request(
        &self,
        method: Method,
        api: Api,
        path: &str,
        opts: RequestOptions,
    ) -> Result<Option<Value>, ArenaError> {
        let url = format!("{}{}", self.base(api), path);

        // All requests share one FIFO pool; reads and writes are not
        // prioritized differently.
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| ArenaError::Network(format!("limiter closed: {e}")))?;

        let mut attempt: u32 = 0;
        loop {
            let mut req = self
                .http
                .request(method.clone(), &url)
                .timeout(self.config.timeout());
            if !opts.query.is_empty() {
                req = req.query(&opts.query);
            }
            if let Some(token) = self.config.token() {
                req = req.bearer_auth(token);
            }
            if method == Method::POST || method == Method::PUT {
                req = req.json(opts.body.as_ref().unwrap_or(&Value::Object(Default::default())));
            }

            let err = match req.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        if status == 204 {
                            if opts.expect_no_content {
                                return Ok(None);
                            }
                            // A body was expected; treat the absence as a
                            // (non-retryable) response failure.
                            return Err(ArenaError::Http {
                                status,
                                body: None,
                                retry_after: None,
                                url,
                            });
                        }
                        let text = response
                            .text()
                            .await
                            .map_err(|e| ArenaError::Network(e.to_string()))?;
                        let body = serde_json::from_str(&text).unwrap_or_else(|e| {
                            warn!("unparseable success body from {url}: {e}");
                            Value::Null
                        });
                        return Ok(Some(body));
                    }

                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| parse_retry_after(v, Utc::now()));
                    let is_json = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|ct| ct.contains("json"))
                        .unwrap_or(false);
                    let text = response.text().await.unwrap_or_default();
                    let body = if is_json {
                        serde_json::from_str(&text).ok()
                    } else if text.is_empty() {
                        None
                    } else {
                        Some(Value::String(text))
                    };
                    ArenaError::Http {
                        status,
                        body,
                        retry_after,
                        url: url.clone(),
                    }
                }
                Err(e) => {
                    // Timeouts and transport errors share the retry path of
                    // a retryable status, minus the retry-after branch.
                    ArenaError::Network(e.to_string())
                }
            };

            match self.policy.next_action(attempt, &err, rand::random::<f64>) {
                RetryDecision::RetryAfterMs(delay_ms) => {
                    warn!(
                        "attempt {}/{} against {url} failed ({err}); retrying in {delay_ms}ms",
                        attempt + 1,
                        self.policy.max_retries + 1,
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                RetryDecision::Fail => return Err(err),
            }
        }
    }

    async fn get_json(&self, api: Api, path: &str, query: Query) -> Result<Value, ArenaError> {
        let opts = RequestOptions {
            query: query.0,
            ..Default::default()
        };
        Ok(self
            .request(Method::GET, api, path, opts)
            .await?
            .unwrap_or(Value::Null))
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, ArenaError> {
        let opts = RequestOptions {
            body: Some(body),
            ..Default::default()
        };
        Ok(self
            .request(Method::POST, Api::V3, path, opts)
            .await?
            .unwrap_or(Value::Null))
    }

    fn page_query(&self, page: Option<u32>, per: Option<u32>) -> Query {
        let mut q = Query::default();
        q.push_opt("page", page);
        q.push("per", per.unwrap_or(self.config.default_page_size));
        q
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub async fn get_channel(&self, id_or_slug: &str) -> Result<NormalizedChannel, ArenaError> {
        let body = self
            .get_json(Api::V3, &format!("/channels/{id_or_slug}"), Query::default())
            .await?;
        Ok(normalize::normalize_channel(entity(&body)))
    }

    pub async fn get_channel_contents(
        &self,
        id_or_slug: &str,
        page: Option<u32>,
        per: Option<u32>,
    ) -> Result<NormalizedList, ArenaError> {
        let body = self
            .get_json(
                Api::V3,
                &format!("/channels/{id_or_slug}/contents"),
                self.page_query(page, per),
            )
            .await?;
        Ok(normalize::normalize_list(&body))
    }

    pub async fn get_block(&self, id: &str) -> Result<NormalizedBlock, ArenaError> {
        let body = self
            .get_json(Api::V3, &format!("/blocks/{id}"), Query::default())
            .await?;
        Ok(normalize::normalize_block(entity(&body)))
    }

    /// Channels a block is connected into.
    pub async fn get_block_connections(
        &self,
        id: &str,
        page: Option<u32>,
        per: Option<u32>,
    ) -> Result<NormalizedList, ArenaError> {
        let body = self
            .get_json(
                Api::V3,
                &format!("/blocks/{id}/channels"),
                self.page_query(page, per),
            )
            .await?;
        Ok(normalize::normalize_list(&body))
    }

    pub async fn get_user(&self, id_or_slug: &str) -> Result<NormalizedUser, ArenaError> {
        let body = self
            .get_json(Api::V3, &format!("/users/{id_or_slug}"), Query::default())
            .await?;
        Ok(normalize::normalize_user(entity(&body)))
    }

    pub async fn get_user_contents(
        &self,
        id_or_slug: &str,
        page: Option<u32>,
        per: Option<u32>,
    ) -> Result<NormalizedList, ArenaError> {
        let body = self
            .get_json(
                Api::V3,
                &format!("/users/{id_or_slug}/contents"),
                self.page_query(page, per),
            )
            .await?;
        Ok(normalize::normalize_list(&body))
    }

    // ── Search with v2 fallback ──────────────────────────────────────────

    /// Searches the current API, degrading to the legacy endpoint when the
    /// primary rejects the call as permission-gated (exactly 403) and the
    /// fallback is enabled. Any other failure propagates unchanged.
    pub async fn search(
        &self,
        params: &SearchParams,
    ) -> Result<NormalizedSearchResult, ArenaError> {
        match self.search_v3(params).await {
            Ok(result) => Ok(result),
            Err(err) if err.status() == Some(403) && self.config.enable_v2_fallback => {
                debug!("v3 search returned 403; falling back to legacy endpoint");
                self.search_v2(params).await
            }
            Err(err) => Err(err),
        }
    }

    async fn search_v3(
        &self,
        params: &SearchParams,
    ) -> Result<NormalizedSearchResult, ArenaError> {
        let mut q = Query::default();
        q.push("q", &params.query);
        let types: Vec<&str> = params.entities.iter().map(|e| entity_label(*e)).collect();
        q.push_list("type", &types);
        q.push_opt("scope", params.scope.as_deref());
        q.push_opt("page", params.page);
        q.push("per", params.per.unwrap_or(self.config.default_page_size));
        let body = self.get_json(Api::V3, "/search", q).await?;
        Ok(normalize::normalize_search_v3(&body))
    }

    async fn search_v2(
        &self,
        params: &SearchParams,
    ) -> Result<NormalizedSearchResult, ArenaError> {
        let mut q = Query::default();
        q.push("q", &params.query);
        // Coarser legacy filter taking one kind at most: the first filter
        // with an equivalent wins. Group has none and is omitted.
        q.push_opt(
            "kind",
            params.entities.iter().find_map(|e| match e {
                SearchEntityType::Block => Some("blocks"),
                SearchEntityType::Channel => Some("channels"),
                SearchEntityType::User => Some("users"),
                SearchEntityType::Group => None,
            }),
        );
        q.push_opt("page", params.page);
        q.push("per", params.per.unwrap_or(self.config.default_page_size));
        let body = self.get_json(Api::V2, "/search", q).await?;
        Ok(normalize::normalize_search_v2(&body))
    }

    // ── Writes (current API only; no legacy fallback) ────────────────────

    pub async fn create_channel(&self, payload: Value) -> Result<NormalizedChannel, ArenaError> {
        let body = self.post_json("/channels", payload).await?;
        Ok(normalize::normalize_channel(entity(&body)))
    }

    pub async fn create_block(
        &self,
        channel: &str,
        payload: Value,
    ) -> Result<NormalizedBlock, ArenaError> {
        let body = self
            .post_json(&format!("/channels/{channel}/blocks"), payload)
            .await?;
        Ok(normalize::normalize_block(entity(&body)))
    }

    pub async fn connect_block(
        &self,
        channel: &str,
        payload: Value,
    ) -> Result<NormalizedConnection, ArenaError> {
        let body = self
            .post_json(&format!("/channels/{channel}/connections"), payload)
            .await?;
        Ok(normalize_connection_entity(&body))
    }

    pub async fn disconnect_connection(&self, connection_id: &str) -> Result<(), ArenaError> {
        let opts = RequestOptions {
            expect_no_content: true,
            ..Default::default()
        };
        self.request(
            Method::DELETE,
            Api::V3,
            &format!("/connections/{connection_id}"),
            opts,
        )
        .await?;
        Ok(())
    }

    pub async fn move_connection(
        &self,
        connection_id: &str,
        payload: Value,
    ) -> Result<NormalizedConnection, ArenaError> {
        let opts = RequestOptions {
            body: Some(payload),
            ..Default::default()
        };
        let body = self
            .request(
                Method::PUT,
                Api::V3,
                &format!("/connections/{connection_id}"),
                opts,
            )
            .await?
            .unwrap_or(Value::Null);
        Ok(normalize_connection_entity(&body))
    }
}

/// Single-entity responses arrive either bare or wrapped in `{data: ...}`.
fn entity(body: &Value) -> &Value {
    body.get("data").unwrap_or(body)
}

fn entity_label(e: SearchEntityType) -> &'static str {
    match e {
        SearchEntityType::Block => "Block",
        SearchEntityType::Channel => "Channel",
        SearchEntityType::User => "User",
        SearchEntityType::Group => "Group",
    }
}

fn normalize_connection_entity(body: &Value) -> NormalizedConnection {
    let raw = entity(body);
    NormalizedConnection {
        id: match raw.get("id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        position: raw.get("position").and_then(Value::as_i64),
        pinned: raw.get("pinned").and_then(Value::as_bool).unwrap_or(false),
        channel_id: match raw.get("channel_id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        connected_at: raw
            .get("connected_at")
            .or_else(|| raw.get("created_at"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_omits_absent_and_joins_lists() {
        let mut q = Query::default();
        q.push("q", "maps");
        q.push_opt("page", None::<u32>);
        q.push_opt("scope", Some("my"));
        q.push_list("ids", &[1, 2, 3]);
        q.push_list("empty", &Vec::<i64>::new());
        assert_eq!(
            q.0,
            vec![
                ("q".to_string(), "maps".to_string()),
                ("scope".to_string(), "my".to_string()),
                ("ids".to_string(), "1,2,3".to_string()),
            ]
        );
    }

    #[test]
    fn connection_entity_tolerates_wrapping_and_id_types() {
        let conn = normalize_connection_entity(&serde_json::json!({
            "data": {"id": 88, "position": 2, "pinned": true, "channel_id": "4021"}
        }));
        assert_eq!(conn.id.as_deref(), Some("88"));
        assert_eq!(conn.position, Some(2));
        assert!(conn.pinned);
        assert_eq!(conn.channel_id.as_deref(), Some("4021"));
    }
}
