use std::time::Duration;

use chrono::Utc;
use interfaces_github_search::index::{
    fetch_search_page, GraphQLEnvelope, RepoNode, SearchConnection,
};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::crawl::types::{RepoPage, RepoRecord};

/// Refuse to burn the last few points of GraphQL quota; below this the
/// fetch reports a transient failure carrying the reset time.
const RATE_LIMIT_FLOOR: i64 = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Retryable: rate limiting, network faults, server errors.
    #[error("TransientFetch: {reason}")]
    Transient {
        reason: String,
        /// Server-suggested wait, when known (rate-limit reset).
        retry_after: Option<Duration>,
    },

    /// Not retryable: auth failures, malformed responses.
    #[error("FatalFetch: {reason}")]
    Fatal { reason: String },
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        FetchError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        FetchError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// One page of the fixed search query. `cursor` must be `None` or a
/// previously returned `next_cursor`.
pub trait PageFetcher {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RepoPage, FetchError>;
}

pub struct GitHubPageFetcher {
    client: Client,
    token: String,
    query: String,
    page_size: i64,
}

impl GitHubPageFetcher {
    pub fn new(token: impl Into<String>, query: impl Into<String>, page_size: i64) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            query: query.into(),
            page_size,
        }
    }

    /// Total hits for a search expression, read from `repositoryCount`
    /// of a minimal one-row page. Used for partition planning.
    pub async fn repository_count(&self, query: &str) -> Result<i64, FetchError> {
        let result = fetch_search_page(&self.client, &self.token, query, 1, None)
            .await
            .map_err(|source| FetchError::transient(source.to_string()))?;
        parse_repository_count(result.status, &result.body)
    }
}

impl PageFetcher for GitHubPageFetcher {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RepoPage, FetchError> {
        let result =
            fetch_search_page(&self.client, &self.token, &self.query, self.page_size, cursor)
                .await
                .map_err(|source| FetchError::transient(source.to_string()))?;
        parse_search_page(result.status, &result.body)
    }
}

/// Validates a raw GraphQL response into a typed page, classifying
/// failures into the transient/fatal taxonomy.
pub fn parse_search_page(status: StatusCode, body: &str) -> Result<RepoPage, FetchError> {
    let search = parse_envelope(status, body)?;

    let records = search
        .edges
        .into_iter()
        .filter_map(|edge| edge.node.and_then(parse_repo_node))
        .collect();

    Ok(RepoPage {
        records,
        next_cursor: search.page_info.end_cursor,
        has_more: search.page_info.has_next_page,
    })
}

/// Total hits for a search expression, from the `repositoryCount`
/// field; same failure classification as a full page.
pub fn parse_repository_count(status: StatusCode, body: &str) -> Result<i64, FetchError> {
    let search = parse_envelope(status, body)?;
    Ok(search.repository_count)
}

fn parse_envelope(status: StatusCode, body: &str) -> Result<SearchConnection, FetchError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::fatal(format!("auth rejected ({status})")));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(FetchError::transient(format!("http {status}")));
    }
    if !status.is_success() {
        return Err(FetchError::fatal(format!("http {status}")));
    }

    let envelope: GraphQLEnvelope = serde_json::from_str(body)
        .map_err(|source| FetchError::fatal(format!("malformed response body: {source}")))?;

    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let rate_limited = errors
            .iter()
            .any(|e| e.error_type.as_deref() == Some("RATE_LIMITED"));
        let messages = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if rate_limited {
            return Err(FetchError::transient(format!("rate limited: {messages}")));
        }
        return Err(FetchError::fatal(format!("graphql errors: {messages}")));
    }

    let data = envelope
        .data
        .ok_or_else(|| FetchError::fatal("response missing data field"))?;

    if let Some(rl) = &data.rate_limit {
        if rl.remaining < RATE_LIMIT_FLOOR {
            let retry_after = rl
                .reset_at
                .and_then(|reset| (reset - Utc::now()).to_std().ok())
                .map(|wait| wait + Duration::from_secs(5));
            return Err(FetchError::Transient {
                reason: format!("rate limit nearly exhausted (remaining {})", rl.remaining),
                retry_after,
            });
        }
    }

    data.search
        .ok_or_else(|| FetchError::fatal("response missing search field"))
}

/// Mirrors the canonical node shape; nodes missing identity or naming
/// fields are dropped rather than half-persisted.
fn parse_repo_node(node: RepoNode) -> Option<RepoRecord> {
    let repo_id = node
        .database_id
        .map(|id| id.to_string())
        .or(node.id)?;
    let name = node.name?;
    let owner = node.owner?.login;

    Some(RepoRecord {
        full_name: format!("{owner}/{name}"),
        repo_id,
        name,
        owner,
        url: node.url.unwrap_or_default(),
        stars: node.stargazer_count.unwrap_or(0),
        forks: node.fork_count.unwrap_or(0),
        language: node.primary_language.map(|l| l.name),
        description: node.description,
        created_at: node.created_at,
    })
}
