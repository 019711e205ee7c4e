use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// One GraphQL search page. The `rateLimit` block rides along with every
/// page so callers can see remaining quota without a separate request.
const GRAPHQL_SEARCH: &str = r#"
    query searchRepositories($q: String!, $first: Int!, $cursor: String) {
        rateLimit {
            limit
            cost
            remaining
            resetAt
        }
        search(query: $q, type: REPOSITORY, first: $first, after: $cursor) {
            repositoryCount
            pageInfo {
                hasNextPage
                endCursor
            }
            edges {
                node {
                    ... on Repository {
                        id
                        databaseId
                        name
                        owner { login }
                        url
                        stargazerCount
                        forkCount
                        primaryLanguage { name }
                        description
                        createdAt
                    }
                }
            }
        }
    }
"#;

pub struct GitHubGraphQLResult {
    pub body: String,
    pub status: StatusCode,
}

pub async fn fetch_search_page(
    client: &Client,
    token: &str,
    query: &str,
    page_size: i64,
    cursor: Option<&str>,
) -> Result<GitHubGraphQLResult, FetchSearchPageError> {
    let payload = serde_json::json!({
        "query": GRAPHQL_SEARCH,
        "variables": {
            "q": query,
            "first": page_size,
            "cursor": cursor,
        }
    });

    let response = client
        .post("https://api.github.com/graphql")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .header("User-Agent", "rust-client")
        .json(&payload)
        .send()
        .await
        .map_err(|source| FetchSearchPageError::RequestSend { source })?;

    let status = response.status();

    let body = response
        .text()
        .await
        .map_err(|source| FetchSearchPageError::ResponseRead { source })?;

    Ok(GitHubGraphQLResult { body, status })
}

#[derive(Debug, Error)]
pub enum FetchSearchPageError {
    #[error("RequestSend: {source}")]
    RequestSend {
        source: reqwest::Error,
    },

    #[error("ResponseRead: {source}")]
    ResponseRead {
        source: reqwest::Error,
    },
}

/// Top-level GraphQL response shape. GitHub returns HTTP 200 with an
/// `errors` array for query-level failures, so both halves are optional.
#[derive(Debug, Deserialize)]
pub struct GraphQLEnvelope {
    pub data: Option<SearchData>,
    pub errors: Option<Vec<GraphQLErrorItem>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLErrorItem {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub rate_limit: Option<RateLimit>,
    pub search: Option<SearchConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub limit: i64,
    pub cost: i64,
    pub remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConnection {
    pub repository_count: i64,
    pub page_info: PageInfo,
    pub edges: Vec<SearchEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchEdge {
    pub node: Option<RepoNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoNode {
    pub id: Option<String>,
    pub database_id: Option<i64>,
    pub name: Option<String>,
    pub owner: Option<OwnerNode>,
    pub url: Option<String>,
    pub stargazer_count: Option<i64>,
    pub fork_count: Option<i64>,
    pub primary_language: Option<LanguageNode>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerNode {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct LanguageNode {
    pub name: String,
}
