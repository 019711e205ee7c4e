use chrono::{DateTime, Utc};

/// One repository as seen in a search page, validated at the fetch
/// boundary before anything touches persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoRecord {
    pub repo_id: String,
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub url: String,
    pub stars: i64,
    pub forks: i64,
    pub language: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of search results. When `has_more` is false, `next_cursor`
/// must not be fed back into another fetch.
#[derive(Debug, Clone)]
pub struct RepoPage {
    pub records: Vec<RepoRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Resume point for one partition. `end_cursor == None` means start
/// from the first page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub end_cursor: Option<String>,
    pub fetched_count: i64,
}
