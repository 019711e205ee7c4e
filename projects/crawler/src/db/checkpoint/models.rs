use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::crawl_checkpoints;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crawl_checkpoints)]
#[diesel(primary_key(partition_key))]
pub struct CrawlCheckpoint {
    pub partition_key: String,
    pub end_cursor: Option<String>,
    pub fetched_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crawl_checkpoints)]
pub struct NewCrawlCheckpoint<'a> {
    pub partition_key: &'a str,
    pub end_cursor: Option<&'a str>,
    pub fetched_count: i64,
}
