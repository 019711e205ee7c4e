use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::repository::models::Repository;
use crate::db::schema::stars_history;

/// One observed star count. Rows are append-only; the table is never
/// updated, and rows only disappear via the cascade from `repositories`.
#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Repository, foreign_key = repo_id))]
#[diesel(table_name = stars_history)]
pub struct StarObservation {
    pub id: i64,
    pub repo_id: String,
    pub stars: i64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stars_history)]
pub struct NewStarObservation<'a> {
    pub repo_id: &'a str,
    pub stars: i64,
    pub fetched_at: DateTime<Utc>,
}
