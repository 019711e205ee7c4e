use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::repositories;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = repositories)]
#[diesel(primary_key(repo_id))]
pub struct Repository {
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
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = repositories)]
pub struct NewRepository<'a> {
    pub repo_id: &'a str,
    pub name: &'a str,
    pub owner: &'a str,
    pub full_name: &'a str,
    pub url: &'a str,
    pub stars: i64,
    pub forks: i64,
    pub language: Option<&'a str>,
    pub description: Option<&'a str>,
    pub created_at: Option<DateTime<Utc>>,
}
