use chrono::Utc;
use diesel::prelude::*;

use crate::crawl::driver::{CrawlStore, StoreError};
use crate::crawl::types::{Checkpoint, RepoRecord};
use crate::db::checkpoint::queries::{get_checkpoint, save_checkpoint};
use crate::db::history::models::NewStarObservation;
use crate::db::history::queries::insert_star_observation;
use crate::db::repository::models::NewRepository;
use crate::db::repository::queries::upsert_repository;
use crate::db::PgPool;

/// Postgres-backed crawl store. One transaction per page: all snapshot
/// upserts, all history appends and the checkpoint advance commit
/// together or not at all.
pub struct PgCrawlStore {
    pool: PgPool,
}

impl PgCrawlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CrawlStore for PgCrawlStore {
    fn load_checkpoint(&mut self, partition_key: &str) -> Result<Checkpoint, StoreError> {
        let mut conn = self.pool.get().map_err(anyhow::Error::from)?;

        let row = get_checkpoint(&mut conn, partition_key).map_err(anyhow::Error::from)?;
        Ok(row
            .map(|cp| Checkpoint {
                end_cursor: cp.end_cursor,
                fetched_count: cp.fetched_count,
            })
            .unwrap_or_default())
    }

    fn commit_page(
        &mut self,
        partition_key: &str,
        records: &[RepoRecord],
        next_cursor: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().map_err(anyhow::Error::from)?;
        let fetched_at = Utc::now();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            for record in records {
                let new_repo = NewRepository {
                    repo_id: &record.repo_id,
                    name: &record.name,
                    owner: &record.owner,
                    full_name: &record.full_name,
                    url: &record.url,
                    stars: record.stars,
                    forks: record.forks,
                    language: record.language.as_deref(),
                    description: record.description.as_deref(),
                    created_at: record.created_at,
                };
                upsert_repository(conn, &new_repo)?;

                let observation = NewStarObservation {
                    repo_id: &record.repo_id,
                    stars: record.stars,
                    fetched_at,
                };
                insert_star_observation(conn, &observation)?;
            }

            save_checkpoint(conn, partition_key, next_cursor, records.len() as i64)?;
            Ok(())
        })?;

        Ok(())
    }
}
