use diesel::dsl::now;
use diesel::prelude::*;
use diesel::upsert::excluded;
use thiserror::Error;

use crate::db::{checkpoint::models::*, schema::crawl_checkpoints::dsl::*};

#[derive(Debug, Error)]
pub enum GetCheckpointError {
    #[error("GetCheckpoint: {source}")]
    GetCheckpoint {
        #[from]
        source: diesel::result::Error,
    },
}

/// Absent rows mean "never crawled": callers treat `None` as
/// cursor = null, fetched_count = 0.
pub fn get_checkpoint(
    conn: &mut PgConnection,
    key: &str,
) -> Result<Option<CrawlCheckpoint>, GetCheckpointError> {
    crawl_checkpoints
        .filter(partition_key.eq(key))
        .first::<CrawlCheckpoint>(conn)
        .optional()
        .map_err(|source| GetCheckpointError::GetCheckpoint { source })
}

#[derive(Debug, Error)]
pub enum SaveCheckpointError {
    #[error("SaveCheckpoint: {source}")]
    SaveCheckpoint {
        #[from]
        source: diesel::result::Error,
    },
}

/// Single commit point for a page: sets the resume cursor and adds
/// `delta` to the running count. `fetched_count` never decreases.
pub fn save_checkpoint(
    conn: &mut PgConnection,
    key: &str,
    cursor_val: Option<&str>,
    delta: i64,
) -> Result<CrawlCheckpoint, SaveCheckpointError> {
    let new = NewCrawlCheckpoint {
        partition_key: key,
        end_cursor: cursor_val,
        fetched_count: delta,
    };

    diesel::insert_into(crawl_checkpoints)
        .values(&new)
        .on_conflict(partition_key)
        .do_update()
        .set((
            end_cursor.eq(excluded(end_cursor)),
            fetched_count.eq(fetched_count + excluded(fetched_count)),
            updated_at.eq(now),
        ))
        .get_result(conn)
        .map_err(|source| SaveCheckpointError::SaveCheckpoint { source })
}
