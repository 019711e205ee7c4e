use diesel::dsl::now;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::db::{repository::models::*, schema::repositories::dsl::*};

#[derive(Debug, thiserror::Error)]
pub enum UpsertRepositoryError {
    #[error("UpsertRepository: {source}")]
    UpsertRepository {
        #[from]
        source: diesel::result::Error,
    },
}

/// Insert-or-update keyed on `repo_id`. `created_at` is written on first
/// sight only; every conflict refreshes the mutable fields and `updated_at`.
pub fn upsert_repository(
    conn: &mut PgConnection,
    new: &NewRepository,
) -> Result<Repository, UpsertRepositoryError> {
    diesel::insert_into(repositories)
        .values(new)
        .on_conflict(repo_id)
        .do_update()
        .set((
            name.eq(excluded(name)),
            owner.eq(excluded(owner)),
            full_name.eq(excluded(full_name)),
            url.eq(excluded(url)),
            stars.eq(excluded(stars)),
            forks.eq(excluded(forks)),
            language.eq(excluded(language)),
            description.eq(excluded(description)),
            updated_at.eq(now),
        ))
        .get_result(conn)
        .map_err(|source| UpsertRepositoryError::UpsertRepository { source })
}
