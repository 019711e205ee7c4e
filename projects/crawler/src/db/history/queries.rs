use diesel::prelude::*;
use thiserror::Error;

use crate::db::{history::models::*, schema::stars_history::dsl::*};

#[derive(Debug, Error)]
pub enum InsertStarObservationError {
    #[error("InsertStarObservation: {source}")]
    InsertStarObservation {
        #[from]
        source: diesel::result::Error,
    },
}

pub fn insert_star_observation(
    conn: &mut PgConnection,
    new: &NewStarObservation,
) -> Result<StarObservation, InsertStarObservationError> {
    diesel::insert_into(stars_history)
        .values(new)
        .get_result(conn)
        .map_err(|source| InsertStarObservationError::InsertStarObservation { source })
}
