//! Helper functions to build a UserContext from the DataIndex
//!
//! The storage collaborator hands over a user's observations ordered by
//! descending score; everything downstream reads the context instead of
//! querying the index again.

use crate::types::UserContext;
use data_loader::{DataIndex, MovieId, UserId};

/// Build a UserContext for a stored user.
///
/// A user with no ratings (or an unknown id) yields an empty context; the
/// minimum-ratings policy belongs to the caller.
pub fn build_user_context(data_index: &DataIndex, user_id: UserId) -> UserContext {
    let ratings: Vec<(MovieId, f32)> = data_index
        .get_user_ratings_by_score(user_id)
        .iter()
        .map(|r| (r.movie_id, r.score))
        .collect();
    UserContext::from_ratings(Some(user_id), &ratings)
}
