//! End-to-end tests of the recommendation engine on a synthetic catalog.
//!
//! Forty movies in four genre families with one content axis each, thirty
//! users who each prefer one family, and a handful of similarity edges.

use std::collections::HashSet;
use std::sync::Arc;

use data_loader::{DataIndex, Genre, Movie, MovieId, Rating, SimilarityEdge};
use factorization::{
    BatchSizePolicy, FactorizationConfig, InferenceStrategy, LatentModel, MatrixFactorization,
    ModelError, SparseRatingEncoder,
};
use pipeline::LabeledGroup;
use rand::SeedableRng;
use rand::rngs::StdRng;
use server::{EngineConfig, EngineError, RecommendationEngine, SharedEngine};
use sources::ContentFeatureTable;

const N_MOVIES: u32 = 40;
const N_USERS: u32 = 30;

fn family_genres(id: MovieId) -> Vec<Genre> {
    match id % 4 {
        0 => vec![Genre::Action, Genre::Thriller],
        1 => vec![Genre::Comedy, Genre::Romance],
        2 => vec![Genre::Animation, Genre::Children],
        _ => vec![Genre::Documentary],
    }
}

fn user_score(user_id: u32, movie_id: MovieId) -> Option<f32> {
    if (user_id + movie_id) % 3 == 0 {
        return None;
    }
    if user_id % 4 == movie_id % 4 {
        Some(if movie_id % 2 == 0 { 5.0 } else { 4.5 })
    } else {
        Some(1.5)
    }
}

fn create_data_index() -> DataIndex {
    let mut index = DataIndex::new();
    for id in 1..=N_MOVIES {
        // Even movies up to 20 are popular and well rated; movie 3 is
        // popular but rated above the evaluation band
        let (votes, vote_average) = match id {
            3 => (Some(500_000), Some(9.5)),
            id if id <= 20 && id % 2 == 0 => (Some(400_000), Some(7.0)),
            _ => (Some(1_000), Some(6.5)),
        };
        index.insert_movie(Movie {
            id,
            title: format!("Movie {} ({})", id, 1985 + id),
            year: Some(1985 + id as u16),
            genres: family_genres(id),
            votes,
            vote_average,
        });
    }

    for user_id in 1..=N_USERS {
        for movie_id in 1..=N_MOVIES {
            if let Some(score) = user_score(user_id, movie_id) {
                index.insert_rating(Rating {
                    user_id,
                    movie_id,
                    score,
                    timestamp: 1_000_000 + movie_id as i64,
                });
            }
        }
    }

    for (movie_id, other_movie_id, score) in [
        (1, 5, 0.9),
        (1, 9, 0.8),
        (1, 13, 0.7),
        (1, 99, 0.5),
        (2, 6, 0.9),
        (2, 10, 0.8),
        (5, 9, 0.6),
    ] {
        index.insert_similarity(SimilarityEdge {
            movie_id,
            other_movie_id,
            score,
        });
    }

    index.build_secondary_indices();
    index
}

fn create_content_table() -> ContentFeatureTable {
    let rows = (1..=N_MOVIES)
        .filter(|id| id % 10 != 0)
        .map(|id| {
            let mut vector = vec![0.05 * (id % 3) as f32; 4];
            vector[(id % 4) as usize] = 1.0;
            (id, vector)
        })
        .collect();
    ContentFeatureTable::from_rows(rows, 4).unwrap()
}

fn train_model(index: &DataIndex) -> LatentModel {
    let observations = index
        .iter_ratings()
        .map(|r| ((r.user_id - 1) as usize, r.movie_id, r.score));
    let x = SparseRatingEncoder::new(N_MOVIES as usize)
        .encode_matrix(observations, N_USERS as usize)
        .unwrap();

    let config = FactorizationConfig::default()
        .with_k(4)
        .with_batch_size(BatchSizePolicy::Fixed(8));
    let mut mf = MatrixFactorization::new(config).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    mf.train(&x, 20, &mut rng).unwrap();
    mf.into_model()
}

fn create_engine(config: EngineConfig) -> RecommendationEngine {
    let index = create_data_index();
    let model = train_model(&index);
    RecommendationEngine::new(
        Arc::new(model),
        Arc::new(create_content_table()),
        Arc::new(index),
        config,
    )
    .unwrap()
}

fn seeded_engine() -> RecommendationEngine {
    create_engine(EngineConfig::default().with_seed(7))
}

fn returned_ids(groups: &[LabeledGroup]) -> Vec<MovieId> {
    groups
        .iter()
        .flat_map(|g| g.movie_ids.iter().copied())
        .collect()
}

fn assert_well_formed(groups: &[LabeledGroup]) {
    let uncategorized: Vec<&LabeledGroup> =
        groups.iter().filter(|g| g.label.is_uncategorized()).collect();
    assert_eq!(uncategorized.len(), 1);
    assert!(groups.last().unwrap().label.is_uncategorized());

    let labeled = &groups[..groups.len() - 1];
    assert!(
        labeled
            .windows(2)
            .all(|w| w[0].movie_ids.len() >= w[1].movie_ids.len())
    );

    let ids = returned_ids(groups);
    let unique: HashSet<MovieId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn test_new_user_recommendation() {
    let engine = seeded_engine();
    let groups = engine.recommend(&[(1, 5.0), (2, 4.5)], 10).unwrap();

    assert_well_formed(&groups);
    assert!(groups.len() >= 2, "expected at least one labeled group");

    let ids = returned_ids(&groups);
    assert_eq!(ids.len(), 10);
    assert!(!ids.contains(&1) && !ids.contains(&2));
    assert!(!ids.contains(&99));
    assert!(ids.iter().all(|&id| id >= 1 && id <= N_MOVIES));
}

#[test]
fn test_labels_match_member_genres() {
    let engine = seeded_engine();
    let groups = engine.recommend(&[(4, 5.0), (8, 5.0), (3, 1.0)], 20).unwrap();

    for group in &groups {
        if let pipeline::GroupLabel::Genres(genres) = &group.label {
            let genre = genres[0];
            let sharing = group
                .movie_ids
                .iter()
                .filter(|&&id| family_genres(id).contains(&genre))
                .count();
            assert!(sharing as f64 / group.movie_ids.len() as f64 >= 0.66);
        }
    }
}

#[test]
fn test_stored_user_never_gets_rated_movies() {
    let engine = seeded_engine();
    let rated: HashSet<MovieId> = engine
        .data_index()
        .get_user_ratings(3)
        .iter()
        .map(|r| r.movie_id)
        .collect();
    assert!(!rated.is_empty());

    let groups = engine.recommend_for_user(3, 12).unwrap();
    assert_well_formed(&groups);
    let ids = returned_ids(&groups);
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|id| !rated.contains(id)));
}

#[test]
fn test_unknown_user_degrades_gracefully() {
    let engine = seeded_engine();
    let groups = engine.recommend_for_user(9_999, 5).unwrap();
    assert_well_formed(&groups);
    assert_eq!(returned_ids(&groups).len(), 5);
}

#[test]
fn test_unknown_user_with_closed_form_inference() {
    let engine = create_engine(
        EngineConfig::default()
            .with_seed(7)
            .with_strategy(InferenceStrategy::ClosedForm { lambda: 0.1 }),
    );
    let groups = engine.recommend_for_user(9_999, 5).unwrap();
    assert_well_formed(&groups);
    assert_eq!(returned_ids(&groups).len(), 5);

    let index = create_data_index();
    let model = train_model(&index);
    let result = RecommendationEngine::new(
        Arc::new(model),
        Arc::new(create_content_table()),
        Arc::new(index),
        EngineConfig::default().with_strategy(InferenceStrategy::ClosedForm { lambda: 0.0 }),
    );
    assert!(matches!(
        result,
        Err(EngineError::Model(ModelError::InvalidConfig(_)))
    ));
}

#[test]
fn test_zero_limit_returns_empty_uncategorized_group() {
    let engine = seeded_engine();
    let groups = engine.recommend(&[(1, 5.0)], 0).unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].label.is_uncategorized());
    assert!(groups[0].movie_ids.is_empty());
}

#[test]
fn test_rating_for_unknown_movie_is_rejected() {
    let engine = seeded_engine();
    let result = engine.recommend(&[(N_MOVIES + 1, 4.0)], 5);
    assert!(matches!(
        result,
        Err(EngineError::Model(ModelError::InvalidItemId { .. }))
    ));
}

#[test]
fn test_seeded_requests_are_deterministic() {
    let engine = seeded_engine();
    let ratings = [(1, 5.0), (6, 4.0), (11, 2.0)];
    let first = engine.recommend(&ratings, 15).unwrap();
    let second = engine.recommend(&ratings, 15).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_similar_items() {
    let engine = seeded_engine();
    // Only one precomputed edge: one result, not an error
    assert_eq!(engine.similar_items(5, 3), vec![9]);
    assert_eq!(engine.similar_items(1, 2), vec![5, 9]);
    assert!(engine.similar_items(40, 3).is_empty());
}

#[test]
fn test_evaluation_candidates() {
    let engine = seeded_engine();

    let sample = engine.evaluation_candidates(&[2, 4], 5).unwrap();
    assert_eq!(sample.len(), 5);
    let unique: HashSet<MovieId> = sample.iter().copied().collect();
    assert_eq!(unique.len(), 5);
    for id in &sample {
        assert!(*id <= 20 && id % 2 == 0 && *id != 2 && *id != 4);
        let movie = engine.data_index().get_movie(*id).unwrap();
        assert!(movie.votes.unwrap() >= 300_000);
        assert!((6.0..=9.0).contains(&movie.vote_average.unwrap()));
    }

    match engine.evaluation_candidates(&[], 11) {
        Err(EngineError::InsufficientCandidates {
            requested,
            available,
        }) => {
            assert_eq!(requested, 11);
            assert_eq!(available, 10);
        }
        other => panic!("expected InsufficientCandidates, got {other:?}"),
    }
}

#[test]
fn test_evaluation_exclusions_tolerate_repeats_and_strays() {
    let engine = seeded_engine();
    let exclude = [2, 4, 2, 4, 999, 3];
    let sample = engine.evaluation_candidates(&exclude, 8).unwrap();
    assert!(sample.iter().all(|id| !exclude.contains(id)));
    assert!(matches!(
        engine.evaluation_candidates(&exclude, 9),
        Err(EngineError::InsufficientCandidates {
            requested: 9,
            available: 8
        })
    ));
}

#[test]
fn test_evaluation_candidates_skip_rated() {
    let engine = seeded_engine();
    let rated: HashSet<MovieId> = engine
        .data_index()
        .get_user_ratings(1)
        .iter()
        .map(|r| r.movie_id)
        .collect();

    // User 1 has not rated 2, 8, 14 and 20
    let sample = engine.evaluation_candidates_for_user(1, 4).unwrap();
    assert_eq!(sample.len(), 4);
    assert!(sample.iter().all(|id| !rated.contains(id)));
    assert!(engine.evaluation_candidates_for_user(1, 5).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let index = create_data_index();
    let model = train_model(&index);
    let config = EngineConfig {
        n_components: 0,
        ..EngineConfig::default()
    };
    let result = RecommendationEngine::new(
        Arc::new(model),
        Arc::new(create_content_table()),
        Arc::new(index),
        config,
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_shared_engine_serves_and_swaps() {
    let shared = SharedEngine::new(seeded_engine());

    let (first, second) = tokio::join!(
        shared.recommend(vec![(1, 5.0), (2, 4.5)], 10),
        shared.recommend_for_user(2, 8)
    );
    assert_eq!(returned_ids(&first.unwrap()).len(), 10);
    assert_well_formed(&second.unwrap());

    let in_flight = shared.current().await;
    let replacement = create_engine(
        EngineConfig::default()
            .with_seed(7)
            .with_strategy(InferenceStrategy::ClosedForm { lambda: 0.1 }),
    );
    let previous = shared.swap(replacement).await;

    assert!(Arc::ptr_eq(&previous, &in_flight));
    assert_eq!(
        shared.current().await.config().strategy,
        InferenceStrategy::ClosedForm { lambda: 0.1 }
    );
    assert_eq!(in_flight.config().strategy, InferenceStrategy::default());

    let groups = shared.recommend(vec![(3, 5.0)], 6).await.unwrap();
    assert_well_formed(&groups);
    assert_eq!(shared.similar_items(5, 3).await, vec![9]);
    assert_eq!(
        shared
            .evaluation_candidates_for_user(1, 4)
            .await
            .unwrap()
            .len(),
        4
    );
}
