//! Integration tests for the pipeline.
//!
//! A small catalog with hand-placed content vectors: filters clean a raw
//! candidate pool, then the labeler groups what is left.

use data_loader::{DataIndex, Genre, Movie, MovieId};
use pipeline::filters::*;
use pipeline::{ClusterLabeler, FilterPipeline, GroupLabel, LabelerConfig, RefinementConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use sources::{Candidate, CandidateSource, ContentFeatureTable, UserContext};
use std::collections::HashSet;
use std::sync::Arc;

const N_MOVIES: MovieId = 60;

/// Movies cycle through four genre families, each with its own content axis.
/// Every fifth movie has no content vector.
fn create_test_setup() -> (Arc<DataIndex>, Arc<ContentFeatureTable>) {
    let families = [
        vec![Genre::Action, Genre::Thriller],
        vec![Genre::Comedy, Genre::Romance],
        vec![Genre::Animation, Genre::Children],
        vec![Genre::Documentary],
    ];

    let mut index = DataIndex::new();
    let mut rows = Vec::new();
    for id in 1..=N_MOVIES {
        let family = (id % 4) as usize;
        // Alternate genre order inside a family to exercise label symmetry
        let mut genres = families[family].clone();
        if id % 8 >= 4 {
            genres.reverse();
        }
        index.insert_movie(Movie {
            id,
            title: format!("Movie {} ({})", id, 1990 + id),
            year: Some(1990 + id as u16),
            genres,
            votes: None,
            vote_average: None,
        });

        if id % 5 != 0 {
            let mut vector = vec![0.05 * (id % 3) as f32; 4];
            vector[family] = 1.0;
            rows.push((id, vector));
        }
    }
    index.build_secondary_indices();

    let table = ContentFeatureTable::from_rows(rows, 4).unwrap();
    (Arc::new(index), Arc::new(table))
}

fn all_ids(groups: &[pipeline::LabeledGroup]) -> Vec<MovieId> {
    groups
        .iter()
        .flat_map(|g| g.movie_ids.iter().copied())
        .collect()
}

#[test]
fn test_filter_then_label_partitions_pool() {
    let (index, content) = create_test_setup();
    let context = UserContext::from_ratings(None, &[(1, 5.0), (2, 4.5), (3, 3.0)]);

    let mut candidates: Vec<Candidate> = (1..=N_MOVIES + 5)
        .map(|id| Candidate::new(id, CandidateSource::LatentFactor, 1.0))
        .collect();
    candidates.push(Candidate::new(4, CandidateSource::Similarity, 0.9));

    let pool = FilterPipeline::new()
        .add_filter(KnownItemFilter::new(N_MOVIES as usize))
        .add_filter(AlreadyRatedFilter)
        .add_filter(DedupFilter)
        .apply(candidates, &context)
        .unwrap();
    assert_eq!(pool.len(), N_MOVIES as usize - 3);

    let ids: Vec<MovieId> = pool.iter().map(|c| c.movie_id).collect();
    let labeler = ClusterLabeler::new(content, index);
    let groups = labeler.label(&ids);

    // Four families, each labeled once regardless of genre order
    assert_eq!(groups.labeled().len(), 4);
    let action = groups.get(&[Genre::Thriller, Genre::Action]).unwrap();
    assert!(action.movie_ids.iter().all(|&id| id % 4 == 0));
    let documentary = groups.get(&[Genre::Documentary]).unwrap();
    assert_eq!(
        documentary.label,
        GroupLabel::Genres(vec![Genre::Documentary])
    );

    // Untagged movies are the only uncategorized ones
    assert!(groups.uncategorized().iter().all(|&id| id % 5 == 0));

    let mut rng = StdRng::seed_from_u64(11);
    let ranked = groups.into_ranked(&mut rng);
    assert!(ranked.last().unwrap().label.is_uncategorized());

    let returned = all_ids(&ranked);
    let unique: HashSet<MovieId> = returned.iter().copied().collect();
    assert_eq!(returned.len(), unique.len());
    assert_eq!(unique, ids.iter().copied().collect::<HashSet<_>>());
    assert!(!unique.contains(&1) && !unique.contains(&2) && !unique.contains(&3));
}

#[test]
fn test_untaggable_pool_is_single_uncategorized_group() {
    let (index, content) = create_test_setup();
    let labeler = ClusterLabeler::new(content, index);

    let ids: Vec<MovieId> = vec![5, 10, 15, 20, 100];
    let groups = labeler.label_and_refine(&ids, &RefinementConfig::default());

    let mut rng = StdRng::seed_from_u64(3);
    let ranked = groups.into_ranked(&mut rng);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].label, GroupLabel::Uncategorized);

    let mut returned = ranked[0].movie_ids.clone();
    returned.sort_unstable();
    assert_eq!(returned, ids);
}

#[test]
fn test_refinement_keeps_partition() {
    let (index, content) = create_test_setup();
    // Only one cluster may be labeled in the first pass
    let labeler = ClusterLabeler::new(content, index).with_config(LabelerConfig {
        k: 1,
        ..LabelerConfig::default()
    });
    let ids: Vec<MovieId> = (1..=N_MOVIES).collect();

    let first = labeler.label(&ids);
    assert_eq!(first.labeled().len(), 1);
    assert!(first.uncategorized().len() > 20);

    let refined = labeler.refine(first, &RefinementConfig::default());
    assert_eq!(refined.labeled().len(), 2);
    assert_eq!(refined.total_items(), ids.len());

    let mut rng = StdRng::seed_from_u64(5);
    let mut returned = all_ids(&refined.into_ranked(&mut rng));
    returned.sort_unstable();
    assert_eq!(returned, ids);
}
