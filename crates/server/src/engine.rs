//! # Recommendation Engine
//!
//! The single entry point of the recommendation core. A request:
//! 1. Builds a user context from the supplied ratings
//! 2. Samples similar items of the user's favorites
//! 3. Scores every movie with the latent-factor model (content boost and
//!    temporal discount included) and fills the pool with the best of them
//! 4. Filters unknown, already rated and repeated movies
//! 5. Clusters the pool into genre-labeled groups, refining an oversized
//!    uncategorized group once
//! 6. Orders groups by size with the uncategorized group last
//!
//! The model, content table and catalog are shared read-only; everything a
//! request computes is local to it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{debug, info, instrument, warn};

use data_loader::{DataIndex, MovieId, UserId};
use factorization::LatentModel;
use pipeline::filters::{AlreadyRatedFilter, DedupFilter, KnownItemFilter};
use pipeline::{ClusterLabeler, FilterPipeline, LabeledGroup};
use sources::user_context::build_user_context;
use sources::{
    Candidate, ContentFeatureTable, LatentFactorSource, SimilarItemsSource, TemporalDiscount,
    UserContext,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

pub struct RecommendationEngine {
    model: Arc<LatentModel>,
    content: Arc<ContentFeatureTable>,
    data_index: Arc<DataIndex>,
    latent: LatentFactorSource,
    similar: SimilarItemsSource,
    filter_pipeline: FilterPipeline,
    labeler: ClusterLabeler,
    config: EngineConfig,
}

impl RecommendationEngine {
    /// Assemble an engine from already loaded resources.
    ///
    /// Fails with `IncompatibleData` when the model has no items. Catalog or
    /// content entries beyond the model's item range are tolerated: they are
    /// never scored and are dropped from candidate pools.
    pub fn new(
        model: Arc<LatentModel>,
        content: Arc<ContentFeatureTable>,
        data_index: Arc<DataIndex>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let n_items = model.n_items();
        if n_items == 0 {
            return Err(EngineError::IncompatibleData(
                "model has no item factors".to_string(),
            ));
        }

        let untracked_content = content
            .tagged_ids()
            .iter()
            .filter(|&&id| id as usize > n_items)
            .count();
        if untracked_content > 0 {
            warn!(
                count = untracked_content,
                n_items, "Content features for movies outside the model"
            );
        }
        let max_movie_id = data_index.max_movie_id() as usize;
        if max_movie_id > n_items {
            warn!(
                max_movie_id,
                n_items, "Catalog has movies newer than the model; they will not be scored"
            );
        }

        let discount = TemporalDiscount {
            threshold_year: config.threshold_year,
            decay_rate: config.decay_rate,
        };
        let latent = LatentFactorSource::new(model.clone(), content.clone(), &data_index, discount)
            .with_strategy(config.strategy)
            .with_content_boost(config.content_boost_weight);

        let similar = SimilarItemsSource::new(data_index.clone())
            .with_favorite_threshold(config.favorite_threshold)
            .with_max_favorites(config.max_favorites)
            .with_sampling(
                config.similar_pool_budget,
                config.per_favorite_cap,
                config.edges_considered,
            );

        let filter_pipeline = FilterPipeline::new()
            .add_filter(KnownItemFilter::new(n_items))
            .add_filter(AlreadyRatedFilter)
            .add_filter(DedupFilter);

        let labeler = ClusterLabeler::new(content.clone(), data_index.clone())
            .with_config(config.labeler.clone());

        info!(
            n_items,
            k = model.k(),
            tagged = content.len(),
            strategy = config.strategy.name(),
            "Recommendation engine ready"
        );

        Ok(Self {
            model,
            content,
            data_index,
            latent,
            similar,
            filter_pipeline,
            labeler,
            config,
        })
    }

    /// Load the catalog from `data_dir`, the model snapshot from
    /// `model_path` and `features.dat` (if present) from `data_dir`
    pub fn from_paths(data_dir: &Path, model_path: &Path, config: EngineConfig) -> Result<Self> {
        let data_index = DataIndex::load_from_files(data_dir)?;
        let model = LatentModel::load(model_path)?;

        let features_path = data_dir.join("features.dat");
        let content = if features_path.exists() {
            ContentFeatureTable::load(&features_path, config.n_components)?
        } else {
            warn!(
                path = %features_path.display(),
                "No content features, boosting and clustering are disabled"
            );
            ContentFeatureTable::from_rows(Vec::new(), config.n_components)?
        };

        Self::new(
            Arc::new(model),
            Arc::new(content),
            Arc::new(data_index),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<LatentModel> {
        &self.model
    }

    pub fn content(&self) -> &Arc<ContentFeatureTable> {
        &self.content
    }

    pub fn data_index(&self) -> &Arc<DataIndex> {
        &self.data_index
    }

    /// Recommend for a user described only by their ratings.
    ///
    /// Returns labeled groups ordered by size with the uncategorized group
    /// last (always present, possibly empty). At most `limit` movies in
    /// total, none of them rated by the user. A rating for a movie outside
    /// the model's range fails with `InvalidItemId`.
    pub fn recommend(&self, ratings: &[(MovieId, f32)], limit: usize) -> Result<Vec<LabeledGroup>> {
        let context = UserContext::from_ratings(None, ratings);
        self.recommend_with_context(&context, limit)
    }

    /// Recommend for a stored user. An unknown user is treated as one with
    /// no ratings.
    ///
    /// Ratings of movies newer than the model cannot be encoded; they are
    /// left out of scoring but still excluded from the result.
    pub fn recommend_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<LabeledGroup>> {
        let mut context = build_user_context(&self.data_index, user_id);

        let n_items = self.model.n_items();
        let before = context.ratings.len();
        context.ratings.retain(|&(id, _)| id as usize <= n_items);
        if context.ratings.len() < before {
            warn!(
                user_id,
                skipped = before - context.ratings.len(),
                "Ratings of movies unknown to the model were not scored"
            );
        }

        self.recommend_with_context(&context, limit)
    }

    #[instrument(skip(self, context), fields(user_id = ?context.user_id, ratings = context.ratings.len()))]
    fn recommend_with_context(
        &self,
        context: &UserContext,
        limit: usize,
    ) -> Result<Vec<LabeledGroup>> {
        let start_time = Instant::now();
        let mut rng = self.request_rng();

        let pool = self.build_pool(context, limit, &mut rng)?;
        let ids: Vec<MovieId> = pool.iter().map(|c| c.movie_id).collect();

        let groups = self.labeler.label(&ids);
        let groups = self.labeler.refine(groups, &self.config.refinement);
        let ranked = groups.into_ranked(&mut rng);

        info!(
            pool = ids.len(),
            groups = ranked.len(),
            elapsed = ?start_time.elapsed(),
            "Recommendation complete"
        );
        Ok(ranked)
    }

    /// Similarity candidates first (at most `limit`), then the best latent
    /// candidates until the pool holds `limit` movies
    fn build_pool(
        &self,
        context: &UserContext,
        limit: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<Candidate>> {
        let mut similar = self.similar.get_candidates(context, rng);
        similar.truncate(limit);

        let latent = self
            .latent
            .get_candidates(context, limit + similar.len(), rng)?;

        debug!(
            similar = similar.len(),
            latent = latent.len(),
            "Generated raw candidates"
        );

        let mut candidates = similar;
        candidates.extend(latent);
        let mut pool = self.filter_pipeline.apply(candidates, context)?;
        pool.truncate(limit);
        Ok(pool)
    }

    /// Top `limit` precomputed neighbors of `movie_id`, best first. Empty
    /// when nothing was precomputed.
    pub fn similar_items(&self, movie_id: MovieId, limit: usize) -> Vec<MovieId> {
        self.data_index
            .get_similar(movie_id, limit)
            .iter()
            .map(|edge| edge.other_movie_id)
            .collect()
    }

    /// Sample `limit` distinct popular, well-rated movies for a user to rate.
    ///
    /// Eligible movies pass the configured vote filter, are known to the
    /// model and are not in `exclude`. Fails with `InsufficientCandidates`
    /// when fewer than `limit` are eligible.
    #[instrument(skip(self, exclude), fields(excluded = exclude.len()))]
    pub fn evaluation_candidates(
        &self,
        exclude: &[MovieId],
        limit: usize,
    ) -> Result<Vec<MovieId>> {
        let n_items = self.model.n_items();
        let band = &self.config.evaluation;
        let exclude: HashSet<MovieId> = exclude.iter().copied().collect();

        let eligible: Vec<MovieId> = self
            .data_index
            .get_all_movie_ids()
            .into_iter()
            .filter(|&id| id as usize <= n_items && !exclude.contains(&id))
            .filter(|&id| {
                self.data_index
                    .get_movie(id)
                    .is_some_and(|movie| band.accepts(movie.votes, movie.vote_average))
            })
            .collect();

        if eligible.len() < limit {
            return Err(EngineError::InsufficientCandidates {
                requested: limit,
                available: eligible.len(),
            });
        }

        let mut rng = self.request_rng();
        let sample: Vec<MovieId> = eligible.choose_multiple(&mut rng, limit).copied().collect();
        debug!(
            eligible = eligible.len(),
            sampled = sample.len(),
            "Sampled evaluation candidates"
        );
        Ok(sample)
    }

    /// Evaluation candidates excluding everything a stored user has rated
    pub fn evaluation_candidates_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MovieId>> {
        let rated: Vec<MovieId> = self
            .data_index
            .get_user_ratings(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect();
        self.evaluation_candidates(&rated, limit)
    }

    fn request_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
