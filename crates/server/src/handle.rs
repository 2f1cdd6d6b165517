//! Hot-swappable handle to the recommendation engine.
//!
//! Requests clone the current `Arc<RecommendationEngine>` and run against
//! that snapshot; `swap` replaces the engine for later requests without
//! disturbing in-flight ones. Retraining therefore never touches the model a
//! request is reading.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::info;

use data_loader::{MovieId, UserId};
use pipeline::LabeledGroup;

use crate::engine::RecommendationEngine;
use crate::error::{EngineError, Result};

#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<Arc<RecommendationEngine>>>,
}

impl SharedEngine {
    pub fn new(engine: RecommendationEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    /// Snapshot of the engine serving new requests
    pub async fn current(&self) -> Arc<RecommendationEngine> {
        self.inner.read().await.clone()
    }

    /// Replace the engine, returning the previous one
    pub async fn swap(&self, engine: RecommendationEngine) -> Arc<RecommendationEngine> {
        let n_items = engine.model().n_items();
        let previous = std::mem::replace(&mut *self.inner.write().await, Arc::new(engine));
        info!(n_items, "Swapped recommendation engine");
        previous
    }

    /// Run `recommend` on the blocking pool
    pub async fn recommend(
        &self,
        ratings: Vec<(MovieId, f32)>,
        limit: usize,
    ) -> Result<Vec<LabeledGroup>> {
        let engine = self.current().await;
        tokio::task::spawn_blocking(move || engine.recommend(&ratings, limit))
            .await
            .context("Recommendation task panicked")
            .map_err(EngineError::from)?
    }

    /// Run `recommend_for_user` on the blocking pool
    pub async fn recommend_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<LabeledGroup>> {
        let engine = self.current().await;
        tokio::task::spawn_blocking(move || engine.recommend_for_user(user_id, limit))
            .await
            .context("Recommendation task panicked")
            .map_err(EngineError::from)?
    }

    pub async fn similar_items(&self, movie_id: MovieId, limit: usize) -> Vec<MovieId> {
        self.current().await.similar_items(movie_id, limit)
    }

    pub async fn evaluation_candidates_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<MovieId>> {
        self.current()
            .await
            .evaluation_candidates_for_user(user_id, limit)
    }
}
