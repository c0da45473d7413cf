//! Leaderboard gateway.
//!
//! Submissions are appended to an external table, then a stored procedure
//! returns the ranked rows around the new score. Ranking happens entirely in
//! the database; rows come back to the caller untouched.
//!
//! - [`supabase`]: PostgREST-backed store

pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LeaderboardConfig;
use crate::leaderboard::supabase::SupabaseStore;

/// Window size passed to the ranking procedure.
pub const WINDOW_SIZE: i64 = 3;

/// A ranked row produced by the database. Opaque to this service.
pub type WindowRow = serde_json::Value;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("leaderboard database is not configured")]
    Unconfigured,

    #[error("database request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("database returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("unexpected database response: {0}")]
    Decode(String),
}

/// Score submission from a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub initials: String,
    pub score: i64,
}

/// Row appended to the leaderboard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub initials: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

impl LeaderboardRow {
    pub fn stamped(entry: &LeaderboardEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            initials: entry.initials.clone(),
            score: entry.score,
            created_at,
        }
    }
}

/// Append-only score storage with a windowed ranking query.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn insert(&self, row: &LeaderboardRow) -> Result<(), StoreError>;

    /// Rows ranked around `score`, in the order the database returns them.
    async fn window(
        &self,
        initials: &str,
        score: i64,
        window_size: i64,
    ) -> Result<Vec<WindowRow>, StoreError>;
}

/// Stand-in used when no database credentials were supplied. The service
/// still starts; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredStore;

#[async_trait]
impl LeaderboardStore for UnconfiguredStore {
    async fn insert(&self, _row: &LeaderboardRow) -> Result<(), StoreError> {
        Err(StoreError::Unconfigured)
    }

    async fn window(
        &self,
        _initials: &str,
        _score: i64,
        _window_size: i64,
    ) -> Result<Vec<WindowRow>, StoreError> {
        Err(StoreError::Unconfigured)
    }
}

/// Pick the store backend for the given configuration.
pub fn connect(config: &LeaderboardConfig) -> Result<Arc<dyn LeaderboardStore>, StoreError> {
    match config.credentials() {
        Some((url, key)) => {
            let store = SupabaseStore::new(url, key, config)?;
            debug!(base = store.rest_base(), "Leaderboard store configured");
            Ok(Arc::new(store))
        }
        None => {
            warn!("Leaderboard database credentials missing; submissions will fail");
            Ok(Arc::new(UnconfiguredStore))
        }
    }
}

/// Records submissions and fetches the surrounding ranking window.
#[derive(Clone)]
pub struct LeaderboardGateway {
    store: Arc<dyn LeaderboardStore>,
}

impl LeaderboardGateway {
    pub fn new(store: Arc<dyn LeaderboardStore>) -> Self {
        Self { store }
    }

    /// Insert the entry, then return the ranked rows around it.
    ///
    /// The window query is only issued once the insert has succeeded.
    pub async fn submit(&self, entry: &LeaderboardEntry) -> Result<Vec<WindowRow>, StoreError> {
        let row = LeaderboardRow::stamped(entry, Utc::now());
        self.store.insert(&row).await?;

        let rows = self
            .store
            .window(&entry.initials, entry.score, WINDOW_SIZE)
            .await?;

        if rows.is_empty() {
            warn!(
                initials = entry.initials,
                score = entry.score,
                "No data returned from leaderboard query"
            );
        }

        Ok(rows)
    }
}
