//! Persistence gateway for tournament records.
//!
//! The pipeline and the read API both talk to [`TournamentStore`]; backends
//! are Postgres ([`PgStore`]) and an in-memory implementation used by tests
//! and offline runs ([`MemoryStore`]).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use turnier_core::{Candidate, Category, Month, Tournament, TournamentType};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "turnier-store";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The identity-key uniqueness constraint rejected an insert. The
    /// orchestrator treats this as a benign no-op.
    #[error("a record with this identity key is already stored")]
    Conflict,
    #[error("no stored record with id {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("stored row is malformed: {0}")]
    Corrupt(String),
}

/// Filters for the read API's tournament listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TournamentFilter {
    pub month: Option<Month>,
    pub year: Option<i32>,
    pub is_international: Option<bool>,
    pub tournament_type: Option<TournamentType>,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Page {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.page_size
    }
}

/// Abstraction over the durable tournament store.
///
/// Each upsert is an independent per-record unit; the gateway owns the
/// bookkeeping timestamps and the identity-key uniqueness contract.
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Full persisted set, loaded once per pipeline run for reconciliation.
    async fn load_all(&self) -> Result<Vec<Tournament>, StoreError>;

    /// Insert a new record; sets `created_at` and `updated_at` to now.
    async fn insert(
        &self,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError>;

    /// Overwrite descriptive fields and analysis of an existing record;
    /// refreshes `updated_at` and preserves `created_at`.
    async fn update(
        &self,
        id: Uuid,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError>;

    /// Filtered, paginated listing; returns the page plus the total match
    /// count.
    async fn search(
        &self,
        filter: &TournamentFilter,
        page: Page,
    ) -> Result<(Vec<Tournament>, u64), StoreError>;

    async fn distinct_months(&self) -> Result<Vec<Month>, StoreError>;
    async fn distinct_years(&self) -> Result<Vec<i32>, StoreError>;
    async fn distinct_categories(&self) -> Result<Vec<Category>, StoreError>;
}
