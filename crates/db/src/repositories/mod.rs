use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use relist_core::domain::article::{Article, ArticleId, Bundle, BundleId, CompletedSale};
use relist_core::domain::insight::{CacheKey, Insight, InsightId, InsightStatus};

pub mod article;
pub mod bundle;
pub mod insight;
pub mod memory;
pub mod sale;

pub use article::SqlArticleRepository;
pub use bundle::SqlBundleRepository;
pub use insight::SqlInsightStore;
pub use memory::{
    InMemoryArticleRepository, InMemoryBundleRepository, InMemoryInsightStore,
    InMemorySaleRepository,
};
pub use sale::SqlSaleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid lifecycle transition: {0}")]
    InvalidTransition(String),
}

/// Whether `set_status` changed a row. Calls that hit a record already in
/// a terminal state (or no record at all) are no-ops, never errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetStatusOutcome {
    Applied,
    NoOp,
}

/// Lifecycle owner for cached recommendations, generic over the
/// recommendation type via the cache key.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Active, non-expired records for one (owner, cache key) partition,
    /// oldest first.
    async fn load_active(
        &self,
        owner_id: &str,
        cache_key: &CacheKey,
    ) -> Result<Vec<Insight>, RepositoryError>;

    /// Atomically delete the existing batch for (owner, cache key) and
    /// insert the replacement with a shared refresh timestamp and TTL.
    /// Returns the batch as stamped.
    async fn replace(
        &self,
        owner_id: &str,
        cache_key: &CacheKey,
        batch: Vec<Insight>,
    ) -> Result<Vec<Insight>, RepositoryError>;

    /// Move an active insight into a terminal status. Only `dismissed`
    /// and `completed` are accepted targets.
    async fn set_status(
        &self,
        id: &InsightId,
        status: InsightStatus,
    ) -> Result<SetStatusOutcome, RepositoryError>;
}

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn list_active(&self, owner_id: &str) -> Result<Vec<Article>, RepositoryError>;

    /// Fetch the given articles; ids without a matching row are simply
    /// absent from the result (the caller decides whether that is fatal).
    async fn find_by_ids(
        &self,
        owner_id: &str,
        ids: &[ArticleId],
    ) -> Result<Vec<Article>, RepositoryError>;

    async fn update_price(&self, id: &ArticleId, price: Decimal) -> Result<(), RepositoryError>;

    async fn save(&self, article: Article) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BundleRepository: Send + Sync {
    async fn insert_bundle(&self, bundle: Bundle) -> Result<(), RepositoryError>;

    async fn insert_members(
        &self,
        bundle_id: &BundleId,
        article_ids: &[ArticleId],
    ) -> Result<(), RepositoryError>;

    /// Compensation for a failed bundle creation: remove the container
    /// and any membership rows that made it in.
    async fn delete_bundle(&self, bundle_id: &BundleId) -> Result<(), RepositoryError>;

    async fn find_bundle(&self, bundle_id: &BundleId) -> Result<Option<Bundle>, RepositoryError>;

    async fn member_count(&self, bundle_id: &BundleId) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait SaleRepository: Send + Sync {
    /// Completed sales for the owner inside the trailing window, most
    /// recent first, capped at `limit` rows.
    async fn recent_completed(
        &self,
        owner_id: &str,
        window_days: i64,
        limit: u32,
    ) -> Result<Vec<CompletedSale>, RepositoryError>;

    async fn save(&self, sale: CompletedSale) -> Result<(), RepositoryError>;
}

/// Timestamps are stored as fixed-width RFC 3339 text so range filters in
/// SQL stay correct under lexicographic comparison.
pub(crate) fn encode_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp for {field}: {error}")))
}

pub(crate) fn decode_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal for {field}: {error}")))
}
