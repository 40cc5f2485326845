pub mod config;
pub mod domain;
pub mod errors;
pub mod market;
pub mod pricing;

pub use domain::article::{Article, ArticleId, ArticleStatus, Bundle, BundleId, CompletedSale};
pub use domain::insight::{
    BatchFreshness, CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType,
    PriceMarketData, SuggestedAction,
};
pub use errors::{DomainError, EngineError, GenerationError};
pub use market::{compute_market_stats, derive_category, MarketStats, MarketWindow, SegmentKey};
pub use pricing::{classify_pricing, resolve_price_band, BandSource, PriceBand, PriceDirection};
