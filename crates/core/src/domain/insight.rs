use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::article::ArticleId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightId(pub String);

impl InsightId {
    pub fn generate() -> Self {
        Self(format!("ins-{}", Uuid::new_v4()))
    }
}

/// Logical partition identifying which pipeline produced a batch of
/// insights. One non-expired batch may exist per (owner, cache key).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn pricing() -> Self {
        Self("pricing".to_string())
    }

    pub fn proactive() -> Self {
        Self("proactive".to_string())
    }

    pub fn schedule() -> Self {
        Self("schedule".to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Active,
    Dismissed,
    Completed,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dismissed => "dismissed",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "dismissed" => Some(Self::Dismissed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dismissed | Self::Completed)
    }

    /// Validate a lifecycle transition. `active` may move to either
    /// terminal state; re-asserting a terminal state is an idempotent
    /// no-op; everything else is rejected.
    pub fn transition(self, to: InsightStatus) -> Result<InsightStatus, DomainError> {
        match (self, to) {
            (Self::Active, Self::Dismissed) | (Self::Active, Self::Completed) => Ok(to),
            (from, to) if from == to && from.is_terminal() => Ok(to),
            (from, to) => Err(DomainError::InvalidInsightTransition { from, to }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightPriority {
    High,
    Medium,
    Low,
}

impl InsightPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    // Pricing pipeline
    Underpriced,
    Overpriced,
    PriceTest,
    // Proactive pipeline
    ReadyToList,
    StaleListing,
    SeasonalTiming,
    IncompleteListing,
    BundleOpportunity,
    SeoEnrichment,
    // Scheduling pipeline
    ListingSchedule,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Underpriced => "underpriced",
            Self::Overpriced => "overpriced",
            Self::PriceTest => "price_test",
            Self::ReadyToList => "ready_to_list",
            Self::StaleListing => "stale_listing",
            Self::SeasonalTiming => "seasonal_timing",
            Self::IncompleteListing => "incomplete_listing",
            Self::BundleOpportunity => "bundle_opportunity",
            Self::SeoEnrichment => "seo_enrichment",
            Self::ListingSchedule => "listing_schedule",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "underpriced" => Some(Self::Underpriced),
            "overpriced" => Some(Self::Overpriced),
            "price_test" => Some(Self::PriceTest),
            "ready_to_list" => Some(Self::ReadyToList),
            "stale_listing" => Some(Self::StaleListing),
            "seasonal_timing" => Some(Self::SeasonalTiming),
            "incomplete_listing" => Some(Self::IncompleteListing),
            "bundle_opportunity" => Some(Self::BundleOpportunity),
            "seo_enrichment" => Some(Self::SeoEnrichment),
            "listing_schedule" => Some(Self::ListingSchedule),
            _ => None,
        }
    }
}

/// Market evidence attached to a price recommendation for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMarketData {
    pub avg_sold_price: Decimal,
    pub min_sold_price: Decimal,
    pub max_sold_price: Decimal,
    pub total_sales: u32,
}

/// The executable payload of an insight. Only `adjust_price` and
/// `create_bundle` have executor behavior; the rest are informational.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestedAction {
    AdjustPrice {
        current_price: Decimal,
        suggested_price: Decimal,
        min_price: Decimal,
        max_price: Decimal,
        reasoning: String,
        confidence: f64,
        market_data: Option<PriceMarketData>,
    },
    CreateBundle {
        article_ids: Vec<ArticleId>,
    },
    TestPrice {
        min_price: Decimal,
        max_price: Decimal,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub owner_id: String,
    pub cache_key: CacheKey,
    pub insight_type: InsightType,
    pub priority: InsightPriority,
    pub title: String,
    pub message: String,
    pub action_label: Option<String>,
    pub article_ids: Vec<ArticleId>,
    pub suggested_action: Option<SuggestedAction>,
    pub status: InsightStatus,
    pub created_at: DateTime<Utc>,
    pub last_refresh_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Insight {
    /// Actionable insights reference at least one article.
    pub fn is_actionable(&self) -> bool {
        !self.article_ids.is_empty() && self.suggested_action.is_some()
    }
}

/// Serving-side freshness of a cached batch.
///
/// The hard TTL (`expires_at`) governs what the store returns at all;
/// `SoftStale` batches are still readable but freshness-sensitive
/// consumers treat them as absent and regenerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchFreshness {
    Missing,
    Fresh,
    SoftStale,
}

impl BatchFreshness {
    pub fn of(batch: &[Insight], stale_after: Duration, now: DateTime<Utc>) -> Self {
        let Some(newest) = batch.iter().map(|insight| insight.last_refresh_at).max() else {
            return Self::Missing;
        };

        if now - newest > stale_after {
            Self::SoftStale
        } else {
            Self::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        BatchFreshness, CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType,
        SuggestedAction,
    };
    use crate::domain::article::ArticleId;
    use crate::errors::DomainError;

    fn sample_insight(refreshed_minutes_ago: i64) -> Insight {
        let now = Utc::now();
        let refreshed = now - Duration::minutes(refreshed_minutes_ago);
        Insight {
            id: InsightId("ins-1".to_string()),
            owner_id: "owner-1".to_string(),
            cache_key: CacheKey::pricing(),
            insight_type: InsightType::Underpriced,
            priority: InsightPriority::High,
            title: "Underpriced: Air Max".to_string(),
            message: "Similar items sell for more".to_string(),
            action_label: Some("Apply price".to_string()),
            article_ids: vec![ArticleId("art-1".to_string())],
            suggested_action: Some(SuggestedAction::TestPrice {
                min_price: Decimal::new(2200, 2),
                max_price: Decimal::new(3200, 2),
            }),
            status: InsightStatus::Active,
            created_at: refreshed,
            last_refresh_at: refreshed,
            expires_at: refreshed + Duration::minutes(30),
        }
    }

    #[test]
    fn active_transitions_to_both_terminal_states() {
        assert_eq!(
            InsightStatus::Active.transition(InsightStatus::Dismissed),
            Ok(InsightStatus::Dismissed)
        );
        assert_eq!(
            InsightStatus::Active.transition(InsightStatus::Completed),
            Ok(InsightStatus::Completed)
        );
    }

    #[test]
    fn terminal_states_never_return_to_active() {
        for terminal in [InsightStatus::Dismissed, InsightStatus::Completed] {
            assert_eq!(
                terminal.transition(InsightStatus::Active),
                Err(DomainError::InvalidInsightTransition {
                    from: terminal,
                    to: InsightStatus::Active
                })
            );
        }
    }

    #[test]
    fn repeating_a_terminal_transition_is_a_no_op() {
        assert_eq!(
            InsightStatus::Dismissed.transition(InsightStatus::Dismissed),
            Ok(InsightStatus::Dismissed)
        );
        assert_eq!(
            InsightStatus::Completed.transition(InsightStatus::Completed),
            Ok(InsightStatus::Completed)
        );
    }

    #[test]
    fn crossing_between_terminal_states_is_rejected() {
        assert!(InsightStatus::Dismissed.transition(InsightStatus::Completed).is_err());
        assert!(InsightStatus::Completed.transition(InsightStatus::Dismissed).is_err());
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        for status in [InsightStatus::Active, InsightStatus::Dismissed, InsightStatus::Completed] {
            assert_eq!(InsightStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn insight_type_round_trips_from_storage_encoding() {
        let cases = [
            InsightType::Underpriced,
            InsightType::Overpriced,
            InsightType::PriceTest,
            InsightType::ReadyToList,
            InsightType::StaleListing,
            InsightType::SeasonalTiming,
            InsightType::IncompleteListing,
            InsightType::BundleOpportunity,
            InsightType::SeoEnrichment,
            InsightType::ListingSchedule,
        ];

        for case in cases {
            assert_eq!(InsightType::parse(case.as_str()), Some(case));
        }
    }

    #[test]
    fn suggested_action_serializes_with_snake_case_tag() {
        let action = SuggestedAction::CreateBundle {
            article_ids: vec![ArticleId("art-1".to_string()), ArticleId("art-2".to_string())],
        };

        let encoded = serde_json::to_value(&action).expect("serialize action");
        assert_eq!(encoded["type"], "create_bundle");
        assert_eq!(encoded["article_ids"][1], "art-2");
    }

    #[test]
    fn batch_refreshed_31_minutes_ago_is_soft_stale() {
        let now = Utc::now();
        let batch = vec![sample_insight(31)];
        assert_eq!(
            BatchFreshness::of(&batch, Duration::minutes(30), now),
            BatchFreshness::SoftStale
        );
    }

    #[test]
    fn recently_refreshed_batch_is_fresh_and_empty_batch_is_missing() {
        let now = Utc::now();
        assert_eq!(
            BatchFreshness::of(&[sample_insight(5)], Duration::minutes(30), now),
            BatchFreshness::Fresh
        );
        assert_eq!(BatchFreshness::of(&[], Duration::minutes(30), now), BatchFreshness::Missing);
    }
}
