use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub String);

impl BundleId {
    pub fn generate() -> Self {
        Self(format!("bun-{}", Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Active,
    Sold,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Sold => "sold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "sold" => Some(Self::Sold),
            _ => None,
        }
    }
}

/// A reseller listing. The engine reads price, status, and the market
/// segment attributes; mutation goes through the action executor only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub owner_id: String,
    pub title: String,
    pub brand: Option<String>,
    pub condition: String,
    pub price: Decimal,
    pub status: ArticleStatus,
    /// Price band previously suggested for this article, used as a
    /// fallback when no market segment matches it.
    pub suggested_min_price: Option<Decimal>,
    pub suggested_max_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Container grouping articles for combined sale at a discounted
/// aggregate price. Membership rows live alongside it in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub discount_percent: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A finished marketplace sale, the raw observation behind market
/// statistics. `sold_price` and `brand` are nullable in the store and
/// rows missing either are excluded from aggregation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSale {
    pub id: String,
    pub owner_id: String,
    pub article_id: Option<ArticleId>,
    pub title: String,
    pub brand: Option<String>,
    pub condition: String,
    pub sold_price: Option<Decimal>,
    pub sold_at: DateTime<Utc>,
}
