//! Market statistics aggregation over completed sales.
//!
//! Stats are recomputed on demand from a bounded, time-windowed sample;
//! nothing is persisted. Segments below the sample threshold are
//! suppressed entirely rather than interpolated.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::article::{Article, CompletedSale};

/// A market segment: brand x category x condition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub brand: String,
    pub category: String,
    pub condition: String,
}

impl SegmentKey {
    pub fn for_sale(sale: &CompletedSale) -> Option<Self> {
        let brand = sale.brand.as_deref()?.trim();
        if brand.is_empty() {
            return None;
        }
        Some(Self {
            brand: brand.to_string(),
            category: derive_category(&sale.title),
            condition: sale.condition.trim().to_string(),
        })
    }

    pub fn for_article(article: &Article) -> Option<Self> {
        let brand = article.brand.as_deref()?.trim();
        if brand.is_empty() {
            return None;
        }
        Some(Self {
            brand: brand.to_string(),
            category: derive_category(&article.title),
            condition: article.condition.trim().to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub segment: SegmentKey,
    pub avg_sold_price: Decimal,
    pub min_sold_price: Decimal,
    pub max_sold_price: Decimal,
    pub total_sales: u32,
}

/// Sampling bounds for the aggregation window.
#[derive(Clone, Copy, Debug)]
pub struct MarketWindow {
    pub window_days: i64,
    pub max_records: usize,
    pub min_samples: usize,
}

impl Default for MarketWindow {
    fn default() -> Self {
        Self { window_days: 30, max_records: 500, min_samples: 3 }
    }
}

/// Category heuristic: first whitespace token of the title, lowercased.
/// Known to under-merge segments (no synonym or language normalization);
/// kept as-is on purpose.
pub fn derive_category(title: &str) -> String {
    title.split_whitespace().next().unwrap_or("uncategorized").to_lowercase()
}

/// Aggregate recent completed sales into per-segment price bands, most
/// observed segment first. Absence of data yields an empty vector; there
/// is no error path.
pub fn compute_market_stats(
    sales: &[CompletedSale],
    window: &MarketWindow,
    now: DateTime<Utc>,
) -> Vec<MarketStats> {
    let cutoff = now - Duration::days(window.window_days);

    let mut eligible: Vec<&CompletedSale> = sales
        .iter()
        .filter(|sale| sale.sold_at >= cutoff)
        .filter(|sale| sale.sold_price.is_some())
        .filter(|sale| sale.brand.as_deref().map(str::trim).is_some_and(|b| !b.is_empty()))
        .collect();

    // Most recent first, then cap the sample size.
    eligible.sort_by(|a, b| b.sold_at.cmp(&a.sold_at));
    eligible.truncate(window.max_records);

    let mut groups: HashMap<SegmentKey, Vec<Decimal>> = HashMap::new();
    for sale in eligible {
        let Some(key) = SegmentKey::for_sale(sale) else { continue };
        let Some(price) = sale.sold_price else { continue };
        groups.entry(key).or_default().push(price);
    }

    let mut stats: Vec<MarketStats> = groups
        .into_iter()
        .filter(|(_, prices)| prices.len() >= window.min_samples)
        .map(|(segment, prices)| {
            let total = prices.len() as u32;
            let sum: Decimal = prices.iter().sum();
            let min = prices.iter().min().copied().unwrap_or_default();
            let max = prices.iter().max().copied().unwrap_or_default();
            MarketStats {
                segment,
                avg_sold_price: (sum / Decimal::from(total)).round_dp(2),
                min_sold_price: min,
                max_sold_price: max,
                total_sales: total,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.total_sales.cmp(&a.total_sales).then_with(|| a.segment.cmp(&b.segment)));
    stats
}
