//! Deterministic pricing policy.
//!
//! The generative service proposes prices and reasoning; priority and
//! direction are always re-derived here so the advice surface stays
//! consistent regardless of what the model returns.

use rust_decimal::Decimal;

use crate::domain::article::Article;
use crate::domain::insight::{InsightPriority, PriceMarketData};
use crate::market::{MarketStats, SegmentKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandSource {
    /// Segment-level market statistics matched this article.
    Segment,
    /// No segment matched; the article's own previously suggested band
    /// was used instead.
    OwnSuggestion,
}

/// Reference price band for a single article.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceBand {
    pub avg: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub source: BandSource,
    pub market_data: Option<PriceMarketData>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceDirection {
    Underpriced,
    Overpriced,
}

/// Resolve the price band for an article: segment stats first, the
/// article's own suggested min/max band second. Articles with neither
/// get no band and are excluded from pricing consideration — a range is
/// never fabricated.
pub fn resolve_price_band(article: &Article, stats: &[MarketStats]) -> Option<PriceBand> {
    if let Some(segment) = SegmentKey::for_article(article) {
        if let Some(found) = stats.iter().find(|entry| entry.segment == segment) {
            return Some(PriceBand {
                avg: found.avg_sold_price,
                min: found.min_sold_price,
                max: found.max_sold_price,
                source: BandSource::Segment,
                market_data: Some(PriceMarketData {
                    avg_sold_price: found.avg_sold_price,
                    min_sold_price: found.min_sold_price,
                    max_sold_price: found.max_sold_price,
                    total_sales: found.total_sales,
                }),
            });
        }
    }

    match (article.suggested_min_price, article.suggested_max_price) {
        (Some(min), Some(max)) if min > Decimal::ZERO && max >= min => Some(PriceBand {
            avg: ((min + max) / Decimal::TWO).round_dp(2),
            min,
            max,
            source: BandSource::OwnSuggestion,
            market_data: None,
        }),
        _ => None,
    }
}

/// Classify the gap between the current price and the band average.
///
/// Priority thresholds: gap >= 30% of the average or an absolute
/// opportunity above 10 currency units is high; 15-30% or 5-10 units is
/// medium; anything smaller is low. A zero gap carries no opportunity
/// and yields no classification.
pub fn classify_pricing(
    current_price: Decimal,
    band: &PriceBand,
) -> Option<(PriceDirection, InsightPriority)> {
    if band.avg <= Decimal::ZERO {
        return None;
    }

    let gap = band.avg - current_price;
    if gap.is_zero() {
        return None;
    }

    let direction =
        if gap > Decimal::ZERO { PriceDirection::Underpriced } else { PriceDirection::Overpriced };

    let opportunity = gap.abs();
    let gap_percent = opportunity * Decimal::ONE_HUNDRED / band.avg;

    let priority = if gap_percent >= Decimal::from(30) || opportunity > Decimal::TEN {
        InsightPriority::High
    } else if gap_percent >= Decimal::from(15) || opportunity >= Decimal::from(5) {
        InsightPriority::Medium
    } else {
        InsightPriority::Low
    };

    Some((direction, priority))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{classify_pricing, resolve_price_band, BandSource, PriceDirection};
    use crate::domain::article::{Article, ArticleId, ArticleStatus};
    use crate::domain::insight::InsightPriority;
    use crate::market::{MarketStats, SegmentKey};

    fn article(
        title: &str,
        brand: Option<&str>,
        condition: &str,
        price: i64,
        band: Option<(i64, i64)>,
    ) -> Article {
        let now = Utc::now();
        Article {
            id: ArticleId("art-1".to_string()),
            owner_id: "owner-1".to_string(),
            title: title.to_string(),
            brand: brand.map(str::to_string),
            condition: condition.to_string(),
            price: Decimal::new(price * 100, 2),
            status: ArticleStatus::Active,
            suggested_min_price: band.map(|(min, _)| Decimal::new(min * 100, 2)),
            suggested_max_price: band.map(|(_, max)| Decimal::new(max * 100, 2)),
            created_at: now,
            updated_at: now,
        }
    }

    fn nike_air_stats() -> Vec<MarketStats> {
        vec![MarketStats {
            segment: SegmentKey {
                brand: "Nike".to_string(),
                category: "air".to_string(),
                condition: "very_good".to_string(),
            },
            avg_sold_price: Decimal::new(2700, 2),
            min_sold_price: Decimal::new(2200, 2),
            max_sold_price: Decimal::new(3200, 2),
            total_sales: 23,
        }]
    }

    #[test]
    fn article_well_below_segment_average_is_underpriced_high() {
        let stats = nike_air_stats();
        let item = article("Air Max 90", Some("Nike"), "very_good", 15, None);

        let band = resolve_price_band(&item, &stats).expect("segment band");
        assert_eq!(band.source, BandSource::Segment);
        assert_eq!(band.market_data.as_ref().map(|data| data.total_sales), Some(23));

        // 44% below a 27 average, 12 units of opportunity.
        let (direction, priority) = classify_pricing(item.price, &band).expect("classification");
        assert_eq!(direction, PriceDirection::Underpriced);
        assert_eq!(priority, InsightPriority::High);
    }

    #[test]
    fn own_band_is_used_when_no_segment_matches() {
        let item = article("Hoodie grey", Some("Carhartt"), "good", 20, Some((30, 50)));

        let band = resolve_price_band(&item, &nike_air_stats()).expect("fallback band");
        assert_eq!(band.source, BandSource::OwnSuggestion);
        assert_eq!(band.avg, Decimal::new(4000, 2));
        assert!(band.market_data.is_none());
    }

    #[test]
    fn article_without_segment_or_own_band_is_excluded() {
        let item = article("Hoodie grey", None, "good", 20, None);
        assert!(resolve_price_band(&item, &nike_air_stats()).is_none());
    }

    #[test]
    fn moderate_gap_classifies_medium() {
        let stats = nike_air_stats();
        // 21.00 against an average of 27.00: 22% gap, 6 units.
        let item = article("Air Max 90", Some("Nike"), "very_good", 21, None);

        let band = resolve_price_band(&item, &stats).expect("segment band");
        let (direction, priority) = classify_pricing(item.price, &band).expect("classification");
        assert_eq!(direction, PriceDirection::Underpriced);
        assert_eq!(priority, InsightPriority::Medium);
    }

    #[test]
    fn small_gap_classifies_low_and_direction_follows_sign() {
        let stats = nike_air_stats();
        let overpriced = article("Air Max 90", Some("Nike"), "very_good", 28, None);

        let band = resolve_price_band(&overpriced, &stats).expect("segment band");
        let (direction, priority) =
            classify_pricing(overpriced.price, &band).expect("classification");
        assert_eq!(direction, PriceDirection::Overpriced);
        assert_eq!(priority, InsightPriority::Low);
    }

    #[test]
    fn zero_gap_yields_no_classification() {
        let stats = nike_air_stats();
        let item = article("Air Max 90", Some("Nike"), "very_good", 27, None);

        let band = resolve_price_band(&item, &stats).expect("segment band");
        assert!(classify_pricing(item.price, &band).is_none());
    }
}
