use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use relist_core::domain::article::{Article, CompletedSale};
use relist_core::domain::insight::{
    CacheKey, Insight, InsightId, InsightStatus, InsightType, SuggestedAction,
};
use relist_core::errors::{EngineError, GenerationError};
use relist_core::market::MarketStats;
use relist_core::pricing::{classify_pricing, resolve_price_band, PriceBand, PriceDirection};

use crate::llm::{payload_text, CompletionRequest, ContentClient};
use crate::prompts;

const MAX_INSIGHTS: usize = 5;

#[derive(Debug, Deserialize)]
struct RawPricingResponse {
    insights: Vec<RawPricingItem>,
}

#[derive(Debug, Deserialize)]
struct RawPricingItem {
    article_id: String,
    suggested_price: Decimal,
    reasoning: String,
    confidence: f64,
}

/// Builds price recommendations from live inventory, sale history, and
/// market statistics. The model proposes prices; direction and priority
/// are re-derived deterministically.
pub struct PricingInsightGenerator {
    client: Arc<dyn ContentClient>,
}

impl PricingInsightGenerator {
    pub fn new(client: Arc<dyn ContentClient>) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        owner_id: &str,
        inventory: &[Article],
        history: &[CompletedSale],
        stats: &[MarketStats],
    ) -> Result<Vec<Insight>, EngineError> {
        // Articles with neither a matching segment nor an own band are
        // excluded up front; a price range is never fabricated.
        let candidates: Vec<(&Article, PriceBand)> = inventory
            .iter()
            .filter_map(|article| {
                resolve_price_band(article, stats).map(|band| (article, band))
            })
            .collect();

        if candidates.is_empty() {
            debug!(
                event_name = "insights.pricing.no_candidates",
                owner_id, "no articles with a usable price band"
            );
            return Ok(Vec::new());
        }

        let prompt_candidates: Vec<(&Article, &PriceBand)> =
            candidates.iter().map(|(article, band)| (*article, band)).collect();
        let prompt = prompts::pricing_prompt(&prompt_candidates, history, stats);

        let raw = self.client.complete(CompletionRequest::json(prompt)).await?;
        let parsed: RawPricingResponse = serde_json::from_str(payload_text(&raw))
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;

        let now = Utc::now();
        let mut insights = Vec::new();

        for item in parsed.insights {
            let Some((article, band)) =
                candidates.iter().find(|(article, _)| article.id.0 == item.article_id)
            else {
                warn!(
                    event_name = "insights.pricing.unknown_article",
                    owner_id,
                    article_id = %item.article_id,
                    "dropping suggestion for article outside the candidate set"
                );
                continue;
            };

            if item.suggested_price <= Decimal::ZERO {
                warn!(
                    event_name = "insights.pricing.invalid_price",
                    owner_id,
                    article_id = %item.article_id,
                    "dropping suggestion with non-positive price"
                );
                continue;
            }

            let Some((direction, priority)) = classify_pricing(article.price, band) else {
                continue;
            };

            let (insight_type, label) = match direction {
                PriceDirection::Underpriced => (InsightType::Underpriced, "Underpriced"),
                PriceDirection::Overpriced => (InsightType::Overpriced, "Overpriced"),
            };

            let mut message = item.reasoning.clone();
            if let Some(market_data) = &band.market_data {
                message.push_str(&format!(
                    " Based on {} recent sales averaging {}.",
                    market_data.total_sales, market_data.avg_sold_price
                ));
            }

            insights.push(Insight {
                id: InsightId::generate(),
                owner_id: owner_id.to_string(),
                cache_key: CacheKey::pricing(),
                insight_type,
                priority,
                title: format!("{label}: {}", article.title),
                message,
                action_label: Some("Apply suggested price".to_string()),
                article_ids: vec![article.id.clone()],
                suggested_action: Some(SuggestedAction::AdjustPrice {
                    current_price: article.price,
                    suggested_price: item.suggested_price,
                    min_price: band.min,
                    max_price: band.max,
                    reasoning: item.reasoning,
                    confidence: item.confidence.clamp(0.0, 1.0),
                    market_data: band.market_data.clone(),
                }),
                status: InsightStatus::Active,
                created_at: now,
                last_refresh_at: now,
                expires_at: now,
            });

            if insights.len() == MAX_INSIGHTS {
                break;
            }
        }

        if insights.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "response contained no usable pricing suggestions".to_string(),
            )
            .into());
        }

        Ok(insights)
    }
}
