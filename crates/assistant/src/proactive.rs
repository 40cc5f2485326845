use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use relist_core::domain::article::{Article, ArticleId, CompletedSale};
use relist_core::domain::insight::{
    CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType, SuggestedAction,
};
use relist_core::errors::{EngineError, GenerationError};

use relist_db::repositories::ArticleRepository;

use crate::llm::{payload_text, CompletionRequest, ContentClient};
use crate::prompts;

const MAX_INSIGHTS: usize = 5;

#[derive(Debug, Deserialize)]
struct RawProactiveResponse {
    insights: Vec<RawProactiveItem>,
}

#[derive(Debug, Deserialize)]
struct RawProactiveItem {
    insight_type: String,
    priority: Option<String>,
    title: String,
    message: String,
    action_label: Option<String>,
    #[serde(default)]
    article_ids: Vec<String>,
    suggested_action: Option<SuggestedAction>,
}

fn is_proactive(insight_type: InsightType) -> bool {
    matches!(
        insight_type,
        InsightType::ReadyToList
            | InsightType::StaleListing
            | InsightType::SeasonalTiming
            | InsightType::IncompleteListing
            | InsightType::BundleOpportunity
            | InsightType::SeoEnrichment
    )
}

/// Produces the general (non-pricing) recommendations: readiness,
/// staleness, seasonality, completeness, bundling, and SEO rewrites.
pub struct ProactiveInsightGenerator {
    client: Arc<dyn ContentClient>,
    articles: Arc<dyn ArticleRepository>,
}

impl ProactiveInsightGenerator {
    pub fn new(client: Arc<dyn ContentClient>, articles: Arc<dyn ArticleRepository>) -> Self {
        Self { client, articles }
    }

    pub async fn generate(
        &self,
        owner_id: &str,
        inventory: &[Article],
        history: &[CompletedSale],
    ) -> Result<Vec<Insight>, EngineError> {
        let prompt = prompts::proactive_prompt(inventory, history);
        let raw = self.client.complete(CompletionRequest::json(prompt)).await?;
        let parsed: RawProactiveResponse = serde_json::from_str(payload_text(&raw))
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;

        let now = Utc::now();
        let mut insights = Vec::new();

        for item in parsed.insights {
            let Some(insight_type) = InsightType::parse(&item.insight_type) else {
                warn!(
                    event_name = "insights.proactive.unknown_type",
                    owner_id,
                    insight_type = %item.insight_type,
                    "dropping item with unknown type"
                );
                continue;
            };
            if !is_proactive(insight_type) {
                warn!(
                    event_name = "insights.proactive.wrong_pipeline",
                    owner_id,
                    insight_type = insight_type.as_str(),
                    "dropping item belonging to another pipeline"
                );
                continue;
            }

            let priority = item
                .priority
                .as_deref()
                .and_then(InsightPriority::parse)
                .unwrap_or(InsightPriority::Medium);

            let suggested_action = match item.suggested_action {
                Some(SuggestedAction::CreateBundle { article_ids }) if article_ids.len() < 2 => {
                    warn!(
                        event_name = "insights.proactive.undersized_bundle",
                        owner_id, "dropping bundle action with fewer than two members"
                    );
                    None
                }
                other => other,
            };

            insights.push(Insight {
                id: InsightId::generate(),
                owner_id: owner_id.to_string(),
                cache_key: CacheKey::proactive(),
                insight_type,
                priority,
                title: item.title,
                message: item.message,
                action_label: item.action_label,
                article_ids: item.article_ids.into_iter().map(ArticleId).collect(),
                suggested_action,
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
                "response contained no usable recommendations".to_string(),
            )
            .into());
        }

        self.enrich_titles(owner_id, &mut insights).await;
        Ok(insights)
    }

    /// Attach resolved article titles for display. A failed lookup keeps
    /// the insight as-is rather than failing the batch.
    async fn enrich_titles(&self, owner_id: &str, insights: &mut [Insight]) {
        for insight in insights.iter_mut() {
            if insight.article_ids.is_empty() {
                continue;
            }

            match self.articles.find_by_ids(owner_id, &insight.article_ids).await {
                Ok(resolved) if !resolved.is_empty() => {
                    let titles: Vec<&str> =
                        resolved.iter().map(|article| article.title.as_str()).collect();
                    insight.message.push_str(&format!(" (Items: {})", titles.join(", ")));
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        event_name = "insights.proactive.enrichment_failed",
                        owner_id,
                        insight_id = %insight.id.0,
                        error = %error,
                        "keeping insight without resolved titles"
                    );
                }
            }
        }
    }
}
