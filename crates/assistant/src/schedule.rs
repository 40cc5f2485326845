use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use relist_core::domain::article::{Article, ArticleId};
use relist_core::domain::insight::{
    CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType,
};
use relist_core::errors::{EngineError, GenerationError};

use crate::llm::{payload_text, CompletionRequest, ContentClient};
use crate::prompts;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Deserialize)]
struct RawScheduleResponse {
    insights: Vec<RawScheduleItem>,
}

#[derive(Debug, Deserialize)]
struct RawScheduleItem {
    priority: Option<String>,
    title: String,
    message: String,
    #[serde(default)]
    article_ids: Vec<String>,
}

/// Produces listing-timing suggestions: when specific articles should be
/// (re)listed for the best visibility. Suggestions are informational;
/// they count as pending while active and carry no executable action.
pub struct ScheduleSuggestionGenerator {
    client: Arc<dyn ContentClient>,
}

impl ScheduleSuggestionGenerator {
    pub fn new(client: Arc<dyn ContentClient>) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        owner_id: &str,
        inventory: &[Article],
    ) -> Result<Vec<Insight>, EngineError> {
        if inventory.is_empty() {
            debug!(
                event_name = "insights.schedule.empty_inventory",
                owner_id, "nothing to schedule"
            );
            return Ok(Vec::new());
        }

        let prompt = prompts::schedule_prompt(inventory);
        let raw = self.client.complete(CompletionRequest::json(prompt)).await?;
        let parsed: RawScheduleResponse = serde_json::from_str(payload_text(&raw))
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;

        if parsed.insights.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "response contained no scheduling suggestions".to_string(),
            )
            .into());
        }

        let now = Utc::now();
        let insights = parsed
            .insights
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|item| Insight {
                id: InsightId::generate(),
                owner_id: owner_id.to_string(),
                cache_key: CacheKey::schedule(),
                insight_type: InsightType::ListingSchedule,
                priority: item
                    .priority
                    .as_deref()
                    .and_then(InsightPriority::parse)
                    .unwrap_or(InsightPriority::Medium),
                title: item.title,
                message: item.message,
                action_label: None,
                article_ids: item.article_ids.into_iter().map(ArticleId).collect(),
                suggested_action: None,
                status: InsightStatus::Active,
                created_at: now,
                last_refresh_at: now,
                expires_at: now,
            })
            .collect();

        Ok(insights)
    }
}
