use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use relist_core::domain::article::{Article, Bundle, BundleId};
use relist_core::domain::insight::{Insight, InsightStatus, SuggestedAction};
use relist_core::errors::{DomainError, EngineError, GenerationError};

use relist_db::repositories::{
    ArticleRepository, BundleRepository, InsightStore,
};

use crate::llm::{payload_text, CompletionRequest, ContentClient};
use crate::prompts;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    PricesAdjusted { article_count: usize },
    BundleCreated { bundle_id: BundleId },
}

#[derive(Debug, Deserialize)]
struct RawBundleCopy {
    title: String,
    description: String,
}

/// Ordered undo list for the multi-step bundle write. Every step that
/// leaves state behind pushes its compensation before the next step
/// runs; on failure the list unwinds in reverse.
struct UndoList {
    steps: Vec<Compensation>,
}

enum Compensation {
    DeleteBundle(BundleId),
}

impl UndoList {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    async fn unwind(self, bundles: &dyn BundleRepository) {
        for step in self.steps.into_iter().rev() {
            match step {
                Compensation::DeleteBundle(bundle_id) => {
                    if let Err(error) = bundles.delete_bundle(&bundle_id).await {
                        // An orphan container is exactly what the
                        // compensation exists to prevent; log loudly.
                        warn!(
                            event_name = "insights.execute.compensation_failed",
                            bundle_id = %bundle_id.0,
                            error = %error,
                            "failed to delete bundle container during rollback"
                        );
                    }
                }
            }
        }
    }
}

/// Applies the side effects of an accepted recommendation and moves its
/// lifecycle state. A failed execution leaves the insight `active`.
pub struct ActionExecutor {
    insights: Arc<dyn InsightStore>,
    articles: Arc<dyn ArticleRepository>,
    bundles: Arc<dyn BundleRepository>,
    client: Arc<dyn ContentClient>,
    /// Fractional discount applied to the summed member price.
    bundle_discount: Decimal,
}

impl ActionExecutor {
    pub fn new(
        insights: Arc<dyn InsightStore>,
        articles: Arc<dyn ArticleRepository>,
        bundles: Arc<dyn BundleRepository>,
        client: Arc<dyn ContentClient>,
        bundle_discount: Decimal,
    ) -> Self {
        Self { insights, articles, bundles, client, bundle_discount }
    }

    pub async fn execute(&self, insight: &Insight) -> Result<ActionOutcome, EngineError> {
        // Completion is only reachable from `active`; terminal insights
        // are rejected before any side effect.
        if insight.status != InsightStatus::Active {
            return Err(DomainError::InvalidInsightTransition {
                from: insight.status,
                to: InsightStatus::Completed,
            }
            .into());
        }

        let outcome = match &insight.suggested_action {
            Some(SuggestedAction::AdjustPrice { suggested_price, .. }) => {
                self.apply_price(insight, *suggested_price).await?
            }
            Some(SuggestedAction::CreateBundle { article_ids }) => {
                let ids = article_ids.clone();
                self.create_bundle(insight, &ids).await?
            }
            Some(_) => {
                return Err(EngineError::validation(
                    "this recommendation is informational and has no executable action",
                ))
            }
            None => {
                return Err(EngineError::validation(
                    "this recommendation has no suggested action",
                ))
            }
        };

        self.insights
            .set_status(&insight.id, InsightStatus::Completed)
            .await
            .map_err(EngineError::storage)?;

        info!(
            event_name = "insights.execute.completed",
            owner_id = %insight.owner_id,
            insight_id = %insight.id.0,
            "recommendation applied"
        );
        Ok(outcome)
    }

    /// Best-effort batch: items written before a failure stay written,
    /// and the single failure is surfaced with its position.
    async fn apply_price(
        &self,
        insight: &Insight,
        suggested_price: Decimal,
    ) -> Result<ActionOutcome, EngineError> {
        if insight.article_ids.is_empty() {
            return Err(EngineError::validation("price adjustment references no articles"));
        }
        if suggested_price <= Decimal::ZERO {
            return Err(EngineError::validation("suggested price must be positive"));
        }

        let attempted = insight.article_ids.len();
        for (index, article_id) in insight.article_ids.iter().enumerate() {
            if let Err(error) = self.articles.update_price(article_id, suggested_price).await {
                return Err(EngineError::PartialApply {
                    applied: index,
                    attempted,
                    failed_article: article_id.0.clone(),
                    reason: error.to_string(),
                });
            }
        }

        Ok(ActionOutcome::PricesAdjusted { article_count: attempted })
    }

    async fn create_bundle(
        &self,
        insight: &Insight,
        member_ids: &[relist_core::domain::article::ArticleId],
    ) -> Result<ActionOutcome, EngineError> {
        if member_ids.len() < 2 {
            return Err(EngineError::validation("a bundle needs at least two articles"));
        }

        let members = self
            .articles
            .find_by_ids(&insight.owner_id, member_ids)
            .await
            .map_err(EngineError::storage)?;
        if members.len() != member_ids.len() {
            return Err(EngineError::validation(
                "bundle references articles that no longer exist",
            ));
        }

        let aggregate: Decimal = members.iter().map(|article| article.price).sum();
        let price = (aggregate * (Decimal::ONE - self.bundle_discount)).round_dp(2);

        let copy = self.generate_copy(&members).await?;

        let bundle = Bundle {
            id: BundleId::generate(),
            owner_id: insight.owner_id.clone(),
            title: copy.title,
            description: copy.description,
            price,
            discount_percent: (self.bundle_discount * Decimal::ONE_HUNDRED).round_dp(0),
            created_at: Utc::now(),
        };
        let bundle_id = bundle.id.clone();

        let mut undo = UndoList::new();

        self.bundles.insert_bundle(bundle).await.map_err(EngineError::storage)?;
        undo.push(Compensation::DeleteBundle(bundle_id.clone()));

        if let Err(error) = self.bundles.insert_members(&bundle_id, member_ids).await {
            undo.unwind(self.bundles.as_ref()).await;
            return Err(EngineError::storage(error));
        }

        Ok(ActionOutcome::BundleCreated { bundle_id })
    }

    async fn generate_copy(&self, members: &[Article]) -> Result<RawBundleCopy, EngineError> {
        let prompt = prompts::bundle_copy_prompt(members);
        let raw = self.client.complete(CompletionRequest::json(prompt)).await?;

        let copy: RawBundleCopy = serde_json::from_str(payload_text(&raw))
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;

        if copy.title.trim().is_empty() {
            return Err(GenerationError::MalformedResponse(
                "bundle copy is missing a title".to_string(),
            )
            .into());
        }

        Ok(copy)
    }
}
