use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use relist_core::config::InsightsConfig;
use relist_core::domain::insight::{BatchFreshness, CacheKey, Insight, InsightId, InsightStatus};
use relist_core::errors::EngineError;
use relist_core::market::{compute_market_stats, MarketWindow};

use relist_db::repositories::{
    ArticleRepository, BundleRepository, InsightStore, SaleRepository,
};

use crate::executor::{ActionExecutor, ActionOutcome};
use crate::llm::ContentClient;
use crate::pricing::PricingInsightGenerator;
use crate::proactive::ProactiveInsightGenerator;
use crate::schedule::ScheduleSuggestionGenerator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pipeline {
    General,
    Pricing,
    Schedule,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [Pipeline::General, Pipeline::Pricing, Pipeline::Schedule];

    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::General => CacheKey::proactive(),
            Self::Pricing => CacheKey::pricing(),
            Self::Schedule => CacheKey::schedule(),
        }
    }

    fn from_cache_key(key: &CacheKey) -> Option<Self> {
        Self::ALL.into_iter().find(|pipeline| &pipeline.cache_key() == key)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Pricing => "pricing",
            Self::Schedule => "schedule",
        }
    }
}

#[derive(Default)]
struct PipelineState {
    in_flight: bool,
    insights: Vec<Insight>,
    last_error: Option<String>,
}

#[derive(Default)]
struct HubState {
    general: PipelineState,
    pricing: PipelineState,
    schedule: PipelineState,
    /// Titles hidden client-side before the persisted dismissal is
    /// visible again; reconciled on every full refresh.
    local_dismissed: HashSet<String>,
}

impl HubState {
    fn pipeline_mut(&mut self, pipeline: Pipeline) -> &mut PipelineState {
        match pipeline {
            Pipeline::General => &mut self.general,
            Pipeline::Pricing => &mut self.pricing,
            Pipeline::Schedule => &mut self.schedule,
        }
    }

    fn pipeline(&self, pipeline: Pipeline) -> &PipelineState {
        match pipeline {
            Pipeline::General => &self.general,
            Pipeline::Pricing => &self.pricing,
            Pipeline::Schedule => &self.schedule,
        }
    }
}

/// Per-pipeline in-flight marker with guaranteed release: the flag is
/// cleared when the guard drops, on success and failure alike.
struct InFlightGuard {
    state: Arc<Mutex<HubState>>,
    pipeline: Pipeline,
}

impl InFlightGuard {
    fn begin(state: Arc<Mutex<HubState>>, pipeline: Pipeline) -> Option<Self> {
        {
            let mut locked = state.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = locked.pipeline_mut(pipeline);
            if slot.in_flight {
                return None;
            }
            slot.in_flight = true;
        }
        Some(Self { state, pipeline })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut locked = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        locked.pipeline_mut(self.pipeline).in_flight = false;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubCounts {
    pub general: usize,
    pub pricing: usize,
    pub schedule: usize,
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct HubSnapshot {
    pub general: Vec<Insight>,
    pub pricing: Vec<Insight>,
    pub schedule: Vec<Insight>,
    pub counts: HubCounts,
    pub errors: Vec<(Pipeline, String)>,
}

/// Runs the three recommendation pipelines concurrently against one
/// owner's inventory and merges their results into a single badge count.
pub struct InsightHub {
    owner_id: String,
    store: Arc<dyn InsightStore>,
    articles: Arc<dyn ArticleRepository>,
    sales: Arc<dyn SaleRepository>,
    pricing: PricingInsightGenerator,
    proactive: ProactiveInsightGenerator,
    schedule: ScheduleSuggestionGenerator,
    executor: ActionExecutor,
    config: InsightsConfig,
    state: Arc<Mutex<HubState>>,
}

impl InsightHub {
    pub fn new(
        owner_id: impl Into<String>,
        store: Arc<dyn InsightStore>,
        articles: Arc<dyn ArticleRepository>,
        sales: Arc<dyn SaleRepository>,
        bundles: Arc<dyn BundleRepository>,
        client: Arc<dyn ContentClient>,
        config: InsightsConfig,
    ) -> Self {
        let executor = ActionExecutor::new(
            store.clone(),
            articles.clone(),
            bundles,
            client.clone(),
            config.bundle_discount(),
        );

        Self {
            owner_id: owner_id.into(),
            store,
            articles: articles.clone(),
            sales,
            pricing: PricingInsightGenerator::new(client.clone()),
            proactive: ProactiveInsightGenerator::new(client.clone(), articles),
            schedule: ScheduleSuggestionGenerator::new(client),
            executor,
            config,
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Load all three pipelines concurrently. A pipeline already in
    /// flight is skipped; a failed pipeline keeps its previous result
    /// set and records one user-facing message.
    pub async fn refresh(&self, force_bypass_cache: bool) -> HubSnapshot {
        tokio::join!(
            self.run_pipeline(Pipeline::General, force_bypass_cache),
            self.run_pipeline(Pipeline::Pricing, force_bypass_cache),
            self.run_pipeline(Pipeline::Schedule, force_bypass_cache),
        );

        self.reconcile_local_dismissals();
        self.snapshot()
    }

    /// Dismiss one insight: persisted terminal transition plus an
    /// immediate client-side hide keyed by title. Repeats are no-ops.
    pub async fn dismiss(&self, id: &InsightId) -> Result<(), EngineError> {
        self.store
            .set_status(id, InsightStatus::Dismissed)
            .await
            .map_err(EngineError::storage)?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dismissed_title = None;
        for pipeline in Pipeline::ALL {
            let slot = state.pipeline_mut(pipeline);
            if let Some(position) = slot.insights.iter().position(|insight| &insight.id == id) {
                dismissed_title = Some(slot.insights.remove(position).title);
                break;
            }
        }
        if let Some(title) = dismissed_title {
            state.local_dismissed.insert(title);
        }

        Ok(())
    }

    /// Apply an accepted recommendation. On success the insight leaves
    /// the visible set; a bundle creation additionally schedules a
    /// delayed regeneration so the next view reflects the new inventory.
    pub async fn execute(
        self: &Arc<Self>,
        insight: &Insight,
    ) -> Result<ActionOutcome, EngineError> {
        let outcome = self.executor.execute(insight).await?;

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pipeline) = Pipeline::from_cache_key(&insight.cache_key) {
                state.pipeline_mut(pipeline).insights.retain(|entry| entry.id != insight.id);
            }
        }

        if matches!(outcome, ActionOutcome::BundleCreated { .. }) {
            self.schedule_regeneration();
        }

        Ok(outcome)
    }

    pub fn counts(&self) -> HubCounts {
        self.snapshot().counts
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let general: Vec<Insight> = state
            .general
            .insights
            .iter()
            .filter(|insight| !state.local_dismissed.contains(&insight.title))
            .cloned()
            .collect();
        let pricing = state.pricing.insights.clone();
        let schedule = state.schedule.insights.clone();

        let counts = HubCounts {
            general: general.len(),
            pricing: pricing.len(),
            schedule: schedule.len(),
            total: general.len() + pricing.len() + schedule.len(),
        };

        let errors = Pipeline::ALL
            .into_iter()
            .filter_map(|pipeline| {
                state.pipeline(pipeline).last_error.clone().map(|message| (pipeline, message))
            })
            .collect();

        HubSnapshot { general, pricing, schedule, counts, errors }
    }

    async fn run_pipeline(&self, pipeline: Pipeline, force: bool) {
        let Some(_guard) = InFlightGuard::begin(self.state.clone(), pipeline) else {
            debug!(
                event_name = "insights.hub.load_skipped",
                owner_id = %self.owner_id,
                pipeline = pipeline.as_str(),
                "load already in flight"
            );
            return;
        };

        match self.load_or_generate(pipeline, force).await {
            Ok(batch) => {
                info!(
                    event_name = "insights.hub.pipeline_loaded",
                    owner_id = %self.owner_id,
                    pipeline = pipeline.as_str(),
                    count = batch.len(),
                    "pipeline result set updated"
                );
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                let slot = state.pipeline_mut(pipeline);
                slot.insights = batch;
                slot.last_error = None;
            }
            Err(error) => {
                warn!(
                    event_name = "insights.hub.pipeline_failed",
                    owner_id = %self.owner_id,
                    pipeline = pipeline.as_str(),
                    error = %error,
                    "pipeline load failed; keeping previous result set"
                );
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.pipeline_mut(pipeline).last_error =
                    Some(error.user_message().to_string());
            }
        }
    }

    async fn load_or_generate(
        &self,
        pipeline: Pipeline,
        force: bool,
    ) -> Result<Vec<Insight>, EngineError> {
        let key = pipeline.cache_key();

        if !force {
            let cached = self
                .store
                .load_active(&self.owner_id, &key)
                .await
                .map_err(EngineError::storage)?;
            let freshness = BatchFreshness::of(
                &cached,
                Duration::minutes(self.config.stale_after_minutes),
                Utc::now(),
            );
            if freshness == BatchFreshness::Fresh {
                debug!(
                    event_name = "insights.hub.cache_hit",
                    owner_id = %self.owner_id,
                    pipeline = pipeline.as_str(),
                    count = cached.len(),
                    "serving cached batch"
                );
                return Ok(cached);
            }
        }

        let generated = self.generate(pipeline).await?;
        self.store
            .replace(&self.owner_id, &key, generated)
            .await
            .map_err(EngineError::storage)
    }

    async fn generate(&self, pipeline: Pipeline) -> Result<Vec<Insight>, EngineError> {
        let inventory = self
            .articles
            .list_active(&self.owner_id)
            .await
            .map_err(EngineError::storage)?;

        match pipeline {
            Pipeline::General => {
                let history = self.recent_sales().await?;
                self.proactive.generate(&self.owner_id, &inventory, &history).await
            }
            Pipeline::Pricing => {
                let history = self.recent_sales().await?;
                let window = MarketWindow {
                    window_days: self.config.sales_window_days,
                    max_records: self.config.max_sales_records as usize,
                    min_samples: self.config.min_segment_samples as usize,
                };
                let stats = compute_market_stats(&history, &window, Utc::now());
                self.pricing.generate(&self.owner_id, &inventory, &history, &stats).await
            }
            Pipeline::Schedule => self.schedule.generate(&self.owner_id, &inventory).await,
        }
    }

    async fn recent_sales(
        &self,
    ) -> Result<Vec<relist_core::domain::article::CompletedSale>, EngineError> {
        self.sales
            .recent_completed(
                &self.owner_id,
                self.config.sales_window_days,
                self.config.max_sales_records,
            )
            .await
            .map_err(EngineError::storage)
    }

    /// Drop overlay entries whose titles no longer appear in any active
    /// result set; the persisted dismissal has caught up. Running this
    /// repeatedly is a no-op.
    fn reconcile_local_dismissals(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let active_titles: HashSet<String> = Pipeline::ALL
            .into_iter()
            .flat_map(|pipeline| {
                state.pipeline(pipeline).insights.iter().map(|insight| insight.title.clone())
            })
            .collect();

        state.local_dismissed.retain(|title| active_titles.contains(title));
    }

    fn schedule_regeneration(self: &Arc<Self>) {
        let hub = Arc::clone(self);
        let delay = std::time::Duration::from_millis(self.config.regen_delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(
                event_name = "insights.hub.delayed_regeneration",
                owner_id = %hub.owner_id,
                "refreshing pipelines after applied action"
            );
            hub.refresh(true).await;
        });
    }
}
