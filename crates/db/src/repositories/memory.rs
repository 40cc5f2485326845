use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use relist_core::domain::article::{Article, ArticleId, Bundle, BundleId, CompletedSale};
use relist_core::domain::insight::{CacheKey, Insight, InsightId, InsightStatus};

use super::{
    ArticleRepository, BundleRepository, InsightStore, RepositoryError, SaleRepository,
    SetStatusOutcome,
};

/// In-memory insight store with the same lifecycle semantics as the SQL
/// implementation. Used by unit tests and the smoke pipeline.
pub struct InMemoryInsightStore {
    rows: RwLock<HashMap<String, Insight>>,
    ttl: Duration,
}

impl Default for InMemoryInsightStore {
    fn default() -> Self {
        Self { rows: RwLock::new(HashMap::new()), ttl: Duration::minutes(30) }
    }
}

impl InMemoryInsightStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { rows: RwLock::new(HashMap::new()), ttl }
    }

    /// Test hook: shift one record's refresh/expiry stamps backwards.
    pub async fn rewind(&self, id: &InsightId, by: Duration) {
        let mut rows = self.rows.write().await;
        if let Some(insight) = rows.get_mut(&id.0) {
            insight.last_refresh_at -= by;
            insight.expires_at -= by;
        }
    }
}

#[async_trait::async_trait]
impl InsightStore for InMemoryInsightStore {
    async fn load_active(
        &self,
        owner_id: &str,
        cache_key: &CacheKey,
    ) -> Result<Vec<Insight>, RepositoryError> {
        let now = Utc::now();
        let rows = self.rows.read().await;

        let mut batch: Vec<Insight> = rows
            .values()
            .filter(|insight| insight.owner_id == owner_id && &insight.cache_key == cache_key)
            .filter(|insight| insight.status == InsightStatus::Active && insight.expires_at > now)
            .cloned()
            .collect();

        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(batch)
    }

    async fn replace(
        &self,
        owner_id: &str,
        cache_key: &CacheKey,
        batch: Vec<Insight>,
    ) -> Result<Vec<Insight>, RepositoryError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let stamped: Vec<Insight> = batch
            .into_iter()
            .map(|insight| Insight {
                owner_id: owner_id.to_string(),
                cache_key: cache_key.clone(),
                last_refresh_at: now,
                expires_at,
                ..insight
            })
            .collect();

        let mut rows = self.rows.write().await;
        rows.retain(|_, insight| {
            !(insight.owner_id == owner_id && &insight.cache_key == cache_key)
        });
        for insight in &stamped {
            rows.insert(insight.id.0.clone(), insight.clone());
        }

        Ok(stamped)
    }

    async fn set_status(
        &self,
        id: &InsightId,
        status: InsightStatus,
    ) -> Result<SetStatusOutcome, RepositoryError> {
        if !status.is_terminal() {
            return Err(RepositoryError::InvalidTransition(format!(
                "insights cannot be moved back to `{}`",
                status.as_str()
            )));
        }

        let mut rows = self.rows.write().await;
        match rows.get_mut(&id.0) {
            Some(insight) if insight.status == InsightStatus::Active => {
                insight.status = status;
                Ok(SetStatusOutcome::Applied)
            }
            _ => Ok(SetStatusOutcome::NoOp),
        }
    }
}

/// In-memory article repository with an injectable per-article write
/// failure, used to exercise partial-apply behavior.
#[derive(Default)]
pub struct InMemoryArticleRepository {
    articles: RwLock<HashMap<String, Article>>,
    failing_price_updates: RwLock<HashSet<String>>,
}

impl InMemoryArticleRepository {
    pub async fn fail_price_update_for(&self, id: &ArticleId) {
        self.failing_price_updates.write().await.insert(id.0.clone());
    }
}

#[async_trait::async_trait]
impl ArticleRepository for InMemoryArticleRepository {
    async fn list_active(&self, owner_id: &str) -> Result<Vec<Article>, RepositoryError> {
        let articles = self.articles.read().await;
        let mut active: Vec<Article> = articles
            .values()
            .filter(|article| article.owner_id == owner_id)
            .filter(|article| {
                article.status == relist_core::domain::article::ArticleStatus::Active
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(active)
    }

    async fn find_by_ids(
        &self,
        owner_id: &str,
        ids: &[ArticleId],
    ) -> Result<Vec<Article>, RepositoryError> {
        let articles = self.articles.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| articles.get(&id.0))
            .filter(|article| article.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_price(&self, id: &ArticleId, price: Decimal) -> Result<(), RepositoryError> {
        if self.failing_price_updates.read().await.contains(&id.0) {
            return Err(RepositoryError::Decode(format!(
                "injected write failure for article `{}`",
                id.0
            )));
        }

        let mut articles = self.articles.write().await;
        let article = articles
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::Decode(format!("article `{}` does not exist", id.0)))?;
        article.price = price;
        article.updated_at = Utc::now();
        Ok(())
    }

    async fn save(&self, article: Article) -> Result<(), RepositoryError> {
        let mut articles = self.articles.write().await;
        articles.insert(article.id.0.clone(), article);
        Ok(())
    }
}

/// In-memory bundle repository with an injectable membership-insert
/// failure, used to exercise the compensating delete.
#[derive(Default)]
pub struct InMemoryBundleRepository {
    bundles: RwLock<HashMap<String, Bundle>>,
    members: RwLock<HashMap<String, Vec<ArticleId>>>,
    fail_member_insert: AtomicBool,
}

impl InMemoryBundleRepository {
    pub fn fail_next_member_insert(&self) {
        self.fail_member_insert.store(true, Ordering::SeqCst);
    }

    pub async fn bundle_count(&self) -> usize {
        self.bundles.read().await.len()
    }
}

#[async_trait::async_trait]
impl BundleRepository for InMemoryBundleRepository {
    async fn insert_bundle(&self, bundle: Bundle) -> Result<(), RepositoryError> {
        let mut bundles = self.bundles.write().await;
        bundles.insert(bundle.id.0.clone(), bundle);
        Ok(())
    }

    async fn insert_members(
        &self,
        bundle_id: &BundleId,
        article_ids: &[ArticleId],
    ) -> Result<(), RepositoryError> {
        if self.fail_member_insert.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Decode(
                "injected failure inserting bundle members".to_string(),
            ));
        }

        let mut members = self.members.write().await;
        members.insert(bundle_id.0.clone(), article_ids.to_vec());
        Ok(())
    }

    async fn delete_bundle(&self, bundle_id: &BundleId) -> Result<(), RepositoryError> {
        self.bundles.write().await.remove(&bundle_id.0);
        self.members.write().await.remove(&bundle_id.0);
        Ok(())
    }

    async fn find_bundle(&self, bundle_id: &BundleId) -> Result<Option<Bundle>, RepositoryError> {
        Ok(self.bundles.read().await.get(&bundle_id.0).cloned())
    }

    async fn member_count(&self, bundle_id: &BundleId) -> Result<u32, RepositoryError> {
        Ok(self.members.read().await.get(&bundle_id.0).map(|ids| ids.len() as u32).unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InMemorySaleRepository {
    sales: RwLock<Vec<CompletedSale>>,
}

#[async_trait::async_trait]
impl SaleRepository for InMemorySaleRepository {
    async fn recent_completed(
        &self,
        owner_id: &str,
        window_days: i64,
        limit: u32,
    ) -> Result<Vec<CompletedSale>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let sales = self.sales.read().await;

        let mut recent: Vec<CompletedSale> = sales
            .iter()
            .filter(|sale| sale.owner_id == owner_id && sale.sold_at >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.sold_at.cmp(&a.sold_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }

    async fn save(&self, sale: CompletedSale) -> Result<(), RepositoryError> {
        self.sales.write().await.push(sale);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use relist_core::domain::article::{Article, ArticleId, ArticleStatus};
    use relist_core::domain::insight::{
        CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType,
    };

    use crate::repositories::{
        ArticleRepository, InMemoryArticleRepository, InMemoryInsightStore, InsightStore,
        SetStatusOutcome,
    };

    fn sample_insight(id: &str) -> Insight {
        let now = Utc::now();
        Insight {
            id: InsightId(id.to_string()),
            owner_id: "owner-1".to_string(),
            cache_key: CacheKey::pricing(),
            insight_type: InsightType::Underpriced,
            priority: InsightPriority::Medium,
            title: format!("Insight {id}"),
            message: "message".to_string(),
            action_label: None,
            article_ids: vec![ArticleId("art-1".to_string())],
            suggested_action: None,
            status: InsightStatus::Active,
            created_at: now,
            last_refresh_at: now,
            expires_at: now,
        }
    }

    #[tokio::test]
    async fn replace_swaps_whole_batches() {
        let store = InMemoryInsightStore::default();
        let key = CacheKey::pricing();

        store
            .replace("owner-1", &key, vec![sample_insight("a"), sample_insight("b")])
            .await
            .expect("first replace");
        store.replace("owner-1", &key, vec![sample_insight("c")]).await.expect("second replace");

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.0, "c");
    }

    #[tokio::test]
    async fn rewound_batch_expires() {
        let store = InMemoryInsightStore::default();
        let key = CacheKey::pricing();

        store.replace("owner-1", &key, vec![sample_insight("a")]).await.expect("replace");
        store.rewind(&InsightId("a".to_string()), Duration::minutes(31)).await;

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn set_status_matches_sql_semantics() {
        let store = InMemoryInsightStore::default();
        let key = CacheKey::pricing();
        store.replace("owner-1", &key, vec![sample_insight("a")]).await.expect("replace");
        let id = InsightId("a".to_string());

        assert_eq!(
            store.set_status(&id, InsightStatus::Completed).await.expect("complete"),
            SetStatusOutcome::Applied
        );
        assert_eq!(
            store.set_status(&id, InsightStatus::Completed).await.expect("repeat"),
            SetStatusOutcome::NoOp
        );
        assert!(store.set_status(&id, InsightStatus::Active).await.is_err());
    }

    #[tokio::test]
    async fn injected_price_failure_only_hits_marked_article() {
        let repo = InMemoryArticleRepository::default();
        let now = Utc::now();
        for id in ["art-1", "art-2"] {
            repo.save(Article {
                id: ArticleId(id.to_string()),
                owner_id: "owner-1".to_string(),
                title: "Tee".to_string(),
                brand: None,
                condition: "good".to_string(),
                price: Decimal::TEN,
                status: ArticleStatus::Active,
                suggested_min_price: None,
                suggested_max_price: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save");
        }

        repo.fail_price_update_for(&ArticleId("art-2".to_string())).await;

        assert!(repo
            .update_price(&ArticleId("art-1".to_string()), Decimal::ONE_HUNDRED)
            .await
            .is_ok());
        assert!(repo
            .update_price(&ArticleId("art-2".to_string()), Decimal::ONE_HUNDRED)
            .await
            .is_err());
    }
}
