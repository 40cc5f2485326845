use chrono::{Duration, Utc};
use sqlx::Row;

use relist_core::domain::article::ArticleId;
use relist_core::domain::insight::{
    CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType, SuggestedAction,
};

use super::{decode_ts, encode_ts, InsightStore, RepositoryError, SetStatusOutcome};
use crate::DbPool;

/// SQLite-backed insight cache store.
///
/// `replace` is the only multi-row write and runs inside a single
/// transaction so a partial batch is never observable, even across
/// concurrent refreshes of the same key.
pub struct SqlInsightStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqlInsightStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_ttl(pool, Duration::minutes(30))
    }

    pub fn with_ttl(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    fn row_to_insight(row: &sqlx::sqlite::SqliteRow) -> Result<Insight, RepositoryError> {
        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let owner_id: String =
            row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let cache_key: String =
            row.try_get("cache_key").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let insight_type_raw: String =
            row.try_get("insight_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let priority_raw: String =
            row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let title: String =
            row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let message: String =
            row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let action_label: Option<String> =
            row.try_get("action_label").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let article_ids_json: String =
            row.try_get("article_ids_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let suggested_action_json: Option<String> = row
            .try_get("suggested_action_json")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let status_raw: String =
            row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at_raw: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let last_refresh_at_raw: String =
            row.try_get("last_refresh_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let expires_at_raw: String =
            row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let insight_type = InsightType::parse(&insight_type_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown insight type `{insight_type_raw}`"))
        })?;
        let priority = InsightPriority::parse(&priority_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown insight priority `{priority_raw}`"))
        })?;
        let status = InsightStatus::parse(&status_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown insight status `{status_raw}`"))
        })?;

        let article_ids: Vec<ArticleId> = serde_json::from_str(&article_ids_json)
            .map_err(|error| RepositoryError::Decode(format!("invalid article ids: {error}")))?;
        let suggested_action: Option<SuggestedAction> = suggested_action_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|error| {
                    RepositoryError::Decode(format!("invalid suggested action: {error}"))
                })
            })
            .transpose()?;

        Ok(Insight {
            id: InsightId(id),
            owner_id,
            cache_key: CacheKey(cache_key),
            insight_type,
            priority,
            title,
            message,
            action_label,
            article_ids,
            suggested_action,
            status,
            created_at: decode_ts("created_at", &created_at_raw)?,
            last_refresh_at: decode_ts("last_refresh_at", &last_refresh_at_raw)?,
            expires_at: decode_ts("expires_at", &expires_at_raw)?,
        })
    }
}

#[async_trait::async_trait]
impl InsightStore for SqlInsightStore {
    async fn load_active(
        &self,
        owner_id: &str,
        cache_key: &CacheKey,
    ) -> Result<Vec<Insight>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, cache_key, insight_type, priority, title, message,
                    action_label, article_ids_json, suggested_action_json, status,
                    created_at, last_refresh_at, expires_at
             FROM insight
             WHERE owner_id = ? AND cache_key = ? AND status = 'active' AND expires_at > ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .bind(&cache_key.0)
        .bind(encode_ts(Utc::now()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_insight).collect()
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

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM insight WHERE owner_id = ? AND cache_key = ?")
            .bind(owner_id)
            .bind(&cache_key.0)
            .execute(&mut *tx)
            .await?;

        for insight in &stamped {
            let article_ids_json = serde_json::to_string(&insight.article_ids).map_err(|error| {
                RepositoryError::Decode(format!("failed to encode article ids: {error}"))
            })?;
            let suggested_action_json = insight
                .suggested_action
                .as_ref()
                .map(|action| {
                    serde_json::to_string(action).map_err(|error| {
                        RepositoryError::Decode(format!(
                            "failed to encode suggested action: {error}"
                        ))
                    })
                })
                .transpose()?;

            sqlx::query(
                "INSERT INTO insight (
                     id, owner_id, cache_key, insight_type, priority, title, message,
                     action_label, article_ids_json, suggested_action_json, status,
                     created_at, last_refresh_at, expires_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&insight.id.0)
            .bind(&insight.owner_id)
            .bind(&insight.cache_key.0)
            .bind(insight.insight_type.as_str())
            .bind(insight.priority.as_str())
            .bind(&insight.title)
            .bind(&insight.message)
            .bind(&insight.action_label)
            .bind(article_ids_json)
            .bind(suggested_action_json)
            .bind(insight.status.as_str())
            .bind(encode_ts(insight.created_at))
            .bind(encode_ts(insight.last_refresh_at))
            .bind(encode_ts(insight.expires_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
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

        let result = sqlx::query("UPDATE insight SET status = ? WHERE id = ? AND status = 'active'")
            .bind(status.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            Ok(SetStatusOutcome::Applied)
        } else {
            Ok(SetStatusOutcome::NoOp)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use relist_core::domain::article::ArticleId;
    use relist_core::domain::insight::{
        CacheKey, Insight, InsightId, InsightPriority, InsightStatus, InsightType, SuggestedAction,
    };

    use super::SqlInsightStore;
    use crate::repositories::{encode_ts, InsightStore, SetStatusOutcome};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_insight(id: &str, title: &str) -> Insight {
        let now = Utc::now();
        Insight {
            id: InsightId(id.to_string()),
            owner_id: "owner-1".to_string(),
            cache_key: CacheKey::pricing(),
            insight_type: InsightType::Underpriced,
            priority: InsightPriority::High,
            title: title.to_string(),
            message: "similar items sold for more".to_string(),
            action_label: Some("Apply price".to_string()),
            article_ids: vec![ArticleId("art-1".to_string())],
            suggested_action: Some(SuggestedAction::AdjustPrice {
                current_price: Decimal::new(1500, 2),
                suggested_price: Decimal::new(2400, 2),
                min_price: Decimal::new(2200, 2),
                max_price: Decimal::new(3200, 2),
                reasoning: "below segment average".to_string(),
                confidence: 0.8,
                market_data: None,
            }),
            status: InsightStatus::Active,
            created_at: now,
            last_refresh_at: now,
            expires_at: now,
        }
    }

    #[tokio::test]
    async fn replace_then_load_returns_exactly_the_new_batch() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());
        let key = CacheKey::pricing();

        store
            .replace(
                "owner-1",
                &key,
                vec![sample_insight("ins-old-1", "Old one"), sample_insight("ins-old-2", "Old two")],
            )
            .await
            .expect("first replace");

        store
            .replace("owner-1", &key, vec![sample_insight("ins-new-1", "New one")])
            .await
            .expect("second replace");

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert_eq!(loaded.len(), 1, "old records must not survive a replace");
        assert_eq!(loaded[0].id.0, "ins-new-1");
        assert_eq!(loaded[0].title, "New one");

        pool.close().await;
    }

    #[tokio::test]
    async fn replace_stamps_a_shared_refresh_timestamp_and_ttl() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());
        let key = CacheKey::proactive();

        let stamped = store
            .replace(
                "owner-1",
                &key,
                vec![sample_insight("ins-1", "One"), sample_insight("ins-2", "Two")],
            )
            .await
            .expect("replace");

        assert_eq!(stamped[0].last_refresh_at, stamped[1].last_refresh_at);
        assert_eq!(stamped[0].expires_at, stamped[1].expires_at);
        assert_eq!(stamped[0].expires_at - stamped[0].last_refresh_at, Duration::minutes(30));

        pool.close().await;
    }

    #[tokio::test]
    async fn replace_scopes_to_its_own_cache_key_and_owner() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());

        let mut other_owner = sample_insight("ins-other-owner", "Other owner");
        other_owner.owner_id = "owner-2".to_string();
        store
            .replace("owner-2", &CacheKey::pricing(), vec![other_owner])
            .await
            .expect("seed other owner");
        store
            .replace("owner-1", &CacheKey::proactive(), vec![sample_insight("ins-pro", "Pro")])
            .await
            .expect("seed other key");

        store
            .replace("owner-1", &CacheKey::pricing(), vec![sample_insight("ins-own", "Own")])
            .await
            .expect("replace own partition");

        let other_owner_batch =
            store.load_active("owner-2", &CacheKey::pricing()).await.expect("other owner");
        let other_key_batch =
            store.load_active("owner-1", &CacheKey::proactive()).await.expect("other key");
        assert_eq!(other_owner_batch.len(), 1);
        assert_eq!(other_key_batch.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn expired_batch_is_not_served() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());
        let key = CacheKey::pricing();

        store
            .replace("owner-1", &key, vec![sample_insight("ins-1", "One")])
            .await
            .expect("replace");

        // Rewind the record 31 minutes so the hard TTL has elapsed.
        let past = Utc::now() - Duration::minutes(31);
        sqlx::query("UPDATE insight SET last_refresh_at = ?, expires_at = ? WHERE id = 'ins-1'")
            .bind(encode_ts(past))
            .bind(encode_ts(past + Duration::minutes(30)))
            .execute(&pool)
            .await
            .expect("rewind timestamps");

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert!(loaded.is_empty(), "hard TTL expiry must hide the batch");

        pool.close().await;
    }

    #[tokio::test]
    async fn dismiss_is_idempotent_and_terminal() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());
        let key = CacheKey::pricing();

        store
            .replace("owner-1", &key, vec![sample_insight("ins-1", "One")])
            .await
            .expect("replace");
        let id = InsightId("ins-1".to_string());

        let first = store.set_status(&id, InsightStatus::Dismissed).await.expect("dismiss");
        assert_eq!(first, SetStatusOutcome::Applied);

        let second = store.set_status(&id, InsightStatus::Dismissed).await.expect("re-dismiss");
        assert_eq!(second, SetStatusOutcome::NoOp);

        // A dismissed insight cannot be completed either.
        let cross = store.set_status(&id, InsightStatus::Completed).await.expect("cross");
        assert_eq!(cross, SetStatusOutcome::NoOp);

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert!(loaded.is_empty(), "dismissed insights are not active");

        pool.close().await;
    }

    #[tokio::test]
    async fn set_status_rejects_active_as_a_target() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());

        let error = store
            .set_status(&InsightId("ins-1".to_string()), InsightStatus::Active)
            .await
            .expect_err("active is not a valid target");
        assert!(error.to_string().contains("active"));

        pool.close().await;
    }

    #[tokio::test]
    async fn suggested_action_round_trips_through_storage() {
        let pool = setup().await;
        let store = SqlInsightStore::new(pool.clone());
        let key = CacheKey::pricing();

        let original = sample_insight("ins-1", "One");
        store.replace("owner-1", &key, vec![original.clone()]).await.expect("replace");

        let loaded = store.load_active("owner-1", &key).await.expect("load");
        assert_eq!(loaded[0].suggested_action, original.suggested_action);
        assert_eq!(loaded[0].article_ids, original.article_ids);

        pool.close().await;
    }
}
