use chrono::{Duration, Utc};
use sqlx::Row;

use relist_core::domain::article::{ArticleId, CompletedSale};

use super::{decode_decimal, decode_ts, encode_ts, RepositoryError, SaleRepository};
use crate::DbPool;

pub struct SqlSaleRepository {
    pool: DbPool,
}

impl SqlSaleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_sale(row: &sqlx::sqlite::SqliteRow) -> Result<CompletedSale, RepositoryError> {
        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let owner_id: String =
            row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let article_id: Option<String> =
            row.try_get("article_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let title: String =
            row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let brand: Option<String> =
            row.try_get("brand").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let condition: String =
            row.try_get("condition").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let sold_price_raw: Option<String> =
            row.try_get("sold_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let sold_at_raw: String =
            row.try_get("sold_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(CompletedSale {
            id,
            owner_id,
            article_id: article_id.map(ArticleId),
            title,
            brand,
            condition,
            sold_price: sold_price_raw
                .map(|value| decode_decimal("sold_price", &value))
                .transpose()?,
            sold_at: decode_ts("sold_at", &sold_at_raw)?,
        })
    }
}

#[async_trait::async_trait]
impl SaleRepository for SqlSaleRepository {
    async fn recent_completed(
        &self,
        owner_id: &str,
        window_days: i64,
        limit: u32,
    ) -> Result<Vec<CompletedSale>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(window_days);

        let rows = sqlx::query(
            "SELECT id, owner_id, article_id, title, brand, condition, sold_price, sold_at
             FROM completed_sale
             WHERE owner_id = ? AND sold_at >= ?
             ORDER BY sold_at DESC
             LIMIT ?",
        )
        .bind(owner_id)
        .bind(encode_ts(cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_sale).collect()
    }

    async fn save(&self, sale: CompletedSale) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO completed_sale (id, owner_id, article_id, title, brand, condition, sold_price, sold_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&sale.id)
        .bind(&sale.owner_id)
        .bind(sale.article_id.as_ref().map(|id| id.0.clone()))
        .bind(&sale.title)
        .bind(&sale.brand)
        .bind(&sale.condition)
        .bind(sale.sold_price.map(|value| value.to_string()))
        .bind(encode_ts(sale.sold_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use relist_core::domain::article::CompletedSale;

    use super::SqlSaleRepository;
    use crate::repositories::SaleRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_sale(id: &str, days_ago: i64, price: Option<i64>) -> CompletedSale {
        CompletedSale {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            article_id: None,
            title: "Air Max 90".to_string(),
            brand: Some("Nike".to_string()),
            condition: "very_good".to_string(),
            sold_price: price.map(|value| Decimal::new(value * 100, 2)),
            sold_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn recent_completed_respects_window_and_limit() {
        let pool = setup().await;
        let repo = SqlSaleRepository::new(pool.clone());

        repo.save(sample_sale("s-recent-1", 1, Some(25))).await.expect("save");
        repo.save(sample_sale("s-recent-2", 3, Some(28))).await.expect("save");
        repo.save(sample_sale("s-recent-3", 5, Some(30))).await.expect("save");
        repo.save(sample_sale("s-ancient", 45, Some(99))).await.expect("save");

        let sales = repo.recent_completed("owner-1", 30, 2).await.expect("load");
        assert_eq!(sales.len(), 2, "limit caps the sample");
        assert_eq!(sales[0].id, "s-recent-1", "most recent first");
        assert!(sales.iter().all(|sale| sale.id != "s-ancient"));

        pool.close().await;
    }

    #[tokio::test]
    async fn null_price_rows_survive_the_round_trip() {
        let pool = setup().await;
        let repo = SqlSaleRepository::new(pool.clone());

        repo.save(sample_sale("s-null", 2, None)).await.expect("save");

        let sales = repo.recent_completed("owner-1", 30, 10).await.expect("load");
        assert_eq!(sales.len(), 1);
        assert!(sales[0].sold_price.is_none(), "null prices are the aggregator's problem");

        pool.close().await;
    }
}
