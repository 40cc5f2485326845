use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use relist_core::domain::article::{Article, ArticleId, ArticleStatus};

use super::{decode_decimal, decode_ts, encode_ts, ArticleRepository, RepositoryError};
use crate::DbPool;

pub struct SqlArticleRepository {
    pool: DbPool,
}

impl SqlArticleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_article(row: &sqlx::sqlite::SqliteRow) -> Result<Article, RepositoryError> {
        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let owner_id: String =
            row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let title: String =
            row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let brand: Option<String> =
            row.try_get("brand").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let condition: String =
            row.try_get("condition").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let price_raw: String =
            row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let status_raw: String =
            row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let min_raw: Option<String> = row
            .try_get("suggested_min_price")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let max_raw: Option<String> = row
            .try_get("suggested_max_price")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at_raw: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let updated_at_raw: String =
            row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let status = ArticleStatus::parse(&status_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown article status `{status_raw}`"))
        })?;

        Ok(Article {
            id: ArticleId(id),
            owner_id,
            title,
            brand,
            condition,
            price: decode_decimal("price", &price_raw)?,
            status,
            suggested_min_price: min_raw
                .map(|value| decode_decimal("suggested_min_price", &value))
                .transpose()?,
            suggested_max_price: max_raw
                .map(|value| decode_decimal("suggested_max_price", &value))
                .transpose()?,
            created_at: decode_ts("created_at", &created_at_raw)?,
            updated_at: decode_ts("updated_at", &updated_at_raw)?,
        })
    }
}

const ARTICLE_COLUMNS: &str = "id, owner_id, title, brand, condition, price, status,
                               suggested_min_price, suggested_max_price, created_at, updated_at";

#[async_trait::async_trait]
impl ArticleRepository for SqlArticleRepository {
    async fn list_active(&self, owner_id: &str) -> Result<Vec<Article>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM article
             WHERE owner_id = ? AND status = 'active'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_article).collect()
    }

    async fn find_by_ids(
        &self,
        owner_id: &str,
        ids: &[ArticleId],
    ) -> Result<Vec<Article>, RepositoryError> {
        let mut articles = Vec::with_capacity(ids.len());

        // The id lists here are insight-sized (a handful of members), so
        // one query per id keeps the SQL static.
        for id in ids {
            let row = sqlx::query(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM article WHERE owner_id = ? AND id = ?"
            ))
            .bind(owner_id)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                articles.push(Self::row_to_article(&row)?);
            }
        }

        Ok(articles)
    }

    async fn update_price(&self, id: &ArticleId, price: Decimal) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE article SET price = ?, updated_at = ? WHERE id = ?")
            .bind(price.to_string())
            .bind(encode_ts(Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Decode(format!("article `{}` does not exist", id.0)));
        }

        Ok(())
    }

    async fn save(&self, article: Article) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO article (
                 id, owner_id, title, brand, condition, price, status,
                 suggested_min_price, suggested_max_price, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 brand = excluded.brand,
                 condition = excluded.condition,
                 price = excluded.price,
                 status = excluded.status,
                 suggested_min_price = excluded.suggested_min_price,
                 suggested_max_price = excluded.suggested_max_price,
                 updated_at = excluded.updated_at",
        )
        .bind(&article.id.0)
        .bind(&article.owner_id)
        .bind(&article.title)
        .bind(&article.brand)
        .bind(&article.condition)
        .bind(article.price.to_string())
        .bind(article.status.as_str())
        .bind(article.suggested_min_price.map(|value| value.to_string()))
        .bind(article.suggested_max_price.map(|value| value.to_string()))
        .bind(encode_ts(article.created_at))
        .bind(encode_ts(article.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
