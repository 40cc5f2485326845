use sqlx::Row;

use relist_core::domain::article::{ArticleId, Bundle, BundleId};

use super::{decode_decimal, decode_ts, encode_ts, BundleRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBundleRepository {
    pool: DbPool,
}

impl SqlBundleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BundleRepository for SqlBundleRepository {
    async fn insert_bundle(&self, bundle: Bundle) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO bundle (id, owner_id, title, description, price, discount_percent, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bundle.id.0)
        .bind(&bundle.owner_id)
        .bind(&bundle.title)
        .bind(&bundle.description)
        .bind(bundle.price.to_string())
        .bind(bundle.discount_percent.to_string())
        .bind(encode_ts(bundle.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_members(
        &self,
        bundle_id: &BundleId,
        article_ids: &[ArticleId],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (position, article_id) in article_ids.iter().enumerate() {
            sqlx::query("INSERT INTO bundle_member (bundle_id, article_id, position) VALUES (?, ?, ?)")
                .bind(&bundle_id.0)
                .bind(&article_id.0)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_bundle(&self, bundle_id: &BundleId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM bundle_member WHERE bundle_id = ?")
            .bind(&bundle_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM bundle WHERE id = ?")
            .bind(&bundle_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_bundle(&self, bundle_id: &BundleId) -> Result<Option<Bundle>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, description, price, discount_percent, created_at
             FROM bundle WHERE id = ?",
        )
        .bind(&bundle_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let owner_id: String =
            row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let title: String =
            row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let description: String =
            row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let price_raw: String =
            row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let discount_raw: String =
            row.try_get("discount_percent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at_raw: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(Bundle {
            id: BundleId(id),
            owner_id,
            title,
            description,
            price: decode_decimal("price", &price_raw)?,
            discount_percent: decode_decimal("discount_percent", &discount_raw)?,
            created_at: decode_ts("created_at", &created_at_raw)?,
        }))
    }

    async fn member_count(&self, bundle_id: &BundleId) -> Result<u32, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bundle_member WHERE bundle_id = ?")
                .bind(&bundle_id.0)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u32)
    }
}
