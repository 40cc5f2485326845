use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_OWNER: &str = "demo-owner";
const SEED_ARTICLE_COUNT: i64 = 6;
const SEED_SALE_COUNT: i64 = 12;
/// In-window Nike sales with the "air" first-token category; enough to
/// clear the three-sample segment threshold.
const SEED_NIKE_AIR_SAMPLES: i64 = 5;

/// Deterministic demo dataset: one reseller account with live inventory
/// and a month of completed sales.
pub struct DemoSeedDataset;

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub owner_id: &'static str,
    pub articles_seeded: i64,
    pub sales_seeded: i64,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Load the demo dataset into the database. Idempotent: rows that
    /// already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            owner_id: SEED_OWNER,
            articles_seeded: SEED_ARTICLE_COUNT,
            sales_seeded: SEED_SALE_COUNT,
        })
    }

    /// Verify the seeded rows exist and the market-stats preconditions
    /// hold.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let article_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM article WHERE owner_id = ? AND id LIKE 'art-demo-%'",
        )
        .bind(SEED_OWNER)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-articles", article_count == SEED_ARTICLE_COUNT));

        let sale_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM completed_sale WHERE owner_id = ? AND id LIKE 'sale-demo-%'",
        )
        .bind(SEED_OWNER)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-sales", sale_count == SEED_SALE_COUNT));

        let nike_air_samples: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM completed_sale
             WHERE owner_id = ?
               AND brand = 'Nike'
               AND condition = 'very_good'
               AND sold_price IS NOT NULL
               AND sold_at >= strftime('%Y-%m-%dT%H:%M:%fZ','now','-30 days')",
        )
        .bind(SEED_OWNER)
        .fetch_one(pool)
        .await?;
        checks.push(("nike-air-segment-samples", nike_air_samples == SEED_NIKE_AIR_SAMPLES));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query("DELETE FROM completed_sale WHERE id LIKE 'sale-demo-%'")).await?;
        tx.execute(sqlx::query("DELETE FROM article WHERE id LIKE 'art-demo-%'")).await?;
        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DemoSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn demo_seed_loads_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("load seed");
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");

        assert!(
            verification.all_present,
            "failed checks: {:?}",
            verification
                .checks
                .iter()
                .filter_map(|(name, passed)| (!passed).then_some(*name))
                .collect::<Vec<_>>()
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn demo_seed_is_idempotent_and_cleanable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("first load");
        DemoSeedDataset::load(&pool).await.expect("second load");
        assert!(DemoSeedDataset::verify(&pool).await.expect("verify").all_present);

        DemoSeedDataset::clean(&pool).await.expect("clean");
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);

        pool.close().await;
    }
}
