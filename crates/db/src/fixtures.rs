use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_LISTING_IDS: &[i64] = &[1001, 1002, 1003, 1004, 1005, 1006];
const SEED_ACTIVE_LISTING_IDS: &[i64] = &[1001, 1002, 1003, 1004, 1005];
const SEED_ARTICLE_IDS: &[i64] = &[2001, 2002, 2003];

/// Listings and knowledge articles used for local runs and smoke tests.
///
/// Covers the shapes the routing core has to cope with: WhatsApp and phone
/// contacts, a phone number only present in free text, a listing with no
/// usable contact, and an inactive listing.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            listings_seeded: SEED_LISTING_IDS.len(),
            articles_seeded: SEED_ARTICLE_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let listing_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM listing WHERE id IN {}",
            sql_array_from_ids(SEED_LISTING_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("listings", listing_count == SEED_LISTING_IDS.len() as i64));

        let active_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM listing WHERE is_active = 1 AND id IN {}",
            sql_array_from_ids(SEED_ACTIVE_LISTING_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("active-listings", active_count == SEED_ACTIVE_LISTING_IDS.len() as i64));

        let whatsapp_contact: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM listing
                           WHERE id = 1001 AND json_extract(structured_data, '$.contact_info.whatsapp') IS NOT NULL)",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("whatsapp-contact-listing", whatsapp_contact == 1));

        let article_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM knowledge_article WHERE is_active = 1 AND id IN {}",
            sql_array_from_ids(SEED_ARTICLE_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("knowledge-articles", article_count == SEED_ARTICLE_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows, including any outreach events recorded against them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        let listings = sql_array_from_ids(SEED_LISTING_IDS);

        sqlx::query(&format!("DELETE FROM listing_outreach_event WHERE listing_id IN {listings}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM listing WHERE id IN {listings}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM knowledge_article WHERE id IN {}",
            sql_array_from_ids(SEED_ARTICLE_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub listings_seeded: usize,
    pub articles_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
