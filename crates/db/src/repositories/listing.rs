use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row};

use concierge_core::domain::conversation::ConversationId;
use concierge_core::domain::listing::{Listing, ListingId, ListingType, StructuredData};
use concierge_core::domain::outreach::{OutreachEvent, OutreachStatus};

use super::{ListingQuery, ListingRepository, RepositoryError};
use crate::DbPool;

/// Rows fetched per round trip before the JSON-level filters run.
const CANDIDATE_PAGE_SIZE: i64 = 200;

const LISTING_COLUMNS: &str =
    "id, is_active, location, price, currency, listing_type, structured_data, created_at";

pub struct SqlListingRepository {
    pool: DbPool,
}

impl SqlListingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

fn row_to_listing(row: &SqliteRow) -> Result<Listing, RepositoryError> {
    let id: i64 = decode(row.try_get("id"))?;
    let is_active: bool = decode(row.try_get("is_active"))?;
    let location: String = decode(row.try_get("location"))?;
    let price: Option<String> = decode(row.try_get("price"))?;
    let currency: String = decode(row.try_get("currency"))?;
    let listing_type: String = decode(row.try_get("listing_type"))?;
    let structured_data: String = decode(row.try_get("structured_data"))?;
    let created_at: String = decode(row.try_get("created_at"))?;

    let price = price
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            Decimal::from_str(value.trim())
                .map_err(|e| RepositoryError::Decode(format!("invalid price `{value}`: {e}")))
        })
        .transpose()?;
    let listing_type = ListingType::parse(&listing_type)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown listing_type `{listing_type}`")))?;
    let structured_data: StructuredData = serde_json::from_str(&structured_data)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Listing {
        id: ListingId(id),
        is_active,
        location,
        price,
        currency,
        listing_type,
        structured_data,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_outreach(row: &SqliteRow) -> Result<OutreachEvent, RepositoryError> {
    let status: String = decode(row.try_get("status"))?;
    let follow_up_at: Option<String> = decode(row.try_get("follow_up_at"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let conversation_id: Option<String> = decode(row.try_get("conversation_id"))?;

    Ok(OutreachEvent {
        id: decode(row.try_get("id"))?,
        listing_id: ListingId(decode(row.try_get("listing_id"))?),
        conversation_id: conversation_id.map(ConversationId),
        channel: decode(row.try_get("channel"))?,
        to: decode(row.try_get("recipient"))?,
        text: decode(row.try_get("text"))?,
        status: OutreachStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown outreach status `{status}`")))?,
        provider_message_id: decode(row.try_get("provider_message_id"))?,
        follow_up_at: follow_up_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Runs inside `BEGIN IMMEDIATE`; the caller owns commit and rollback.
async fn append_outreach_locked(
    conn: &mut SqliteConnection,
    event: &OutreachEvent,
) -> Result<usize, RepositoryError> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM listing WHERE id = ?")
        .bind(event.listing_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    if active != Some(true) {
        return Err(RepositoryError::ListingNotFound(event.listing_id));
    }

    sqlx::query(
        "INSERT INTO listing_outreach_event (id, listing_id, conversation_id, channel, recipient,
                                             text, status, provider_message_id, follow_up_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(event.listing_id.0)
    .bind(event.conversation_id.as_ref().map(|id| id.0.as_str()))
    .bind(&event.channel)
    .bind(&event.to)
    .bind(&event.text)
    .bind(event.status.as_str())
    .bind(&event.provider_message_id)
    .bind(event.follow_up_at.map(|dt| dt.to_rfc3339()))
    .bind(event.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM listing_outreach_event WHERE listing_id = ?")
            .bind(event.listing_id.0)
            .fetch_one(&mut *conn)
            .await?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// One page of rows passing the column-level filters, newest first.
fn candidate_page(query: &ListingQuery, offset: i64) -> QueryBuilder<'static, Sqlite> {
    let mut builder: QueryBuilder<'static, Sqlite> =
        QueryBuilder::new(format!("SELECT {LISTING_COLUMNS} FROM listing WHERE is_active = 1"));

    if let Some(listing_type) = query.listing_type {
        builder.push(" AND listing_type = ").push_bind(listing_type.as_str());
    }

    if !query.location_terms.is_empty() {
        builder.push(" AND (");
        let mut separated = builder.separated(" OR ");
        for term in &query.location_terms {
            separated.push("LOWER(location) LIKE ");
            separated.push_bind_unseparated(format!("%{}%", term.to_lowercase()));
        }
        builder.push(")");
    }

    if let Some(max_price) = query.max_price.and_then(|value| value.to_f64()) {
        builder.push(" AND (price IS NULL OR CAST(price AS REAL) <= ").push_bind(max_price);
        builder.push(")");
    }
    if let Some(min_price) = query.min_price.and_then(|value| value.to_f64()) {
        builder.push(" AND (price IS NULL OR CAST(price AS REAL) >= ").push_bind(min_price);
        builder.push(")");
    }
    if let Some(bedrooms) = query.bedrooms {
        builder
            .push(" AND CAST(json_extract(structured_data, '$.bedrooms') AS INTEGER) = ")
            .push_bind(i64::from(bedrooms));
    }

    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(CANDIDATE_PAGE_SIZE)
        .push(" OFFSET ")
        .push_bind(offset);
    builder
}

#[async_trait::async_trait]
impl ListingRepository for SqlListingRepository {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listing WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_listing).transpose()
    }

    async fn search(&self, query: &ListingQuery) -> Result<Vec<Listing>, RepositoryError> {
        let mut listings = Vec::new();
        let mut offset = 0_i64;

        // Contact and feature filters run in Rust, so keep paging until enough
        // rows survive them or the SQL candidates run out.
        while listings.len() < query.limit {
            let mut page = candidate_page(query, offset);
            let rows = page.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let listing = row_to_listing(row)?;
                if query.matches_structured(&listing) {
                    listings.push(listing);
                    if listings.len() >= query.limit {
                        break;
                    }
                }
            }
            if rows.len() < CANDIDATE_PAGE_SIZE as usize {
                break;
            }
            offset += CANDIDATE_PAGE_SIZE;
        }
        Ok(listings)
    }

    async fn save(&self, listing: Listing) -> Result<ListingId, RepositoryError> {
        let structured_data = serde_json::to_string(&listing.structured_data)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let id: Option<i64> = (listing.id.0 > 0).then_some(listing.id.0);

        let saved_id: i64 = sqlx::query_scalar(
            "INSERT INTO listing (id, is_active, location, price, currency, listing_type,
                                  structured_data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 is_active = excluded.is_active,
                 location = excluded.location,
                 price = excluded.price,
                 currency = excluded.currency,
                 listing_type = excluded.listing_type,
                 structured_data = excluded.structured_data
             RETURNING id",
        )
        .bind(id)
        .bind(listing.is_active)
        .bind(&listing.location)
        .bind(listing.price.map(|price| price.to_string()))
        .bind(&listing.currency)
        .bind(listing.listing_type.as_str())
        .bind(structured_data)
        .bind(listing.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(ListingId(saved_id))
    }

    async fn record_outreach(&self, event: OutreachEvent) -> Result<usize, RepositoryError> {
        // IMMEDIATE takes the write lock up front; dropping the transaction rolls back.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let count = append_outreach_locked(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn list_outreach(&self, id: ListingId) -> Result<Vec<OutreachEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, listing_id, conversation_id, channel, recipient, text, status,
                    provider_message_id, follow_up_at, created_at
             FROM listing_outreach_event WHERE listing_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outreach).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use concierge_core::domain::conversation::ConversationId;
    use concierge_core::domain::listing::{Listing, ListingId, ListingType, StructuredData};
    use concierge_core::domain::outreach::{OutreachEvent, OutreachStatus};

    use super::SqlListingRepository;
    use crate::repositories::{ListingQuery, ListingRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlListingRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlListingRepository::new(pool)
    }

    fn listing(location: &str, price: i64, data: serde_json::Value, age_minutes: i64) -> Listing {
        Listing {
            id: ListingId(0),
            is_active: true,
            location: location.to_string(),
            price: Some(Decimal::new(price, 0)),
            currency: "GBP".to_string(),
            listing_type: ListingType::Rent,
            structured_data: serde_json::from_value::<StructuredData>(data).expect("data"),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn outreach(listing_id: ListingId) -> OutreachEvent {
        OutreachEvent {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id,
            conversation_id: Some(ConversationId::from("conv-1")),
            channel: "whatsapp".to_string(),
            to: "+905488639394".to_string(),
            text: "Hello, is this still available?".to_string(),
            status: OutreachStatus::Sent,
            provider_message_id: Some("wamid.1".to_string()),
            follow_up_at: Some(Utc::now() + Duration::hours(1)),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id_round_trip() {
        let repo = setup().await;
        let data = json!({
            "title": "Harbour flat",
            "bedrooms": 2,
            "contact_info": {"whatsapp": "+905488639394"},
        });
        let id = repo.save(listing("Girne", 450, data, 0)).await.expect("save");

        let found = repo.find_by_id(id).await.expect("find").expect("exists");
        assert_eq!(found.id, id);
        assert_eq!(found.price, Some(Decimal::new(450, 0)));
        assert_eq!(found.structured_data.bedrooms, Some(2));
        assert!(found.has_contact_info());
    }

    #[tokio::test]
    async fn search_applies_filters_and_excludes_unreachable_listings() {
        let repo = setup().await;
        let reachable = json!({"bedrooms": 2, "contact_info": {"whatsapp": "+905488639394"}});
        repo.save(listing("Girne", 450, reachable.clone(), 30)).await.expect("save old");
        let newest = repo
            .save(listing("Kyrenia centre", 480, reachable.clone(), 5))
            .await
            .expect("save new");
        repo.save(listing("Girne", 900, reachable.clone(), 1)).await.expect("save expensive");
        repo.save(listing("Famagusta", 400, reachable, 1)).await.expect("save elsewhere");
        repo.save(listing("Girne", 300, json!({"bedrooms": 2, "raw_text": "message me"}), 1))
            .await
            .expect("save unreachable");

        let query = ListingQuery {
            location_terms: vec!["girne".to_string(), "kyrenia".to_string()],
            bedrooms: Some(2),
            max_price: Some(Decimal::new(500, 0)),
            ..ListingQuery::default()
        };
        let results = repo.search(&query).await.expect("search");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, newest, "results should be ordered newest first");
        assert!(results.iter().all(|listing| listing.has_contact_info()));
    }

    #[tokio::test]
    async fn search_respects_limit_and_feature_matching() {
        let repo = setup().await;
        let pool_villa =
            json!({"features": ["Private pool"], "contact_info": {"phone": "+90 548 111 2233"}});
        for minute in 0..4 {
            repo.save(listing("Alsancak", 700, pool_villa.clone(), minute)).await.expect("save");
        }
        repo.save(listing(
            "Alsancak",
            700,
            json!({"features": ["garden"], "contact_info": {"phone": "+90 548 111 2233"}}),
            0,
        ))
        .await
        .expect("save garden");

        let query = ListingQuery {
            features: vec!["pool".to_string()],
            limit: 3,
            ..ListingQuery::default()
        };
        let results = repo.search(&query).await.expect("search");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn record_outreach_appends_events_in_order() {
        let repo = setup().await;
        let id = repo
            .save(listing("Girne", 450, json!({"contact_info": {"whatsapp": "+905488639394"}}), 0))
            .await
            .expect("save");

        assert_eq!(repo.record_outreach(outreach(id)).await.expect("first"), 1);
        assert_eq!(repo.record_outreach(outreach(id)).await.expect("second"), 2);

        let events = repo.list_outreach(id).await.expect("list");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, OutreachStatus::Sent);
        assert_eq!(events[0].to, "+905488639394");
    }

    #[tokio::test]
    async fn record_outreach_rejects_inactive_listing_and_releases_lock() {
        let repo = setup().await;
        let mut inactive = listing("Girne", 450, json!({}), 0);
        inactive.is_active = false;
        let id = repo.save(inactive).await.expect("save");

        let result = repo.record_outreach(outreach(id)).await;
        assert!(matches!(result, Err(RepositoryError::ListingNotFound(found)) if found == id));

        let missing = repo.record_outreach(outreach(ListingId(9_999))).await;
        assert!(matches!(missing, Err(RepositoryError::ListingNotFound(_))));
        assert!(repo.list_outreach(id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn search_pages_past_unreachable_rows() {
        let repo = setup().await;
        let contact = json!({"contact_info": {"phone": "+90 548 111 2233"}});
        let reachable =
            repo.save(listing("Girne", 450, contact, 900)).await.expect("save reachable");
        for minute in 0..520 {
            repo.save(listing("Girne", 450, json!({"raw_text": "message me"}), minute))
                .await
                .expect("save unreachable");
        }

        let query =
            ListingQuery { location_terms: vec!["girne".to_string()], ..ListingQuery::default() };
        let results = repo.search(&query).await.expect("search");
        assert_eq!(results.iter().map(|listing| listing.id).collect::<Vec<_>>(), vec![reachable]);
    }

    #[tokio::test]
    async fn search_filters_by_property_type() {
        let repo = setup().await;
        let contact = json!({"whatsapp": "+905488639394"});
        let villa_data = json!({"property_type": "villa", "contact_info": contact});
        let flat_data = json!({"title": "Harbour flat", "contact_info": contact});
        let villa = repo.save(listing("Girne", 450, villa_data, 2)).await.expect("save villa");
        repo.save(listing("Girne", 450, flat_data, 1)).await.expect("save flat");

        let query =
            ListingQuery { property_terms: vec!["villa".to_string()], ..ListingQuery::default() };
        let results = repo.search(&query).await.expect("search");
        assert_eq!(results.iter().map(|listing| listing.id).collect::<Vec<_>>(), vec![villa]);
    }

    #[tokio::test]
    async fn concurrent_outreach_records_are_serialised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("outreach.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlListingRepository::new(pool.clone());
        let id = repo
            .save(listing("Girne", 450, json!({"contact_info": {"whatsapp": "+905488639394"}}), 0))
            .await
            .expect("save");

        let (first, second) =
            tokio::join!(repo.record_outreach(outreach(id)), repo.record_outreach(outreach(id)));
        let mut counts = vec![first.expect("first"), second.expect("second")];
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2]);
        assert_eq!(repo.list_outreach(id).await.expect("list").len(), 2);

        pool.close().await;
    }
}
