//! Party repository implementation
//!
//! Customer and Lead lookup by normalized mobile or phone number.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, error, instrument};
use yeastar_core::{
    models::{NewParty, Party, PartyType},
    traits::PartyRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of PartyRepository
pub struct PgPartyRepository {
    pool: PgPool,
}

impl PgPartyRepository {
    /// Create a new party repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> Party {
        let party_type: String = row.get("party_type");
        Party {
            id: row.get("id"),
            // Guarded by the CHECK constraint on party_type
            party_type: PartyType::parse(&party_type).unwrap_or(PartyType::Lead),
            name: row.get("name"),
            phone: row.get("phone"),
            mobile_no: row.get("mobile_no"),
            phone_normalized: row.get("phone_normalized"),
            mobile_normalized: row.get("mobile_normalized"),
            created_at: row.get("created_at"),
        }
    }
}

const PARTY_COLUMNS: &str =
    "id, party_type, name, phone, mobile_no, phone_normalized, mobile_normalized, created_at";

const PARTY_ORDER: &str =
    "ORDER BY CASE party_type WHEN 'customer' THEN 0 ELSE 1 END, created_at, id LIMIT 1";

#[async_trait]
impl PartyRepository for PgPartyRepository {
    #[instrument(skip(self))]
    async fn find_by_phone(&self, phone_normalized: &str) -> AppResult<Option<Party>> {
        debug!("Looking up party by phone: {}", phone_normalized);

        let query = format!(
            r#"
            SELECT {}
            FROM parties
            WHERE mobile_normalized = $1 OR phone_normalized = $1
            {}
            "#,
            PARTY_COLUMNS, PARTY_ORDER
        );

        sqlx::query(&query)
            .bind(phone_normalized)
            .map(Self::map_row)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding party {}: {}", phone_normalized, e);
                AppError::Database(format!("Failed to find party: {}", e))
            })
    }

    #[instrument(skip(self))]
    async fn find_by_phone_suffix(&self, digits: &str) -> AppResult<Option<Party>> {
        debug!("Looking up party by phone suffix: {}", digits);

        let query = format!(
            r#"
            SELECT {}
            FROM parties
            WHERE mobile_normalized LIKE '%' || $1 OR phone_normalized LIKE '%' || $1
            {}
            "#,
            PARTY_COLUMNS, PARTY_ORDER
        );

        sqlx::query(&query)
            .bind(digits)
            .map(Self::map_row)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error matching suffix {}: {}", digits, e);
                AppError::Database(format!("Failed to find party: {}", e))
            })
    }

    #[instrument(skip(self, party), fields(party_type = %party.party_type))]
    async fn create(&self, party: &NewParty) -> AppResult<Party> {
        debug!("Creating party: {}", party.name);

        let query = format!(
            r#"
            INSERT INTO parties (party_type, name, phone, mobile_no, phone_normalized, mobile_normalized)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PARTY_COLUMNS
        );

        let created = sqlx::query(&query)
        .bind(party.party_type.as_str())
        .bind(&party.name)
        .bind(&party.phone)
        .bind(&party.mobile_no)
        .bind(&party.phone_normalized)
        .bind(&party.mobile_normalized)
        .map(Self::map_row)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating party: {}", e);
            AppError::Database(format!("Failed to create party: {}", e))
        })?;

        debug!("Party created with id {}", created.id);
        Ok(created)
    }
}
