use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use folio_core::billing::catalog::DiscountCatalog;
use folio_core::domain::discount::{Discount, DiscountId, DiscountStatus, DiscountType};
use folio_core::errors::ApplicationError;

use super::{
    parse_decimal, parse_json, parse_optional_date, parse_optional_timestamp, parse_optional_u32,
    parse_timestamp, parse_u32, to_json, DiscountRepository, RepositoryError,
};
use crate::DbPool;

const DISCOUNT_COLUMNS: &str = "
    id,
    name,
    description,
    discount_type,
    amount,
    currency,
    min_stay_nights,
    valid_from,
    valid_until,
    blackout_dates_json,
    max_total_usage,
    usage_count,
    max_usage_per_guest,
    one_time_per_booking,
    one_time_per_guest,
    applicable_room_types_json,
    applicable_rate_type_ids_json,
    status,
    created_at,
    updated_at,
    deleted_at";

pub struct SqlDiscountRepository {
    pool: DbPool,
}

impl SqlDiscountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DiscountCatalog for SqlDiscountRepository {
    async fn find_discount(&self, id: &DiscountId) -> Result<Option<Discount>, ApplicationError> {
        Ok(DiscountRepository::find_by_id(self, id).await?)
    }
}

#[async_trait::async_trait]
impl DiscountRepository for SqlDiscountRepository {
    async fn find_by_id(&self, id: &DiscountId) -> Result<Option<Discount>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DISCOUNT_COLUMNS} FROM discount WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(discount_from_row).transpose()
    }

    async fn save(&self, discount: Discount) -> Result<(), RepositoryError> {
        let blackout_dates = to_json("blackout_dates_json", &discount.blackout_dates)?;
        let room_types = to_json("applicable_room_types_json", &discount.applicable_room_types)?;
        let rate_types =
            to_json("applicable_rate_type_ids_json", &discount.applicable_rate_type_ids)?;

        sqlx::query(
            "INSERT INTO discount (
                id,
                name,
                description,
                discount_type,
                amount,
                currency,
                min_stay_nights,
                valid_from,
                valid_until,
                blackout_dates_json,
                max_total_usage,
                usage_count,
                max_usage_per_guest,
                one_time_per_booking,
                one_time_per_guest,
                applicable_room_types_json,
                applicable_rate_type_ids_json,
                status,
                created_at,
                updated_at,
                deleted_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                discount_type = excluded.discount_type,
                amount = excluded.amount,
                currency = excluded.currency,
                min_stay_nights = excluded.min_stay_nights,
                valid_from = excluded.valid_from,
                valid_until = excluded.valid_until,
                blackout_dates_json = excluded.blackout_dates_json,
                max_total_usage = excluded.max_total_usage,
                max_usage_per_guest = excluded.max_usage_per_guest,
                one_time_per_booking = excluded.one_time_per_booking,
                one_time_per_guest = excluded.one_time_per_guest,
                applicable_room_types_json = excluded.applicable_room_types_json,
                applicable_rate_type_ids_json = excluded.applicable_rate_type_ids_json,
                status = excluded.status,
                updated_at = excluded.updated_at,
                deleted_at = COALESCE(discount.deleted_at, excluded.deleted_at)",
        )
        .bind(&discount.id.0)
        .bind(&discount.name)
        .bind(&discount.description)
        .bind(discount.discount_type.as_str())
        .bind(discount.amount.to_string())
        .bind(&discount.currency)
        .bind(i64::from(discount.min_stay_nights))
        .bind(discount.valid_from.map(format_date))
        .bind(discount.valid_until.map(format_date))
        .bind(blackout_dates)
        .bind(discount.max_total_usage.map(i64::from))
        .bind(i64::from(discount.usage_count))
        .bind(discount.max_usage_per_guest.map(i64::from))
        .bind(discount.one_time_per_booking)
        .bind(discount.one_time_per_guest)
        .bind(room_types)
        .bind(rate_types)
        .bind(discount.status.as_str())
        .bind(discount.created_at.to_rfc3339())
        .bind(discount.updated_at.to_rfc3339())
        .bind(discount.deleted_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(
        &self,
        id: &DiscountId,
        status: DiscountStatus,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE discount SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(status.as_str())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "discount", id: id.0.clone() });
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &DiscountId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE discount SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(at.to_rfc3339())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "discount", id: id.0.clone() });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Discount>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discount WHERE deleted_at IS NULL ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(discount_from_row).collect()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn discount_from_row(row: SqliteRow) -> Result<Discount, RepositoryError> {
    let type_raw = row.try_get::<String, _>("discount_type")?;
    let discount_type = type_raw
        .parse::<DiscountType>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = status_raw
        .parse::<DiscountStatus>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Discount {
        id: DiscountId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        discount_type,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        currency: row.try_get("currency")?,
        min_stay_nights: parse_u32("min_stay_nights", row.try_get("min_stay_nights")?)?,
        valid_from: parse_optional_date("valid_from", row.try_get("valid_from")?)?,
        valid_until: parse_optional_date("valid_until", row.try_get("valid_until")?)?,
        blackout_dates: parse_json::<BTreeSet<NaiveDate>>(
            "blackout_dates_json",
            row.try_get("blackout_dates_json")?,
        )?,
        max_total_usage: parse_optional_u32("max_total_usage", row.try_get("max_total_usage")?)?,
        usage_count: parse_u32("usage_count", row.try_get("usage_count")?)?,
        max_usage_per_guest: parse_optional_u32(
            "max_usage_per_guest",
            row.try_get("max_usage_per_guest")?,
        )?,
        one_time_per_booking: row.try_get("one_time_per_booking")?,
        one_time_per_guest: row.try_get("one_time_per_guest")?,
        applicable_room_types: parse_json(
            "applicable_room_types_json",
            row.try_get("applicable_room_types_json")?,
        )?,
        applicable_rate_type_ids: parse_json(
            "applicable_rate_type_ids_json",
            row.try_get("applicable_rate_type_ids_json")?,
        )?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        deleted_at: parse_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}
