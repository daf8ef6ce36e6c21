use sqlx::{sqlite::SqliteRow, Row};

use folio_core::billing::catalog::CouponResolver;
use folio_core::domain::coupon::{normalize_code, CouponCode, CouponCodeId};
use folio_core::domain::discount::DiscountId;
use folio_core::errors::ApplicationError;

use super::{parse_timestamp, CouponRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCouponRepository {
    pool: DbPool,
}

impl SqlCouponRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CouponResolver for SqlCouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponCode>, ApplicationError> {
        let key = normalize_code(code);
        if key.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT id, discount_id, code, created_at
             FROM coupon_code
             WHERE code = ?",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(coupon_from_row).transpose()?)
    }
}

#[async_trait::async_trait]
impl CouponRepository for SqlCouponRepository {
    async fn create(&self, coupon: CouponCode) -> Result<(), RepositoryError> {
        let code = normalize_code(&coupon.code);
        let result = sqlx::query(
            "INSERT INTO coupon_code (id, discount_id, code, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&coupon.id.0)
        .bind(&coupon.discount_id.0)
        .bind(&code)
        .bind(coupon.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::CouponCodeTaken(code))
            }
            Err(sqlx::Error::Database(error)) if error.is_foreign_key_violation() => {
                Err(RepositoryError::NotFound { entity: "discount", id: coupon.discount_id.0 })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, id: &CouponCodeId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM coupon_code WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "coupon code", id: id.0.clone() });
        }
        Ok(())
    }

    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<CouponCode>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, discount_id, code, created_at
             FROM coupon_code
             WHERE discount_id = ?
             ORDER BY code ASC",
        )
        .bind(&discount_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(coupon_from_row).collect()
    }
}

fn coupon_from_row(row: SqliteRow) -> Result<CouponCode, RepositoryError> {
    Ok(CouponCode {
        id: CouponCodeId(row.try_get("id")?),
        discount_id: DiscountId(row.try_get("discount_id")?),
        code: row.try_get("code")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
