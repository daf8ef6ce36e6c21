use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use folio_core::domain::coupon::{CouponCode, CouponCodeId};
use folio_core::domain::discount::{Discount, DiscountId, DiscountStatus};
use folio_core::domain::ledger::UsageLedgerEntry;
use folio_core::errors::ApplicationError;

pub mod coupon;
pub mod discount;
pub mod memory;
pub mod usage_ledger;

pub use coupon::SqlCouponRepository;
pub use discount::SqlDiscountRepository;
pub use memory::InMemoryBillingStore;
pub use usage_ledger::SqlUsageLedgerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("coupon code `{0}` is already taken")]
    CouponCodeTaken(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

/// Catalog administration. Validation reads through
/// [`folio_core::billing::catalog::DiscountCatalog`] instead.
#[async_trait]
pub trait DiscountRepository: Send + Sync {
    async fn find_by_id(&self, id: &DiscountId) -> Result<Option<Discount>, RepositoryError>;

    /// Inserts or updates the definition. `usage_count` and `created_at` of an
    /// existing row are kept; usage is owned by the ledger.
    async fn save(&self, discount: Discount) -> Result<(), RepositoryError>;

    async fn set_status(
        &self,
        id: &DiscountId,
        status: DiscountStatus,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn soft_delete(&self, id: &DiscountId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Non-deleted discounts ordered by name.
    async fn list(&self) -> Result<Vec<Discount>, RepositoryError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Fails with [`RepositoryError::CouponCodeTaken`] when the normalized code
    /// already exists.
    async fn create(&self, coupon: CouponCode) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &CouponCodeId) -> Result<(), RepositoryError>;

    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<CouponCode>, RepositoryError>;
}

#[async_trait]
pub trait UsageLedgerRepository: Send + Sync {
    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<UsageLedgerEntry>, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_optional_u32(
    column: &str,
    value: Option<i64>,
) -> Result<Option<u32>, RepositoryError> {
    value.map(|value| parse_u32(column, value)).transpose()
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|date| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{date}` ({error})"))
            })
        })
        .transpose()
}

pub(crate) fn parse_decimal(
    column: &str,
    value: String,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    value.parse().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: String,
) -> Result<T, RepositoryError> {
    serde_json::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid json in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("could not encode `{column}` ({error})")))
}
