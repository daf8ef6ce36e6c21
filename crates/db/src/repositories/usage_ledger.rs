use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use folio_core::billing::catalog::UsageLedger;
use folio_core::billing::ledger::{LedgerReplacement, LedgerWriteOutcome};
use folio_core::domain::coupon::CouponCodeId;
use folio_core::domain::discount::{DiscountId, DiscountType};
use folio_core::domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};
use folio_core::errors::ApplicationError;

use super::{parse_decimal, parse_timestamp, RepositoryError, UsageLedgerRepository};
use crate::DbPool;

const ENTRY_COLUMNS: &str = "
    invoice_id,
    discount_id,
    coupon_code_id,
    guest_id,
    booking_id,
    discount_amount,
    discount_type,
    discount_value_used,
    recorded_at";

pub struct SqlUsageLedgerRepository {
    pool: DbPool,
}

impl SqlUsageLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn replace(
        &self,
        invoice_id: &InvoiceId,
        replacement: LedgerReplacement,
    ) -> Result<LedgerWriteOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_scalar::<_, String>(
            "DELETE FROM invoice_discount WHERE invoice_id = ? RETURNING discount_id",
        )
        .bind(&invoice_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .map(DiscountId);

        if let Some(discount_id) = replacement.usage_to_consume(removed.as_ref()) {
            let consumed = sqlx::query(
                "UPDATE discount
                 SET usage_count = usage_count + 1
                 WHERE id = ?
                   AND deleted_at IS NULL
                   AND (max_total_usage IS NULL OR usage_count < max_total_usage)",
            )
            .bind(&discount_id.0)
            .execute(&mut *tx)
            .await?;

            if consumed.rows_affected() == 0 {
                tx.rollback().await?;
                debug!(
                    event_name = "db.ledger.consume_rejected",
                    invoice_id = %invoice_id.0,
                    discount_id = %discount_id.0,
                    "conditional usage increment matched no row"
                );
                return Ok(LedgerWriteOutcome::UsageLimitReached);
            }
        }

        let outcome = match &replacement.entry {
            Some(entry) => {
                sqlx::query(&format!(
                    "INSERT INTO invoice_discount ({ENTRY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(&entry.invoice_id.0)
                .bind(&entry.discount_id.0)
                .bind(entry.coupon_code_id.as_ref().map(|id| id.0.as_str()))
                .bind(entry.guest_id.as_ref().map(|id| id.0.as_str()))
                .bind(entry.booking_id.as_ref().map(|id| id.0.as_str()))
                .bind(entry.discount_amount.to_string())
                .bind(entry.discount_type.as_str())
                .bind(entry.discount_value_used.to_string())
                .bind(entry.recorded_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
                LedgerWriteOutcome::Recorded
            }
            None => LedgerWriteOutcome::Cleared,
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl UsageLedger for SqlUsageLedgerRepository {
    async fn entry_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<UsageLedgerEntry>, ApplicationError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM invoice_discount WHERE invoice_id = ?"
        ))
        .bind(&invoice_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(entry_from_row).transpose()?)
    }

    async fn guest_has_used(
        &self,
        discount_id: &DiscountId,
        guest_id: &GuestId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        let excluding = excluding.map(|id| id.0.as_str());
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM invoice_discount
                WHERE discount_id = ?
                  AND guest_id = ?
                  AND (? IS NULL OR invoice_id <> ?)
             )",
        )
        .bind(&discount_id.0)
        .bind(&guest_id.0)
        .bind(excluding)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(found != 0)
    }

    async fn booking_has_discount(
        &self,
        booking_id: &BookingId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        let excluding = excluding.map(|id| id.0.as_str());
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM invoice_discount
                WHERE booking_id = ?
                  AND (? IS NULL OR invoice_id <> ?)
             )",
        )
        .bind(&booking_id.0)
        .bind(excluding)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(found != 0)
    }

    async fn replace_entry(
        &self,
        invoice_id: &InvoiceId,
        replacement: LedgerReplacement,
    ) -> Result<LedgerWriteOutcome, ApplicationError> {
        Ok(self.replace(invoice_id, replacement).await?)
    }
}

#[async_trait::async_trait]
impl UsageLedgerRepository for SqlUsageLedgerRepository {
    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<UsageLedgerEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM invoice_discount
             WHERE discount_id = ?
             ORDER BY recorded_at ASC, invoice_id ASC"
        ))
        .bind(&discount_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: SqliteRow) -> Result<UsageLedgerEntry, RepositoryError> {
    let type_raw = row.try_get::<String, _>("discount_type")?;
    let discount_type = type_raw
        .parse::<DiscountType>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(UsageLedgerEntry {
        invoice_id: InvoiceId(row.try_get("invoice_id")?),
        discount_id: DiscountId(row.try_get("discount_id")?),
        coupon_code_id: row.try_get::<Option<String>, _>("coupon_code_id")?.map(CouponCodeId),
        guest_id: row.try_get::<Option<String>, _>("guest_id")?.map(GuestId),
        booking_id: row.try_get::<Option<String>, _>("booking_id")?.map(BookingId),
        discount_amount: parse_decimal("discount_amount", row.try_get("discount_amount")?)?,
        discount_type,
        discount_value_used: parse_decimal(
            "discount_value_used",
            row.try_get("discount_value_used")?,
        )?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use folio_core::billing::catalog::UsageLedger;
    use folio_core::billing::ledger::{AppliedDiscount, LedgerReplacement, LedgerWriteOutcome};
    use folio_core::billing::validation::{ChargeContext, RejectionReason, ValidationRequest};
    use folio_core::billing::BillingEngine;
    use folio_core::domain::discount::{DiscountId, DiscountType};
    use folio_core::domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};

    use super::SqlUsageLedgerRepository;
    use crate::repositories::test_support::{parse_ts, sample_discount, setup_pool};
    use crate::repositories::{
        DiscountRepository, SqlCouponRepository, SqlDiscountRepository, UsageLedgerRepository,
    };
    use crate::DbPool;

    fn entry(invoice: &str, discount: &str, guest: Option<&str>, booking: Option<&str>) -> UsageLedgerEntry {
        UsageLedgerEntry {
            invoice_id: InvoiceId(invoice.to_string()),
            discount_id: DiscountId(discount.to_string()),
            coupon_code_id: None,
            guest_id: guest.map(|id| GuestId(id.to_string())),
            booking_id: booking.map(|id| BookingId(id.to_string())),
            discount_amount: Decimal::new(3000, 2),
            discount_type: DiscountType::Percentage,
            discount_value_used: Decimal::new(10, 0),
            recorded_at: parse_ts("2026-06-01T12:00:00Z"),
        }
    }

    async fn save_capped_discount(pool: &DbPool, id: &str, cap: Option<u32>) {
        let mut discount = sample_discount(id);
        discount.max_total_usage = cap;
        SqlDiscountRepository::new(pool.clone()).save(discount).await.expect("save discount");
    }

    async fn usage_count(pool: &DbPool, id: &str) -> u32 {
        SqlDiscountRepository::new(pool.clone())
            .find_by_id(&DiscountId(id.to_string()))
            .await
            .expect("find discount")
            .expect("discount exists")
            .usage_count
    }

    #[tokio::test]
    async fn replace_records_consumes_and_round_trips() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-1", Some(5)).await;
        let repo = SqlUsageLedgerRepository::new(pool.clone());
        let invoice = InvoiceId("INV-1".to_string());
        let recorded = entry("INV-1", "D-1", Some("G-1"), Some("B-1"));

        let outcome = repo
            .replace_entry(
                &invoice,
                LedgerReplacement { entry: Some(recorded.clone()) },
            )
            .await
            .expect("replace");

        assert_eq!(outcome, LedgerWriteOutcome::Recorded);
        assert_eq!(repo.entry_for_invoice(&invoice).await.expect("entry"), Some(recorded.clone()));
        assert_eq!(usage_count(&pool, "D-1").await, 1);
        assert_eq!(
            repo.list_for_discount(&DiscountId("D-1".to_string())).await.expect("list"),
            vec![recorded]
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn consume_past_cap_writes_nothing() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-CAP", Some(1)).await;
        let repo = SqlUsageLedgerRepository::new(pool.clone());

        let first = repo
            .replace_entry(
                &InvoiceId("INV-1".to_string()),
                LedgerReplacement { entry: Some(entry("INV-1", "D-CAP", None, None)) },
            )
            .await
            .expect("first replace");
        assert_eq!(first, LedgerWriteOutcome::Recorded);

        let second = repo
            .replace_entry(
                &InvoiceId("INV-2".to_string()),
                LedgerReplacement { entry: Some(entry("INV-2", "D-CAP", None, None)) },
            )
            .await
            .expect("second replace");
        assert_eq!(second, LedgerWriteOutcome::UsageLimitReached);
        assert_eq!(repo.entry_for_invoice(&InvoiceId("INV-2".to_string())).await.expect("entry"), None);
        assert_eq!(usage_count(&pool, "D-CAP").await, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn exclusivity_queries_skip_the_invoice_being_edited() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-1", None).await;
        let repo = SqlUsageLedgerRepository::new(pool.clone());
        let invoice = InvoiceId("INV-1".to_string());
        repo.replace_entry(
            &invoice,
            LedgerReplacement { entry: Some(entry("INV-1", "D-1", Some("G-1"), Some("B-1"))) },
        )
        .await
        .expect("replace");

        let discount = DiscountId("D-1".to_string());
        let guest = GuestId("G-1".to_string());
        let booking = BookingId("B-1".to_string());

        assert!(repo.guest_has_used(&discount, &guest, None).await.expect("guest"));
        assert!(!repo.guest_has_used(&discount, &guest, Some(&invoice)).await.expect("guest"));
        assert!(!repo
            .guest_has_used(&discount, &GuestId("G-2".to_string()), None)
            .await
            .expect("guest"));
        assert!(repo.booking_has_discount(&booking, None).await.expect("booking"));
        assert!(!repo.booking_has_discount(&booking, Some(&invoice)).await.expect("booking"));

        pool.close().await;
    }

    #[tokio::test]
    async fn clearing_an_invoice_removes_row_without_touching_usage() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-1", None).await;
        let repo = SqlUsageLedgerRepository::new(pool.clone());
        let invoice = InvoiceId("INV-1".to_string());

        repo.replace_entry(
            &invoice,
            LedgerReplacement { entry: Some(entry("INV-1", "D-1", None, None)) },
        )
        .await
        .expect("record");

        let cleared = repo
            .replace_entry(&invoice, LedgerReplacement { entry: None })
            .await
            .expect("clear");

        assert_eq!(cleared, LedgerWriteOutcome::Cleared);
        assert_eq!(repo.entry_for_invoice(&invoice).await.expect("entry"), None);
        assert_eq!(usage_count(&pool, "D-1").await, 1);

        pool.close().await;
    }

    type SqlEngine = BillingEngine<
        Arc<SqlDiscountRepository>,
        Arc<SqlCouponRepository>,
        Arc<SqlUsageLedgerRepository>,
    >;

    async fn single_use_engine(pool: &DbPool) -> SqlEngine {
        let mut discount = sample_discount("D1");
        discount.discount_type = DiscountType::Percentage;
        discount.amount = Decimal::new(10, 0);
        discount.min_stay_nights = 2;
        discount.max_total_usage = Some(1);
        discount.valid_from = NaiveDate::from_ymd_opt(2026, 1, 1);
        discount.valid_until = NaiveDate::from_ymd_opt(2026, 12, 31);
        discount.blackout_dates.clear();
        discount.applicable_room_types.clear();
        discount.one_time_per_booking = false;
        SqlDiscountRepository::new(pool.clone()).save(discount).await.expect("save");

        BillingEngine::new(
            Arc::new(SqlDiscountRepository::new(pool.clone())),
            Arc::new(SqlCouponRepository::new(pool.clone())),
            Arc::new(SqlUsageLedgerRepository::new(pool.clone())),
        )
    }

    fn stay_request(invoice: Option<&str>) -> ValidationRequest {
        ValidationRequest {
            discount_id: Some(DiscountId("D1".to_string())),
            coupon_code: None,
            context: ChargeContext {
                subtotal: Decimal::new(300, 0),
                currency: "USD".to_string(),
                check_in: NaiveDate::from_ymd_opt(2026, 6, 10).expect("date"),
                check_out: NaiveDate::from_ymd_opt(2026, 6, 13).expect("date"),
                nights: 3,
                room_types: vec!["standard".to_string()],
                rate_type_ids: Vec::new(),
                guest_id: None,
                booking_id: None,
                invoice_id: invoice.map(|id| InvoiceId(id.to_string())),
            },
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).expect("date")
    }

    #[tokio::test]
    async fn engine_over_sql_rejects_once_single_use_discount_is_finalized() {
        let pool = setup_pool().await;
        let engine = single_use_engine(&pool).await;
        let request = stay_request(None);

        let outcome = engine.validate(&request, today()).await.expect("validate");
        assert_eq!(outcome.discount_amount(), Decimal::new(30, 0));

        let accepted = outcome.accepted().expect("accepted");
        let applied = AppliedDiscount::from_accepted(accepted, None, None);
        let recorded = engine
            .record_invoice_discount(&InvoiceId("INV-1".to_string()), Some(&applied))
            .await
            .expect("record");
        assert_eq!(recorded, LedgerWriteOutcome::Recorded);

        let again = engine.validate(&request, today()).await.expect("validate again");
        assert_eq!(again.rejection(), Some(&RejectionReason::UsageLimitReached));

        let racing = engine
            .record_invoice_discount(&InvoiceId("INV-2".to_string()), Some(&applied))
            .await
            .expect("record second invoice");
        assert_eq!(racing, LedgerWriteOutcome::UsageLimitReached);

        pool.close().await;
    }

    #[tokio::test]
    async fn invoice_holding_the_last_unit_can_be_finalized_again() {
        let pool = setup_pool().await;
        let engine = single_use_engine(&pool).await;
        let invoice = InvoiceId("INV-1".to_string());

        let first = engine.validate(&stay_request(Some("INV-1")), today()).await.expect("validate");
        let applied = AppliedDiscount::from_accepted(first.accepted().expect("accepted"), None, None);
        let recorded =
            engine.record_invoice_discount(&invoice, Some(&applied)).await.expect("record");
        assert_eq!(recorded, LedgerWriteOutcome::Recorded);

        let retry = engine.validate(&stay_request(Some("INV-1")), today()).await.expect("revalidate");
        let reapplied = AppliedDiscount::from_accepted(retry.accepted().expect("still accepted"), None, None);
        let rerecorded =
            engine.record_invoice_discount(&invoice, Some(&reapplied)).await.expect("re-record");
        assert_eq!(rerecorded, LedgerWriteOutcome::Recorded);
        assert_eq!(usage_count(&pool, "D1").await, 1);

        let other = engine.validate(&stay_request(Some("INV-2")), today()).await.expect("validate other");
        assert_eq!(other.rejection(), Some(&RejectionReason::UsageLimitReached));

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_finalizes_of_one_invoice_consume_once() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-1", None).await;
        let engine = BillingEngine::new(
            Arc::new(SqlDiscountRepository::new(pool.clone())),
            Arc::new(SqlCouponRepository::new(pool.clone())),
            Arc::new(SqlUsageLedgerRepository::new(pool.clone())),
        );
        let invoice = InvoiceId("INV-1".to_string());
        let applied = AppliedDiscount {
            discount_id: DiscountId("D-1".to_string()),
            coupon_code_id: None,
            guest_id: None,
            booking_id: None,
            discount_amount: Decimal::new(3000, 2),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::new(10, 0),
        };

        let (first, second) = tokio::join!(
            engine.record_invoice_discount(&invoice, Some(&applied)),
            engine.record_invoice_discount(&invoice, Some(&applied)),
        );
        assert_eq!(first.expect("first"), LedgerWriteOutcome::Recorded);
        assert_eq!(second.expect("second"), LedgerWriteOutcome::Recorded);

        assert_eq!(usage_count(&pool, "D-1").await, 1);
        let repo = SqlUsageLedgerRepository::new(pool.clone());
        assert_eq!(
            repo.list_for_discount(&DiscountId("D-1".to_string())).await.expect("list").len(),
            1
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_finalizes_never_oversell_a_single_use_discount() {
        let pool = setup_pool().await;
        save_capped_discount(&pool, "D-ONE", Some(1)).await;
        let repo = Arc::new(SqlUsageLedgerRepository::new(pool.clone()));

        let mut handles = Vec::new();
        for n in 0..4 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let invoice = format!("INV-{n}");
                repo.replace_entry(
                    &InvoiceId(invoice.clone()),
                    LedgerReplacement { entry: Some(entry(&invoice, "D-ONE", None, None)) },
                )
                .await
            }));
        }

        let mut recorded = 0;
        for handle in handles {
            let outcome = handle.await.expect("join").expect("replace");
            if outcome == LedgerWriteOutcome::Recorded {
                recorded += 1;
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(usage_count(&pool, "D-ONE").await, 1);
        assert_eq!(
            repo.list_for_discount(&DiscountId("D-ONE".to_string())).await.expect("list").len(),
            1
        );

        pool.close().await;
    }
}
