use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// One seeded discount and the coupon that aliases it.
struct SeedDiscountContract {
    discount_id: &'static str,
    coupon_code: &'static str,
    status: &'static str,
    description: &'static str,
}

const SEED_DISCOUNTS: &[SeedDiscountContract] = &[
    SeedDiscountContract {
        discount_id: "disc-summer10",
        coupon_code: "SUMMER10",
        status: "active",
        description: "10% off, minimum 2 nights, single use",
    },
    SeedDiscountContract {
        discount_id: "disc-welcome50",
        coupon_code: "WELCOME50",
        status: "active",
        description: "50 off, once per guest",
    },
    SeedDiscountContract {
        discount_id: "disc-longstay15",
        coupon_code: "LONGSTAY15",
        status: "active",
        description: "15% off 7+ nights in deluxe or suite, holiday blackouts, once per booking",
    },
    SeedDiscountContract {
        discount_id: "disc-legacy20",
        coupon_code: "LEGACY20",
        status: "inactive",
        description: "inactive partner rate",
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedDiscountInfo {
    pub discount_id: &'static str,
    pub coupon_code: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub discounts_seeded: Vec<SeedDiscountInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl SeedVerification {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
    }
}

/// Demo catalog used by `folio seed` and by integration tests.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let discounts_seeded = SEED_DISCOUNTS
            .iter()
            .map(|seed| SeedDiscountInfo {
                discount_id: seed.discount_id,
                coupon_code: seed.coupon_code,
                description: seed.description,
            })
            .collect();

        Ok(SeedResult { discounts_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_DISCOUNTS.len() * 2);

        for seed in SEED_DISCOUNTS {
            let discount_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM discount WHERE id = ?1 AND status = ?2 AND deleted_at IS NULL)",
            )
            .bind(seed.discount_id)
            .bind(seed.status)
            .fetch_one(pool)
            .await?;
            checks.push((seed.discount_id, discount_ok == 1));

            let coupon_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM coupon_code WHERE code = ?1 AND discount_id = ?2)",
            )
            .bind(seed.coupon_code)
            .bind(seed.discount_id)
            .fetch_one(pool)
            .await?;
            checks.push((seed.coupon_code, coupon_ok == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(SeedVerification { all_present, checks })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use folio_core::billing::validation::{ChargeContext, RejectionReason, ValidationRequest};
    use folio_core::billing::BillingEngine;
    use folio_core::domain::discount::DiscountType;

    use super::{DemoSeedDataset, SeedVerification};
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::{SqlCouponRepository, SqlDiscountRepository, SqlUsageLedgerRepository};

    fn context(subtotal: i64, nights: u32) -> ChargeContext {
        let check_in = NaiveDate::from_ymd_opt(2026, 7, 1).expect("date");
        ChargeContext {
            subtotal: Decimal::new(subtotal, 0),
            currency: "USD".to_string(),
            check_in,
            check_out: check_in + chrono::Days::new(u64::from(nights)),
            nights,
            room_types: vec!["standard".to_string()],
            rate_type_ids: Vec::new(),
            guest_id: None,
            booking_id: None,
            invoice_id: None,
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = setup_pool().await;

        let result = DemoSeedDataset::load(&pool).await.expect("first load");
        assert_eq!(result.discounts_seeded.len(), 4);
        DemoSeedDataset::load(&pool).await.expect("second load");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed: {:?}", verification.failed_checks());

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_coupons_validate_through_the_engine() {
        let pool = setup_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load");
        let engine = BillingEngine::new(
            SqlDiscountRepository::new(pool.clone()),
            SqlCouponRepository::new(pool.clone()),
            SqlUsageLedgerRepository::new(pool.clone()),
        );
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).expect("date");

        let summer = ValidationRequest {
            discount_id: None,
            coupon_code: Some("summer10".to_string()),
            context: context(300, 3),
        };
        let outcome = engine.validate(&summer, today).await.expect("validate");
        let accepted = outcome.accepted().expect("summer accepted");
        assert_eq!(accepted.discount_amount, Decimal::new(30, 0));
        assert_eq!(accepted.discount_type, DiscountType::Percentage);

        let short = ValidationRequest { context: context(100, 1), ..summer };
        let outcome = engine.validate(&short, today).await.expect("validate");
        assert_eq!(outcome.rejection(), Some(&RejectionReason::MinimumStay { required_nights: 2 }));

        let legacy = ValidationRequest {
            discount_id: None,
            coupon_code: Some("LEGACY20".to_string()),
            context: context(100, 1),
        };
        let outcome = engine.validate(&legacy, today).await.expect("validate");
        assert_eq!(outcome.rejection(), Some(&RejectionReason::Inactive));

        pool.close().await;
    }

    #[test]
    fn failed_checks_lists_only_missing_labels() {
        let verification = SeedVerification {
            all_present: false,
            checks: vec![("disc-summer10", true), ("SUMMER10", false), ("disc-legacy20", false)],
        };
        assert_eq!(verification.failed_checks(), vec!["SUMMER10", "disc-legacy20"]);
    }
}
