use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use folio_core::billing::catalog::{CouponResolver, DiscountCatalog, UsageLedger};
use folio_core::billing::ledger::{LedgerReplacement, LedgerWriteOutcome};
use folio_core::domain::coupon::{normalize_code, CouponCode, CouponCodeId};
use folio_core::domain::discount::{Discount, DiscountId, DiscountStatus};
use folio_core::domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};
use folio_core::errors::ApplicationError;

use super::{CouponRepository, DiscountRepository, RepositoryError, UsageLedgerRepository};

/// Process-local store backing all three billing ports. Ledger replacement
/// holds the ledger and discount write locks together, always in that order.
#[derive(Default)]
pub struct InMemoryBillingStore {
    discounts: RwLock<HashMap<String, Discount>>,
    coupons: RwLock<HashMap<String, CouponCode>>,
    ledger: RwLock<HashMap<String, UsageLedgerEntry>>,
}

#[async_trait::async_trait]
impl DiscountCatalog for InMemoryBillingStore {
    async fn find_discount(&self, id: &DiscountId) -> Result<Option<Discount>, ApplicationError> {
        Ok(DiscountRepository::find_by_id(self, id).await?)
    }
}

#[async_trait::async_trait]
impl CouponResolver for InMemoryBillingStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponCode>, ApplicationError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(&normalize_code(code)).cloned())
    }
}

#[async_trait::async_trait]
impl UsageLedger for InMemoryBillingStore {
    async fn entry_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<UsageLedgerEntry>, ApplicationError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.get(&invoice_id.0).cloned())
    }

    async fn guest_has_used(
        &self,
        discount_id: &DiscountId,
        guest_id: &GuestId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.values().any(|entry| {
            entry.discount_id == *discount_id
                && entry.guest_id.as_ref() == Some(guest_id)
                && Some(&entry.invoice_id) != excluding
        }))
    }

    async fn booking_has_discount(
        &self,
        booking_id: &BookingId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.values().any(|entry| {
            entry.booking_id.as_ref() == Some(booking_id) && Some(&entry.invoice_id) != excluding
        }))
    }

    async fn replace_entry(
        &self,
        invoice_id: &InvoiceId,
        replacement: LedgerReplacement,
    ) -> Result<LedgerWriteOutcome, ApplicationError> {
        let mut ledger = self.ledger.write().await;
        let mut discounts = self.discounts.write().await;

        let removed = ledger.get(&invoice_id.0).map(|entry| entry.discount_id.clone());
        if let Some(discount_id) = replacement.usage_to_consume(removed.as_ref()) {
            match discounts.get_mut(&discount_id.0) {
                Some(discount) if !discount.is_deleted() && !discount.usage_exhausted() => {
                    discount.usage_count += 1;
                }
                _ => return Ok(LedgerWriteOutcome::UsageLimitReached),
            }
        }

        ledger.remove(&invoice_id.0);
        Ok(match replacement.entry {
            Some(entry) => {
                ledger.insert(invoice_id.0.clone(), entry);
                LedgerWriteOutcome::Recorded
            }
            None => LedgerWriteOutcome::Cleared,
        })
    }
}

#[async_trait::async_trait]
impl DiscountRepository for InMemoryBillingStore {
    async fn find_by_id(&self, id: &DiscountId) -> Result<Option<Discount>, RepositoryError> {
        let discounts = self.discounts.read().await;
        Ok(discounts.get(&id.0).cloned())
    }

    async fn save(&self, mut discount: Discount) -> Result<(), RepositoryError> {
        let mut discounts = self.discounts.write().await;
        if let Some(existing) = discounts.get(&discount.id.0) {
            discount.usage_count = existing.usage_count;
            discount.created_at = existing.created_at;
            discount.deleted_at = existing.deleted_at.or(discount.deleted_at);
        }
        discounts.insert(discount.id.0.clone(), discount);
        Ok(())
    }

    async fn set_status(
        &self,
        id: &DiscountId,
        status: DiscountStatus,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut discounts = self.discounts.write().await;
        match discounts.get_mut(&id.0).filter(|discount| !discount.is_deleted()) {
            Some(discount) => {
                discount.status = status;
                discount.updated_at = at;
                Ok(())
            }
            None => Err(RepositoryError::NotFound { entity: "discount", id: id.0.clone() }),
        }
    }

    async fn soft_delete(&self, id: &DiscountId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut discounts = self.discounts.write().await;
        match discounts.get_mut(&id.0).filter(|discount| !discount.is_deleted()) {
            Some(discount) => {
                discount.soft_delete(at);
                Ok(())
            }
            None => Err(RepositoryError::NotFound { entity: "discount", id: id.0.clone() }),
        }
    }

    async fn list(&self) -> Result<Vec<Discount>, RepositoryError> {
        let discounts = self.discounts.read().await;
        let mut listed: Vec<Discount> =
            discounts.values().filter(|discount| !discount.is_deleted()).cloned().collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }
}

#[async_trait::async_trait]
impl CouponRepository for InMemoryBillingStore {
    async fn create(&self, mut coupon: CouponCode) -> Result<(), RepositoryError> {
        coupon.code = normalize_code(&coupon.code);

        if !self.discounts.read().await.contains_key(&coupon.discount_id.0) {
            return Err(RepositoryError::NotFound {
                entity: "discount",
                id: coupon.discount_id.0.clone(),
            });
        }

        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&coupon.code) {
            return Err(RepositoryError::CouponCodeTaken(coupon.code));
        }
        coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn delete(&self, id: &CouponCodeId) -> Result<(), RepositoryError> {
        let mut coupons = self.coupons.write().await;
        let before = coupons.len();
        coupons.retain(|_, coupon| coupon.id != *id);
        if coupons.len() == before {
            return Err(RepositoryError::NotFound { entity: "coupon code", id: id.0.clone() });
        }
        Ok(())
    }

    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<CouponCode>, RepositoryError> {
        let coupons = self.coupons.read().await;
        let mut listed: Vec<CouponCode> =
            coupons.values().filter(|coupon| coupon.discount_id == *discount_id).cloned().collect();
        listed.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(listed)
    }
}

#[async_trait::async_trait]
impl UsageLedgerRepository for InMemoryBillingStore {
    async fn list_for_discount(
        &self,
        discount_id: &DiscountId,
    ) -> Result<Vec<UsageLedgerEntry>, RepositoryError> {
        let ledger = self.ledger.read().await;
        let mut listed: Vec<UsageLedgerEntry> =
            ledger.values().filter(|entry| entry.discount_id == *discount_id).cloned().collect();
        listed.sort_by(|a, b| {
            a.recorded_at.cmp(&b.recorded_at).then_with(|| a.invoice_id.0.cmp(&b.invoice_id.0))
        });
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use folio_core::billing::catalog::{CouponResolver, DiscountCatalog};
    use folio_core::billing::ledger::{AppliedDiscount, LedgerWriteOutcome};
    use folio_core::billing::validation::{ChargeContext, RejectionReason, ValidationRequest};
    use folio_core::billing::BillingEngine;
    use folio_core::domain::coupon::{CouponCode, CouponCodeId};
    use folio_core::domain::discount::{DiscountId, DiscountStatus};
    use folio_core::domain::ledger::{GuestId, InvoiceId};

    use super::InMemoryBillingStore;
    use crate::repositories::test_support::{parse_ts, sample_discount};
    use crate::repositories::{
        CouponRepository, DiscountRepository, RepositoryError, UsageLedgerRepository,
    };

    fn request(coupon: &str, guest: &str, invoice: Option<&str>) -> ValidationRequest {
        ValidationRequest {
            discount_id: None,
            coupon_code: Some(coupon.to_string()),
            context: ChargeContext {
                subtotal: Decimal::new(400, 0),
                currency: "USD".to_string(),
                check_in: NaiveDate::from_ymd_opt(2026, 5, 4).expect("date"),
                check_out: NaiveDate::from_ymd_opt(2026, 5, 7).expect("date"),
                nights: 3,
                room_types: vec!["deluxe".to_string()],
                rate_type_ids: Vec::new(),
                guest_id: Some(GuestId(guest.to_string())),
                booking_id: None,
                invoice_id: invoice.map(|id| InvoiceId(id.to_string())),
            },
        }
    }

    async fn seeded_store() -> Arc<InMemoryBillingStore> {
        let store = Arc::new(InMemoryBillingStore::default());
        let mut discount = sample_discount("D-GUEST");
        discount.one_time_per_guest = true;
        discount.one_time_per_booking = false;
        store.save(discount).await.expect("save discount");
        store
            .create(CouponCode::new(
                CouponCodeId("C-1".to_string()),
                DiscountId("D-GUEST".to_string()),
                "welcome",
                parse_ts("2026-03-01T09:00:00Z"),
            ))
            .await
            .expect("create coupon");
        store
    }

    #[tokio::test]
    async fn engine_over_memory_store_enforces_guest_exclusivity() {
        let store = seeded_store().await;
        let engine = BillingEngine::new(store.clone(), store.clone(), store.clone());
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");

        let first = engine.validate(&request("WELCOME", "G-1", None), today).await.expect("validate");
        assert_eq!(first.discount_amount(), Decimal::new(50, 0));

        let applied = AppliedDiscount::from_accepted(
            first.accepted().expect("accepted"),
            Some(GuestId("G-1".to_string())),
            None,
        );
        let outcome = engine
            .record_invoice_discount(&InvoiceId("INV-1".to_string()), Some(&applied))
            .await
            .expect("record");
        assert_eq!(outcome, LedgerWriteOutcome::Recorded);

        let repeat = engine.validate(&request("welcome", "G-1", None), today).await.expect("validate");
        assert_eq!(repeat.rejection(), Some(&RejectionReason::AlreadyUsedByGuest));

        let editing =
            engine.validate(&request("welcome", "G-1", Some("INV-1")), today).await.expect("validate");
        assert!(editing.is_accepted());

        let other_guest =
            engine.validate(&request("welcome", "G-2", None), today).await.expect("validate");
        assert!(other_guest.is_accepted());

        let listed =
            UsageLedgerRepository::list_for_discount(&*store, &DiscountId("D-GUEST".to_string()))
                .await
                .expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn coupon_codes_are_unique_ignoring_case() {
        let store = seeded_store().await;
        let duplicate = store
            .create(CouponCode::new(
                CouponCodeId("C-2".to_string()),
                DiscountId("D-GUEST".to_string()),
                " WELCOME ",
                parse_ts("2026-03-01T09:00:00Z"),
            ))
            .await;
        assert!(matches!(duplicate, Err(RepositoryError::CouponCodeTaken(code)) if code == "WELCOME"));

        store.delete(&CouponCodeId("C-1".to_string())).await.expect("delete");
        assert_eq!(store.find_by_code("welcome").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn soft_deleted_discounts_drop_out_of_listings_but_stay_addressable() {
        let store = seeded_store().await;
        let id = DiscountId("D-GUEST".to_string());
        let at = parse_ts("2026-04-02T10:00:00Z");

        store.set_status(&id, DiscountStatus::Inactive, at).await.expect("deactivate");
        store.soft_delete(&id, at).await.expect("soft delete");

        assert!(store.list().await.expect("list").is_empty());
        let found = store.find_discount(&id).await.expect("find").expect("still stored");
        assert_eq!(found.deleted_at, Some(at));
        assert!(matches!(
            store.set_status(&id, DiscountStatus::Active, at).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn save_preserves_usage_count_of_existing_discount() {
        let store = seeded_store().await;
        let engine = BillingEngine::new(store.clone(), store.clone(), store.clone());
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");
        let accepted = engine.validate(&request("welcome", "G-1", None), today).await.expect("validate");
        let applied = AppliedDiscount::from_accepted(accepted.accepted().expect("accepted"), None, None);
        engine
            .record_invoice_discount(&InvoiceId("INV-1".to_string()), Some(&applied))
            .await
            .expect("record");

        let mut edited = sample_discount("D-GUEST");
        edited.name = "Renamed".to_string();
        store.save(edited).await.expect("update");

        let found = store.find_by_id(&DiscountId("D-GUEST".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.name, "Renamed");
        assert_eq!(found.usage_count, 1);
    }

    #[tokio::test]
    async fn concurrent_finalizes_of_one_invoice_consume_a_single_use() {
        let store = seeded_store().await;
        let engine = BillingEngine::new(store.clone(), store.clone(), store.clone());
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");
        let accepted = engine
            .validate(&request("welcome", "G-1", Some("INV-1")), today)
            .await
            .expect("validate");
        let applied = AppliedDiscount::from_accepted(accepted.accepted().expect("accepted"), None, None);
        let invoice = InvoiceId("INV-1".to_string());

        let (first, second) = tokio::join!(
            engine.record_invoice_discount(&invoice, Some(&applied)),
            engine.record_invoice_discount(&invoice, Some(&applied)),
        );
        assert_eq!(first.expect("first"), LedgerWriteOutcome::Recorded);
        assert_eq!(second.expect("second"), LedgerWriteOutcome::Recorded);

        let found = store.find_by_id(&DiscountId("D-GUEST".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.usage_count, 1);
    }

    #[tokio::test]
    async fn saving_over_a_deleted_discount_keeps_it_deleted() {
        let store = seeded_store().await;
        let id = DiscountId("D-GUEST".to_string());
        let at = parse_ts("2026-04-02T10:00:00Z");
        store.soft_delete(&id, at).await.expect("soft delete");

        store.save(sample_discount("D-GUEST")).await.expect("save");

        let found = store.find_discount(&id).await.expect("find").expect("still stored");
        assert_eq!(found.deleted_at, Some(at));
        assert!(store.list().await.expect("list").is_empty());
    }
}
