//! Store ports the billing engine reads and writes through.
//!
//! The engine never caches: every validation re-reads current state through
//! these traits. Implementations live in `folio-db` (SQLite and in-memory).

use std::sync::Arc;

use async_trait::async_trait;

use crate::billing::ledger::{LedgerReplacement, LedgerWriteOutcome};
use crate::domain::coupon::CouponCode;
use crate::domain::discount::{Discount, DiscountId};
use crate::domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};
use crate::errors::ApplicationError;

#[async_trait]
pub trait DiscountCatalog: Send + Sync {
    /// Returns the discount even when soft-deleted; callers decide how to
    /// treat `deleted_at`.
    async fn find_discount(&self, id: &DiscountId) -> Result<Option<Discount>, ApplicationError>;
}

#[async_trait]
pub trait CouponResolver: Send + Sync {
    /// Case-insensitive lookup of a human-entered code.
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponCode>, ApplicationError>;
}

#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn entry_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<UsageLedgerEntry>, ApplicationError>;

    /// Whether `guest_id` already has an entry for `discount_id` on any
    /// invoice other than `excluding`.
    async fn guest_has_used(
        &self,
        discount_id: &DiscountId,
        guest_id: &GuestId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError>;

    /// Whether any discount is already recorded against `booking_id` on an
    /// invoice other than `excluding`.
    async fn booking_has_discount(
        &self,
        booking_id: &BookingId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError>;

    /// Applies `replacement` atomically: drop the invoice's current row,
    /// consume one usage unit of
    /// [`LedgerReplacement::usage_to_consume`] for the dropped row's discount
    /// (only while under the cap), then insert the new row. Nothing is
    /// written when the consume fails.
    async fn replace_entry(
        &self,
        invoice_id: &InvoiceId,
        replacement: LedgerReplacement,
    ) -> Result<LedgerWriteOutcome, ApplicationError>;
}

#[async_trait]
impl<T: DiscountCatalog + ?Sized> DiscountCatalog for Arc<T> {
    async fn find_discount(&self, id: &DiscountId) -> Result<Option<Discount>, ApplicationError> {
        (**self).find_discount(id).await
    }
}

#[async_trait]
impl<T: CouponResolver + ?Sized> CouponResolver for Arc<T> {
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponCode>, ApplicationError> {
        (**self).find_by_code(code).await
    }
}

#[async_trait]
impl<T: UsageLedger + ?Sized> UsageLedger for Arc<T> {
    async fn entry_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<UsageLedgerEntry>, ApplicationError> {
        (**self).entry_for_invoice(invoice_id).await
    }

    async fn guest_has_used(
        &self,
        discount_id: &DiscountId,
        guest_id: &GuestId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        (**self).guest_has_used(discount_id, guest_id, excluding).await
    }

    async fn booking_has_discount(
        &self,
        booking_id: &BookingId,
        excluding: Option<&InvoiceId>,
    ) -> Result<bool, ApplicationError> {
        (**self).booking_has_discount(booking_id, excluding).await
    }

    async fn replace_entry(
        &self,
        invoice_id: &InvoiceId,
        replacement: LedgerReplacement,
    ) -> Result<LedgerWriteOutcome, ApplicationError> {
        (**self).replace_entry(invoice_id, replacement).await
    }
}
