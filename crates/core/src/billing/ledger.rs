use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::validation::AcceptedDiscount;
use crate::domain::coupon::CouponCodeId;
use crate::domain::discount::{DiscountId, DiscountType};
use crate::domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};

/// A discount the invoice assembler has decided to apply at finalize time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_id: DiscountId,
    pub coupon_code_id: Option<CouponCodeId>,
    pub guest_id: Option<GuestId>,
    pub booking_id: Option<BookingId>,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

impl AppliedDiscount {
    pub fn from_accepted(
        accepted: &AcceptedDiscount,
        guest_id: Option<GuestId>,
        booking_id: Option<BookingId>,
    ) -> Self {
        Self {
            discount_id: accepted.discount.id.clone(),
            coupon_code_id: accepted.coupon_code_id.clone(),
            guest_id,
            booking_id,
            discount_amount: accepted.discount_amount,
            discount_type: accepted.discount_type,
            discount_value: accepted.discount_value,
        }
    }
}

/// What the store must do, in one transaction, for a single invoice.
///
/// Whether usage is consumed depends on the row the store removes, so the
/// store decides it inside the same atomic section with
/// [`LedgerReplacement::usage_to_consume`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerReplacement {
    pub entry: Option<UsageLedgerEntry>,
}

impl LedgerReplacement {
    /// The discount to consume one usage unit of, given the discount of the
    /// row just removed for this invoice.
    ///
    /// Usage is consumed only when the invoice becomes associated with a
    /// discount it was not already recorded against. Switching A -> B
    /// consumes B once and leaves A alone; re-finalizing with A consumes
    /// nothing. Removing the discount consumes nothing and never walks usage
    /// back.
    pub fn usage_to_consume(&self, removed: Option<&DiscountId>) -> Option<&DiscountId> {
        let entry = self.entry.as_ref()?;
        (removed != Some(&entry.discount_id)).then_some(&entry.discount_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerWriteOutcome {
    Recorded,
    Cleared,
    UsageLimitReached,
}

/// Plans the ledger write for an invoice. A row is written only for an
/// applied discount with a positive amount; anything else clears the row.
pub fn plan_ledger_replacement(
    invoice_id: &InvoiceId,
    applied: Option<&AppliedDiscount>,
    recorded_at: DateTime<Utc>,
) -> LedgerReplacement {
    let entry = applied.filter(|applied| applied.discount_amount > Decimal::ZERO).map(|applied| {
        UsageLedgerEntry {
            invoice_id: invoice_id.clone(),
            discount_id: applied.discount_id.clone(),
            coupon_code_id: applied.coupon_code_id.clone(),
            guest_id: applied.guest_id.clone(),
            booking_id: applied.booking_id.clone(),
            discount_amount: applied.discount_amount,
            discount_type: applied.discount_type,
            discount_value_used: applied.discount_value,
            recorded_at,
        }
    });

    LedgerReplacement { entry }
}
