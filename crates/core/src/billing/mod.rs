pub mod catalog;
pub mod ledger;
pub mod pricing;
pub mod validation;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::coupon::{CouponCode, CouponCodeId};
use crate::domain::discount::{Discount, DiscountId};
use crate::domain::ledger::InvoiceId;
use crate::errors::ApplicationError;

use self::{
    catalog::{CouponResolver, DiscountCatalog, UsageLedger},
    ledger::{plan_ledger_replacement, AppliedDiscount, LedgerWriteOutcome},
    pricing::{DeterministicPricingEngine, InvoiceTotals, PricingEngine, PricingInput},
    validation::{
        check_discount_rules_for, AcceptedDiscount, RejectionReason, ValidationOutcome,
        ValidationRequest,
    },
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CouponLookup {
    Found { coupon_code_id: CouponCodeId, discount_id: DiscountId, code: String },
    NotFound,
}

/// Entry point for invoice assembly: coupon lookup, discount validation,
/// pricing and the ledger write at finalize time.
pub struct BillingEngine<C, R, L, P = DeterministicPricingEngine> {
    catalog: C,
    coupons: R,
    ledger: L,
    pricing_engine: P,
}

impl<C, R, L> BillingEngine<C, R, L, DeterministicPricingEngine> {
    pub fn new(catalog: C, coupons: R, ledger: L) -> Self {
        Self::with_pricing_engine(catalog, coupons, ledger, DeterministicPricingEngine)
    }
}

impl<C, R, L, P> BillingEngine<C, R, L, P> {
    pub fn with_pricing_engine(catalog: C, coupons: R, ledger: L, pricing_engine: P) -> Self {
        Self { catalog, coupons, ledger, pricing_engine }
    }
}

impl<C, R, L, P> BillingEngine<C, R, L, P>
where
    C: DiscountCatalog,
    R: CouponResolver,
    L: UsageLedger,
    P: PricingEngine,
{
    pub async fn lookup_coupon(&self, code: &str) -> Result<CouponLookup, ApplicationError> {
        let lookup = match self.coupons.find_by_code(code).await? {
            Some(coupon) => CouponLookup::Found {
                coupon_code_id: coupon.id,
                discount_id: coupon.discount_id,
                code: coupon.code,
            },
            None => CouponLookup::NotFound,
        };
        debug!(
            event_name = "billing.coupon.lookup",
            found = matches!(lookup, CouponLookup::Found { .. }),
            "coupon lookup completed"
        );
        Ok(lookup)
    }

    /// Decides whether a discount may apply to the proposed charge.
    ///
    /// `today` is the current date in the property's timezone. Validation
    /// never consumes usage; that happens in [`Self::record_invoice_discount`].
    pub async fn validate(
        &self,
        request: &ValidationRequest,
        today: NaiveDate,
    ) -> Result<ValidationOutcome, ApplicationError> {
        request.context.check_stay()?;

        let outcome = match self.evaluate(request, today).await? {
            Ok(accepted) => ValidationOutcome::Accepted(accepted),
            Err(reason) => ValidationOutcome::Rejected(reason),
        };

        match &outcome {
            ValidationOutcome::Accepted(accepted) => info!(
                event_name = "billing.discount.validated",
                discount_id = %accepted.discount.id.0,
                discount_amount = %accepted.discount_amount,
                "discount accepted"
            ),
            ValidationOutcome::Rejected(reason) => info!(
                event_name = "billing.discount.rejected",
                discount_id = request.discount_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
                reason = %reason,
                "discount rejected"
            ),
        }

        Ok(outcome)
    }

    async fn evaluate(
        &self,
        request: &ValidationRequest,
        today: NaiveDate,
    ) -> Result<Result<AcceptedDiscount, RejectionReason>, ApplicationError> {
        let (discount, coupon) = match self.resolve(request).await? {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(Err(reason)),
        };

        let context = &request.context;
        let excluding = context.invoice_id.as_ref();
        let holds_unit = match excluding {
            Some(invoice_id) if discount.usage_exhausted() => self
                .ledger
                .entry_for_invoice(invoice_id)
                .await?
                .is_some_and(|entry| entry.discount_id == discount.id),
            _ => false,
        };
        if let Err(reason) = check_discount_rules_for(&discount, context, today, holds_unit) {
            return Ok(Err(reason));
        }

        if discount.one_time_per_guest {
            if let Some(guest_id) = &context.guest_id {
                if self.ledger.guest_has_used(&discount.id, guest_id, excluding).await? {
                    return Ok(Err(RejectionReason::AlreadyUsedByGuest));
                }
            }
        }
        if discount.one_time_per_booking {
            if let Some(booking_id) = &context.booking_id {
                if self.ledger.booking_has_discount(booking_id, excluding).await? {
                    return Ok(Err(RejectionReason::AlreadyAppliedToBooking));
                }
            }
        }

        let discount_amount = discount.amount_off(context.subtotal);
        Ok(Ok(AcceptedDiscount {
            discount_value: discount.amount,
            discount_type: discount.discount_type,
            coupon_code_id: coupon.map(|coupon| coupon.id),
            discount_amount,
            discount,
        }))
    }

    async fn resolve(
        &self,
        request: &ValidationRequest,
    ) -> Result<Result<(Discount, Option<CouponCode>), RejectionReason>, ApplicationError> {
        let (discount_id, coupon) = match request.coupon_code() {
            Some(code) => {
                let Some(coupon) = self.coupons.find_by_code(code).await? else {
                    return Ok(Err(RejectionReason::InvalidCouponCode));
                };
                if request.discount_id.as_ref().is_some_and(|id| *id != coupon.discount_id) {
                    return Ok(Err(RejectionReason::CouponMismatch));
                }
                (coupon.discount_id.clone(), Some(coupon))
            }
            None => match &request.discount_id {
                Some(id) => (id.clone(), None),
                None => return Ok(Err(RejectionReason::DiscountNotFound)),
            },
        };

        match self.catalog.find_discount(&discount_id).await? {
            Some(discount) if !discount.is_deleted() => Ok(Ok((discount, coupon))),
            _ => Ok(Err(RejectionReason::DiscountNotFound)),
        }
    }

    pub fn price(&self, input: &PricingInput) -> InvoiceTotals {
        self.pricing_engine.price(input)
    }

    /// Records (or clears) the discount applied to a finalized invoice.
    ///
    /// Safe to retry: the invoice keeps at most one ledger row and usage is
    /// consumed only when the invoice switches to a discount it was not
    /// already recorded against.
    pub async fn record_invoice_discount(
        &self,
        invoice_id: &InvoiceId,
        applied: Option<&AppliedDiscount>,
    ) -> Result<LedgerWriteOutcome, ApplicationError> {
        let replacement = plan_ledger_replacement(invoice_id, applied, Utc::now());
        let recorded_discount = replacement.entry.as_ref().map(|entry| entry.discount_id.clone());

        let outcome = self.ledger.replace_entry(invoice_id, replacement).await?;
        match &outcome {
            LedgerWriteOutcome::UsageLimitReached => warn!(
                event_name = "billing.ledger.usage_limit_reached",
                invoice_id = %invoice_id.0,
                discount_id = recorded_discount.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
                "usage cap reached while recording invoice discount"
            ),
            _ => info!(
                event_name = "billing.ledger.replaced",
                invoice_id = %invoice_id.0,
                discount_id = recorded_discount.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
                outcome = ?outcome,
                "invoice discount ledger updated"
            ),
        }

        Ok(outcome)
    }
}
