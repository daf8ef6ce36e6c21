use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::billing::pricing::round_money;
use crate::domain::coupon::CouponCodeId;
use crate::domain::discount::{Discount, DiscountId, DiscountType};
use crate::domain::ledger::{BookingId, GuestId, InvoiceId};
use crate::errors::DomainError;

/// The prospective charge a discount is being validated against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeContext {
    pub subtotal: Decimal,
    pub currency: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: u32,
    #[serde(default)]
    pub room_types: Vec<String>,
    #[serde(default)]
    pub rate_type_ids: Vec<String>,
    #[serde(default)]
    pub guest_id: Option<GuestId>,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    /// Invoice being edited, if any. Its own ledger row does not count
    /// against the per-guest and per-booking exclusivity checks.
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

impl ChargeContext {
    pub fn check_stay(&self) -> Result<(), DomainError> {
        if self.check_out < self.check_in {
            return Err(DomainError::InvalidStay {
                check_in: self.check_in.to_string(),
                check_out: self.check_out.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    #[serde(default)]
    pub discount_id: Option<DiscountId>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(flatten)]
    pub context: ChargeContext,
}

impl ValidationRequest {
    /// The supplied coupon code, ignoring blank input.
    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref().map(str::trim).filter(|code| !code.is_empty())
    }
}

/// Why a discount can not be applied. These are expected business outcomes
/// shown to the end user verbatim, not failures.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("Invalid coupon code")]
    InvalidCouponCode,
    #[error("Coupon does not match discount")]
    CouponMismatch,
    #[error("Discount not found")]
    DiscountNotFound,
    #[error("Discount is inactive")]
    Inactive,
    #[error("Discount not yet valid")]
    NotYetValid,
    #[error("Discount has expired")]
    Expired,
    #[error("Minimum stay of {required_nights} nights required")]
    MinimumStay { required_nights: u32 },
    #[error("Discount does not apply to selected room types")]
    RoomTypeNotEligible,
    #[error("Discount does not apply to selected rate types")]
    RateTypeNotEligible,
    #[error("Discount is not available on {date}")]
    BlackoutDate { date: NaiveDate },
    #[error("Discount usage limit reached")]
    UsageLimitReached,
    #[error("Discount has already been used by this guest")]
    AlreadyUsedByGuest,
    #[error("A discount has already been applied to this booking")]
    AlreadyAppliedToBooking,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptedDiscount {
    pub discount: Discount,
    pub coupon_code_id: Option<CouponCodeId>,
    pub discount_amount: Decimal,
    pub discount_value: Decimal,
    pub discount_type: DiscountType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Accepted(AcceptedDiscount),
    Rejected(RejectionReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn accepted(&self) -> Option<&AcceptedDiscount> {
        match self {
            Self::Accepted(accepted) => Some(accepted),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }

    pub fn discount_amount(&self) -> Decimal {
        self.accepted().map(|accepted| accepted.discount_amount).unwrap_or(Decimal::ZERO)
    }
}

/// Rules that depend only on the discount, the charge and today's date, in
/// evaluation order. The first failing rule wins.
pub fn check_discount_rules(
    discount: &Discount,
    context: &ChargeContext,
    today: NaiveDate,
) -> Result<(), RejectionReason> {
    check_discount_rules_for(discount, context, today, false)
}

/// [`check_discount_rules`] for a charge whose invoice already holds one
/// counted unit of `discount`; that unit does not count against the cap.
pub fn check_discount_rules_for(
    discount: &Discount,
    context: &ChargeContext,
    today: NaiveDate,
    holds_unit: bool,
) -> Result<(), RejectionReason> {
    if !discount.is_active() {
        return Err(RejectionReason::Inactive);
    }

    if discount.valid_from.is_some_and(|from| today < from) {
        return Err(RejectionReason::NotYetValid);
    }
    if discount.valid_until.is_some_and(|until| today > until) {
        return Err(RejectionReason::Expired);
    }

    if context.nights < discount.min_stay_nights {
        return Err(RejectionReason::MinimumStay { required_nights: discount.min_stay_nights });
    }

    if !discount.applies_to_room_types(&context.room_types) {
        return Err(RejectionReason::RoomTypeNotEligible);
    }
    if !discount.applies_to_rate_types(&context.rate_type_ids) {
        return Err(RejectionReason::RateTypeNotEligible);
    }

    if let Some(date) = discount.first_blackout_night(context.check_in, context.check_out) {
        return Err(RejectionReason::BlackoutDate { date });
    }

    if discount.usage_exhausted_for(holds_unit) {
        return Err(RejectionReason::UsageLimitReached);
    }

    Ok(())
}

/// Wire shape of a validation answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDiscountResponse {
    pub valid: bool,
    pub discount_amount: Decimal,
    pub discount_value: Decimal,
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ValidationOutcome> for ValidateDiscountResponse {
    fn from(outcome: &ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Accepted(accepted) => Self {
                valid: true,
                discount_amount: round_money(accepted.discount_amount),
                discount_value: accepted.discount_value,
                discount_type: Some(accepted.discount_type),
                error: None,
            },
            ValidationOutcome::Rejected(reason) => Self {
                valid: false,
                discount_amount: Decimal::ZERO,
                discount_value: Decimal::ZERO,
                discount_type: None,
                error: Some(reason.to_string()),
            },
        }
    }
}
