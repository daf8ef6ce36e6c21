use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::coupon::CouponCodeId;
use crate::domain::discount::{DiscountId, DiscountType};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

/// One discount application against an invoice.
///
/// `discount_type` and `discount_value_used` snapshot the rule at the time it
/// was applied, so later edits to the discount leave historical invoices
/// untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageLedgerEntry {
    pub invoice_id: InvoiceId,
    pub discount_id: DiscountId,
    pub coupon_code_id: Option<CouponCodeId>,
    pub guest_id: Option<GuestId>,
    pub booking_id: Option<BookingId>,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    pub discount_value_used: Decimal,
    pub recorded_at: DateTime<Utc>,
}
