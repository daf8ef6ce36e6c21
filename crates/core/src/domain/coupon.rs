use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::discount::DiscountId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCodeId(pub String);

impl CouponCodeId {
    pub fn generate() -> Self {
        Self(format!("cpn-{}", Uuid::new_v4()))
    }
}

/// Human-facing alias for exactly one discount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponCode {
    pub id: CouponCodeId,
    pub discount_id: DiscountId,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl CouponCode {
    pub fn new(
        id: CouponCodeId,
        discount_id: DiscountId,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id, discount_id, code: normalize_code(code), created_at }
    }
}

/// Lookup key for coupon codes. Lookups are case-insensitive and ignore
/// surrounding whitespace, so codes are stored in this form.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
