use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscountId(pub String);

impl DiscountId {
    pub fn generate() -> Self {
        Self(format!("disc-{}", Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    /// Amount taken off `base` for a rule of this type with magnitude `value`.
    ///
    /// Fixed amounts are clamped to `base` and never drop below zero, so a
    /// fixed discount can not turn the charge negative.
    pub fn amount_off(&self, value: Decimal, base: Decimal) -> Decimal {
        match self {
            Self::Percentage => base * value / Decimal::ONE_HUNDRED,
            Self::Fixed => value.min(base.max(Decimal::ZERO)),
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported discount type `{other}` (expected percentage|fixed)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountStatus {
    Active,
    Inactive,
}

impl DiscountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for DiscountStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported discount status `{other}` (expected active|inactive)"
            ))),
        }
    }
}

/// A reusable pricing rule plus the eligibility constraints that gate it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub amount: Decimal,
    pub currency: String,
    pub min_stay_nights: u32,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub blackout_dates: BTreeSet<NaiveDate>,
    pub max_total_usage: Option<u32>,
    pub usage_count: u32,
    pub max_usage_per_guest: Option<u32>,
    pub one_time_per_booking: bool,
    pub one_time_per_guest: bool,
    pub applicable_room_types: Vec<String>,
    pub applicable_rate_type_ids: Vec<String>,
    pub status: DiscountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Discount {
    pub fn is_active(&self) -> bool {
        self.status == DiscountStatus::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn usage_exhausted(&self) -> bool {
        self.usage_exhausted_for(false)
    }

    /// Cap check for a charge that may already hold one of the counted units,
    /// as when a finalized invoice is validated again with the same discount.
    pub fn usage_exhausted_for(&self, holds_unit: bool) -> bool {
        let counted = self.usage_count.saturating_sub(u32::from(holds_unit));
        self.max_total_usage.is_some_and(|cap| counted >= cap)
    }

    /// First night in `[check_in, check_out)` that falls on a blackout date.
    pub fn first_blackout_night(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Option<NaiveDate> {
        if self.blackout_dates.is_empty() {
            return None;
        }

        check_in
            .iter_days()
            .take_while(|night| *night < check_out)
            .find(|night| self.blackout_dates.contains(night))
    }

    pub fn applies_to_room_types(&self, room_types: &[String]) -> bool {
        allow_list_matches(&self.applicable_room_types, room_types)
    }

    pub fn applies_to_rate_types(&self, rate_type_ids: &[String]) -> bool {
        allow_list_matches(&self.applicable_rate_type_ids, rate_type_ids)
    }

    pub fn amount_off(&self, subtotal: Decimal) -> Decimal {
        self.discount_type.amount_off(self.amount, subtotal)
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }
}

fn allow_list_matches(allowed: &[String], requested: &[String]) -> bool {
    allowed.is_empty() || requested.iter().any(|value| allowed.contains(value))
}
