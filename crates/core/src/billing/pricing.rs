use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::discount::DiscountType;
use crate::domain::invoice::InvoiceItem;

/// Minor-unit precision used at output boundaries.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingInput {
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default = "default_discount_type")]
    pub discount_type: DiscountType,
    #[serde(default)]
    pub service_charge_rate: Decimal,
    #[serde(default)]
    pub damage_charge: Decimal,
    #[serde(default)]
    pub price_adjustment: Decimal,
}

fn default_discount_type() -> DiscountType {
    DiscountType::Percentage
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub service_charge: Decimal,
    pub subtotal_with_service: Decimal,
    pub discount_amount: Decimal,
    pub after_discount: Decimal,
    pub with_damage: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub trace: Vec<PricingTraceStep>,
}

impl InvoiceTotals {
    /// Copy with every figure rounded to minor units. Intermediate steps are
    /// computed unrounded; this is for display and persistence only.
    pub fn rounded(&self) -> Self {
        Self {
            subtotal: round_money(self.subtotal),
            service_charge: round_money(self.service_charge),
            subtotal_with_service: round_money(self.subtotal_with_service),
            discount_amount: round_money(self.discount_amount),
            after_discount: round_money(self.after_discount),
            with_damage: round_money(self.with_damage),
            tax_amount: round_money(self.tax_amount),
            total: round_money(self.total),
            trace: self
                .trace
                .iter()
                .map(|step| PricingTraceStep { amount: round_money(step.amount), ..step.clone() })
                .collect(),
        }
    }
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, input: &PricingInput) -> InvoiceTotals;
}

#[derive(Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn price(&self, input: &PricingInput) -> InvoiceTotals {
        calculate_total(input)
    }
}

pub fn subtotal(items: &[InvoiceItem]) -> Decimal {
    items.iter().map(InvoiceItem::total).sum()
}

/// Prices an invoice. The step order is fixed: service charge, then discount
/// on the post-service figure, then damage (never discounted), then tax on
/// the net amount, then the manual adjustment. Never fails; out-of-range
/// inputs flow through the arithmetic unchanged.
pub fn calculate_total(input: &PricingInput) -> InvoiceTotals {
    let subtotal = subtotal(&input.items);
    let service_charge = subtotal * input.service_charge_rate / Decimal::ONE_HUNDRED;
    let subtotal_with_service = subtotal + service_charge;
    let discount_amount = input.discount_type.amount_off(input.discount, subtotal_with_service);
    let after_discount = subtotal_with_service - discount_amount;
    let with_damage = after_discount + input.damage_charge;
    let tax_amount = with_damage * input.tax_rate / Decimal::ONE_HUNDRED;
    let total = with_damage + tax_amount + input.price_adjustment;

    let discount_detail = match input.discount_type {
        DiscountType::Percentage => "subtotal_with_service * discount / 100",
        DiscountType::Fixed => "min(discount, subtotal_with_service)",
    };

    let trace = vec![
        step("subtotal", "sum(item.quantity * item.unit_price)", subtotal),
        step("service_charge", "subtotal * service_charge_rate / 100", service_charge),
        step("subtotal_with_service", "subtotal + service_charge", subtotal_with_service),
        step("discount", discount_detail, discount_amount),
        step("after_discount", "subtotal_with_service - discount", after_discount),
        step("with_damage", "after_discount + damage_charge", with_damage),
        step("tax", "with_damage * tax_rate / 100", tax_amount),
        step("total", "with_damage + tax + price_adjustment", total),
    ];

    InvoiceTotals {
        subtotal,
        service_charge,
        subtotal_with_service,
        discount_amount,
        after_discount,
        with_damage,
        tax_amount,
        total,
        trace,
    }
}

fn step(stage: &str, detail: &str, amount: Decimal) -> PricingTraceStep {
    PricingTraceStep { stage: stage.to_string(), detail: detail.to_string(), amount }
}
