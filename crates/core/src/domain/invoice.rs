use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    #[default]
    Quantity,
    Days,
}

/// A billable line. `total` is always `quantity * unit_price`; the fields are
/// private so no path can change one side without recomputing the other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "InvoiceItemInput")]
pub struct InvoiceItem {
    description: String,
    quantity: Decimal,
    quantity_type: QuantityType,
    unit_price: Decimal,
    total: Decimal,
    currency: Option<String>,
}

impl InvoiceItem {
    pub fn new(
        description: impl Into<String>,
        quantity: Decimal,
        quantity_type: QuantityType,
        unit_price: Decimal,
    ) -> Self {
        Self {
            description: description.into(),
            quantity,
            quantity_type,
            unit_price,
            total: quantity * unit_price,
            currency: None,
        }
    }

    /// Tags the line with the currency of the saved catalog entry it came from.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn quantity_type(&self) -> QuantityType {
        self.quantity_type
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
        self.recompute_total();
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) {
        self.unit_price = unit_price;
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total = self.quantity * self.unit_price;
    }
}

// Incoming totals are ignored; the line total is derived on the way in.
#[derive(Deserialize)]
struct InvoiceItemInput {
    description: String,
    quantity: Decimal,
    #[serde(default)]
    quantity_type: QuantityType,
    unit_price: Decimal,
    #[serde(default)]
    currency: Option<String>,
}

impl From<InvoiceItemInput> for InvoiceItem {
    fn from(input: InvoiceItemInput) -> Self {
        let item =
            Self::new(input.description, input.quantity, input.quantity_type, input.unit_price);
        match input.currency {
            Some(currency) => item.with_currency(currency),
            None => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{InvoiceItem, QuantityType};

    #[test]
    fn total_follows_quantity_and_price_edits() {
        let mut item =
            InvoiceItem::new("Deluxe room", Decimal::new(3, 0), QuantityType::Days, Decimal::new(12_000, 2));
        assert_eq!(item.total(), Decimal::new(36_000, 2));

        item.set_quantity(Decimal::new(2, 0));
        assert_eq!(item.total(), Decimal::new(24_000, 2));

        item.set_unit_price(Decimal::new(9_950, 2));
        assert_eq!(item.total(), Decimal::new(19_900, 2));
    }

    #[test]
    fn deserialization_recomputes_supplied_total() {
        let item: InvoiceItem = serde_json::from_str(
            r#"{"description":"Minibar","quantity":"2","unit_price":"4.50","total":"999"}"#,
        )
        .expect("decode item");

        assert_eq!(item.total(), Decimal::new(900, 2));
        assert_eq!(item.quantity_type(), QuantityType::Quantity);
        assert_eq!(item.currency(), None);
    }
}
