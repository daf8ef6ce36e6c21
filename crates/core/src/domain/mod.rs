pub mod coupon;
pub mod discount;
pub mod invoice;
pub mod ledger;
