pub mod billing;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;

pub use billing::catalog::{CouponResolver, DiscountCatalog, UsageLedger};
pub use billing::ledger::{AppliedDiscount, LedgerReplacement, LedgerWriteOutcome};
pub use billing::pricing::{
    DeterministicPricingEngine, InvoiceTotals, PricingEngine, PricingInput, PricingTraceStep,
};
pub use billing::validation::{
    AcceptedDiscount, ChargeContext, RejectionReason, ValidateDiscountResponse, ValidationOutcome,
    ValidationRequest,
};
pub use billing::{BillingEngine, CouponLookup};
pub use clock::PropertyClock;
pub use domain::coupon::{CouponCode, CouponCodeId};
pub use domain::discount::{Discount, DiscountId, DiscountStatus, DiscountType};
pub use domain::invoice::{InvoiceItem, QuantityType};
pub use domain::ledger::{BookingId, GuestId, InvoiceId, UsageLedgerEntry};
pub use errors::{ApplicationError, DomainError, InterfaceError};
