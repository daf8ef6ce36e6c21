use std::path::PathBuf;

use clap::Args;
use folio_core::billing::ledger::{AppliedDiscount, LedgerWriteOutcome};
use folio_core::billing::validation::{ValidationOutcome, ValidationRequest};
use folio_core::billing::BillingEngine;
use folio_core::domain::ledger::InvoiceId;
use folio_db::{SqlCouponRepository, SqlDiscountRepository, SqlUsageLedgerRepository};
use serde::Serialize;

use crate::commands::{
    engine_error, input_error, open_pool, read_request, resolve_today, run_with_config,
    to_data, CommandError, CommandResult, EXIT_INPUT,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeReport<'a> {
    invoice_id: &'a str,
    outcome: LedgerWriteOutcome,
    applied: Option<&'a AppliedDiscount>,
}

#[derive(Debug, Args)]
pub struct FinalizeArgs {
    #[arg(long, help = "Invoice being finalized")]
    pub invoice: String,
    #[arg(long, help = "Validation request for the discount to apply; omit to clear the invoice's discount")]
    pub request: Option<PathBuf>,
    #[arg(long, help = "Evaluate as of this date (YYYY-MM-DD); defaults to the property's today")]
    pub today: Option<String>,
}

/// Re-validates the discount at finalize time and records it in the usage
/// ledger. Finalizing the same invoice again with the same discount consumes
/// no additional usage.
pub fn run(args: FinalizeArgs) -> CommandResult {
    run_with_config("finalize", |config| async move {
        let invoice_id = InvoiceId(args.invoice.trim().to_string());
        if invoice_id.0.is_empty() {
            return Err(input_error("invoice id must not be blank"));
        }
        let request = match &args.request {
            Some(path) => Some(bind_invoice(read_request(path)?, &invoice_id)?),
            None => None,
        };
        let today = resolve_today(&config, args.today.as_deref())?;
        let pool = open_pool(&config).await?;

        let engine = BillingEngine::new(
            SqlDiscountRepository::new(pool.clone()),
            SqlCouponRepository::new(pool.clone()),
            SqlUsageLedgerRepository::new(pool.clone()),
        );
        let result = finalize(&engine, &invoice_id, request.as_ref(), today).await;
        pool.close().await;
        result
    })
}

async fn finalize(
    engine: &BillingEngine<SqlDiscountRepository, SqlCouponRepository, SqlUsageLedgerRepository>,
    invoice_id: &InvoiceId,
    request: Option<&ValidationRequest>,
    today: chrono::NaiveDate,
) -> Result<CommandResult, CommandError> {
    let applied = match request {
        Some(request) => match engine.validate(request, today).await.map_err(engine_error)? {
            ValidationOutcome::Accepted(accepted) => Some(AppliedDiscount::from_accepted(
                &accepted,
                request.context.guest_id.clone(),
                request.context.booking_id.clone(),
            )),
            ValidationOutcome::Rejected(reason) => {
                return Err(("discount_rejected", reason.to_string(), EXIT_INPUT));
            }
        },
        None => None,
    };

    let outcome =
        engine.record_invoice_discount(invoice_id, applied.as_ref()).await.map_err(engine_error)?;

    match outcome {
        LedgerWriteOutcome::UsageLimitReached => Err((
            "usage_limit_reached",
            format!("Discount usage limit reached; invoice {} was not changed", invoice_id.0),
            EXIT_INPUT,
        )),
        LedgerWriteOutcome::Recorded | LedgerWriteOutcome::Cleared => {
            let message = match (&outcome, &applied) {
                (LedgerWriteOutcome::Recorded, Some(applied)) => format!(
                    "invoice {} finalized with discount {}",
                    invoice_id.0, applied.discount_id.0
                ),
                _ => format!("invoice {} finalized without a discount", invoice_id.0),
            };
            let report =
                FinalizeReport { invoice_id: &invoice_id.0, outcome, applied: applied.as_ref() };
            Ok(CommandResult::success_with_data("finalize", message, Some(to_data(&report)?)))
        }
    }
}

/// The request's charge must be for the invoice being finalized; a missing
/// `invoiceId` is filled in so the invoice's own ledger row is excluded from
/// the exclusivity checks.
fn bind_invoice(
    mut request: ValidationRequest,
    invoice_id: &InvoiceId,
) -> Result<ValidationRequest, CommandError> {
    let bound = request.context.invoice_id.get_or_insert_with(|| invoice_id.clone());
    if *bound != *invoice_id {
        return Err(input_error(format!(
            "request is for invoice `{}` but `{}` is being finalized",
            bound.0, invoice_id.0
        )));
    }
    Ok(request)
}
