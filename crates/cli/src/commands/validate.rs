use std::path::PathBuf;

use clap::Args;
use folio_core::billing::validation::{ValidateDiscountResponse, ValidationRequest};
use folio_core::billing::BillingEngine;
use folio_db::{SqlCouponRepository, SqlDiscountRepository, SqlUsageLedgerRepository};

use crate::commands::{
    engine_error, open_pool, read_request, resolve_today, run_with_config, to_data, CommandResult,
};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(long, help = "Path to a JSON validation request")]
    pub request: PathBuf,
    #[arg(long, help = "Evaluate as of this date (YYYY-MM-DD); defaults to the property's today")]
    pub today: Option<String>,
}

/// Validates a discount or coupon against a prospective charge. A rejection
/// is a normal answer and still exits 0 with `valid: false`.
pub fn run(args: ValidateArgs) -> CommandResult {
    run_with_config("validate", |config| async move {
        let request: ValidationRequest = read_request(&args.request)?;
        let today = resolve_today(&config, args.today.as_deref())?;
        let pool = open_pool(&config).await?;

        let engine = BillingEngine::new(
            SqlDiscountRepository::new(pool.clone()),
            SqlCouponRepository::new(pool.clone()),
            SqlUsageLedgerRepository::new(pool.clone()),
        );
        let outcome = engine.validate(&request, today).await;
        pool.close().await;
        let outcome = outcome.map_err(engine_error)?;

        let response = ValidateDiscountResponse::from(&outcome);
        let message = match &response.error {
            Some(reason) => reason.clone(),
            None => format!("valid: {} off", response.discount_amount),
        };
        Ok(CommandResult::success_with_data("validate", message, Some(to_data(&response)?)))
    })
}
